//! `/api/get_route_changes`, grounded on `_cached_route_changes`/
//! `_uncached_get_route_changes` in the reference server.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use utoipa::IntoParams;

use alerts_core::representative_date::representative_date_for_timetable_lookup;
use alerts_core::route_change::{compute_route_changes, RouteChangesResult};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct RouteChangesParams {
    id: String,
}

/// Before/after stop sequences for a single alert, keyed by agency and line
/// number. Use cases without route-change semantics (e.g. national alerts)
/// get back an empty object, matching `compute_route_changes`'s own
/// early-return.
#[utoipa::path(
    get,
    path = "/api/get_route_changes",
    params(RouteChangesParams),
    responses(
        (status = 200, description = "Route changes for the alert", body = Object),
        (status = 503, description = "Store temporarily unavailable", body = crate::error::ErrorResponse)
    ),
    tag = "alerts"
)]
pub async fn get_route_changes(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RouteChangesParams>,
) -> Result<Json<RouteChangesResult>, ApiError> {
    let result = state
        .cache_route_changes
        .get_or_compute(params.id.clone(), || async {
            let Some(normalized) = state.alerts.get_alert(&params.id).await? else {
                return Ok::<_, ApiError>(RouteChangesResult {
                    route_changes: Default::default(),
                    stops_for_map: Default::default(),
                    map_bounding_box: Default::default(),
                });
            };
            let today = state.clock.today_jerusalem().and_hms_opt(0, 0, 0).unwrap();
            let representative_date = representative_date_for_timetable_lookup(&normalized, today);
            let result = compute_route_changes(
                state.timetable.as_ref(),
                &normalized,
                &normalized.id,
                representative_date,
            )
            .await?;
            Ok(result)
        })
        .await?;

    Ok(Json(result))
}
