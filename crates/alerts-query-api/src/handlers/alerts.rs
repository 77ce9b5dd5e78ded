//! `/api/all_alerts` and `/api/single_alert`, grounded on
//! `ServiceAlertsApiServer.all_alerts`/`.single_alert` and the
//! `_enrich_alerts`/`_add_distance_to_alerts` helpers they call through.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::NaiveDateTime;
use serde::Deserialize;
use utoipa::IntoParams;

use alerts_core::enrich::{enrich_alert, sort_alerts, EnrichedAlert};
use alerts_core::model::NormalizedAlert;
use alerts_core::projector::distance_to_alert;
use alerts_core::route_change::compute_route_changes;
use alerts_core::store::Stop;

use crate::error::ApiError;
use crate::query_params::parse_current_location;
use crate::responses::{AlertView, AllAlertsResponse, SingleAlertResponse};
use crate::state::{round_coord, AppState, SingleAlertBundle};

#[derive(Debug, Deserialize, IntoParams)]
pub struct AllAlertsParams {
    current_location: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SingleAlertParams {
    id: String,
    current_location: Option<String>,
}

fn today_midnight(state: &AppState) -> NaiveDateTime {
    state.clock.today_jerusalem().and_hms_opt(0, 0, 0).unwrap()
}

async fn load_all_alerts(state: &AppState) -> Result<Vec<EnrichedAlert>, ApiError> {
    state
        .cache_all_alerts
        .get_or_compute((), || async {
            let normalized = state.alerts.get_alerts().await?;
            let today = today_midnight(state);
            let mut enriched = Vec::with_capacity(normalized.len());
            for alert in normalized {
                enriched.push(enrich_alert(state.timetable.as_ref(), alert, today).await?);
            }
            sort_alerts(&mut enriched, state.clock.now_jerusalem_naive());
            Ok::<_, ApiError>(enriched)
        })
        .await
}

async fn route_stop_coords_for_alert(
    state: &AppState,
    alert: &NormalizedAlert,
) -> Result<Vec<(f64, f64)>, ApiError> {
    state
        .cache_route_stop_coords
        .get_or_compute(format!("alert:{}", alert.id), || async {
            state
                .timetable
                .all_stop_coords_by_route_ids(&alert.relevant_route_ids)
                .await
                .map_err(ApiError::from)
        })
        .await
}

async fn distance_for_alert(
    state: &AppState,
    alert: &NormalizedAlert,
    current_location: (f64, f64),
) -> Result<Option<f64>, ApiError> {
    let cache_key = (alert.id.clone(), round_coord(current_location.0, current_location.1));
    if let Some(d) = state.cache_distance.get(&cache_key) {
        return Ok(d);
    }

    let mut all_stop_ids: Vec<String> = alert
        .added_stop_ids
        .iter()
        .chain(alert.removed_stop_ids.iter())
        .cloned()
        .collect();
    all_stop_ids.sort();
    all_stop_ids.dedup();

    let stops: std::collections::BTreeMap<String, Stop> = if all_stop_ids.is_empty() {
        Default::default()
    } else {
        state.timetable.stops_metadata(&all_stop_ids).await?
    };

    let route_coords = if all_stop_ids.is_empty() && !alert.relevant_route_ids.is_empty() {
        route_stop_coords_for_alert(state, alert).await?
    } else {
        Vec::new()
    };

    let distance = distance_to_alert(state.projector.as_ref(), current_location, alert, &stops, &route_coords)?;
    state.cache_distance.insert(cache_key, distance);
    Ok(distance)
}

async fn with_distance(
    state: &AppState,
    mut alerts: Vec<EnrichedAlert>,
    current_location: (f64, f64),
) -> Result<Vec<EnrichedAlert>, ApiError> {
    for enriched in &mut alerts {
        if let Some(d) = distance_for_alert(state, &enriched.alert, current_location).await? {
            enriched.distance = Some(d);
        }
    }
    sort_alerts(&mut alerts, state.clock.now_jerusalem_naive());
    Ok(alerts)
}

/// List every non-expired-and-deleted alert, optionally ranked by distance
/// to a rider's location.
#[utoipa::path(
    get,
    path = "/api/all_alerts",
    params(AllAlertsParams),
    responses(
        (status = 200, description = "Every currently relevant alert", body = AllAlertsResponse),
        (status = 400, description = "Malformed current_location", body = crate::error::ErrorResponse),
        (status = 503, description = "Store temporarily unavailable", body = crate::error::ErrorResponse)
    ),
    tag = "alerts"
)]
pub async fn all_alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AllAlertsParams>,
) -> Result<Json<AllAlertsResponse>, ApiError> {
    let now = state.clock.now_jerusalem_naive();

    let enriched = match &params.current_location {
        Some(raw) => {
            let current = parse_current_location(raw)?;
            let key = round_coord(current.0, current.1);
            match state.cache_all_alerts_located.get(&key) {
                Some(cached) => cached,
                None => {
                    let base = load_all_alerts(&state).await?;
                    let located = with_distance(&state, base, current).await?;
                    state.cache_all_alerts_located.insert(key, located.clone());
                    located
                }
            }
        }
        None => load_all_alerts(&state).await?,
    };

    let alerts = enriched.into_iter().map(|e| AlertView::from_enriched(e, now)).collect();
    Ok(Json(AllAlertsResponse { alerts }))
}

/// Look up a single alert by id, with its route changes inlined (matching
/// the reference server merging `_cached_route_changes` into the same
/// response). Returns `{"alerts": []}` rather than 404 when the id is
/// unknown — the reference behavior for "probably not in the db".
#[utoipa::path(
    get,
    path = "/api/single_alert",
    params(SingleAlertParams),
    responses(
        (status = 200, description = "The alert, or an empty list if not found", body = SingleAlertResponse),
        (status = 400, description = "Malformed current_location", body = crate::error::ErrorResponse),
        (status = 503, description = "Store temporarily unavailable", body = crate::error::ErrorResponse)
    ),
    tag = "alerts"
)]
pub async fn single_alert(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SingleAlertParams>,
) -> Result<Json<SingleAlertResponse>, ApiError> {
    let now = state.clock.now_jerusalem_naive();

    let bundle = state
        .cache_single_alert
        .get_or_compute(params.id.clone(), || async {
            let Some(normalized) = state.alerts.get_alert(&params.id).await? else {
                return Ok::<_, ApiError>(None);
            };
            let today = today_midnight(&state);
            let enriched = enrich_alert(state.timetable.as_ref(), normalized.clone(), today).await?;
            let representative_date = alerts_core::representative_date::representative_date_for_timetable_lookup(
                &normalized,
                today,
            );
            let route_changes =
                compute_route_changes(state.timetable.as_ref(), &normalized, &normalized.id, representative_date)
                    .await?;
            Ok(Some(SingleAlertBundle { alert: enriched, route_changes }))
        })
        .await?;

    let Some(mut bundle) = bundle else {
        return Ok(Json(SingleAlertResponse { alerts: vec![], route_changes: None }));
    };

    if let Some(raw) = &params.current_location {
        let current = parse_current_location(raw)?;
        bundle.alert.distance = distance_for_alert(&state, &bundle.alert.alert, current).await?;
    }

    Ok(Json(SingleAlertResponse {
        alerts: vec![AlertView::from_enriched(bundle.alert, now)],
        route_changes: Some(bundle.route_changes),
    }))
}
