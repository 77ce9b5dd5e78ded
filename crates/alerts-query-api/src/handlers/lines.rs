//! `/api/all_lines` and `/api/single_line`. Neither route exists in the
//! reference server — both are served out of the startup-built lines
//! catalog rather than a per-request query, per the one-shot-catalog design
//! note. `current_location` ranks lines by distance to their nearest stop;
//! this ranking has no reference behavior to match, so it's a local design
//! choice rather than a ported one.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::ApiError;
use crate::query_params::parse_current_location;
use crate::responses::{AllLinesResponse, LineView, SingleLineResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct AllLinesParams {
    current_location: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SingleLineParams {
    id: String,
}

async fn nearest_stop_distance(
    state: &AppState,
    route_id: &str,
    current_location: (f64, f64),
) -> Result<Option<f64>, ApiError> {
    let coords = state
        .cache_route_stop_coords
        .get_or_compute(format!("route:{route_id}"), || async {
            state
                .timetable
                .all_stop_coords_by_route_ids(&[route_id.to_string()])
                .await
                .map_err(ApiError::from)
        })
        .await?;

    let current = state.projector.project(current_location.0, current_location.1);
    Ok(coords
        .iter()
        .map(|&(lat, lon)| {
            let p = state.projector.project(lat, lon);
            ((p.0 - current.0).powi(2) + (p.1 - current.1).powi(2)).sqrt()
        })
        .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.min(d)))))
}

/// Every route known to the static timetable, sorted by line number.
#[utoipa::path(
    get,
    path = "/api/all_lines",
    params(AllLinesParams),
    responses(
        (status = 200, description = "Every route in the static timetable", body = AllLinesResponse),
        (status = 400, description = "Malformed current_location", body = crate::error::ErrorResponse)
    ),
    tag = "lines"
)]
pub async fn all_lines(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AllLinesParams>,
) -> Result<Json<AllLinesResponse>, ApiError> {
    let mut lines: Vec<LineView> = state.lines_catalog.all().iter().cloned().map(LineView::from).collect();

    if let Some(raw) = &params.current_location {
        let current = parse_current_location(raw)?;
        for line in &mut lines {
            line.distance = nearest_stop_distance(&state, &line.route_id, current).await?;
        }
        lines.sort_by(|a, b| match (a.distance, b.distance) {
            (Some(da), Some(db)) => da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
    }

    Ok(Json(AllLinesResponse { lines }))
}

/// Look up a single route by id from the lines catalog.
#[utoipa::path(
    get,
    path = "/api/single_line",
    params(SingleLineParams),
    responses(
        (status = 200, description = "The route, or null if unknown", body = SingleLineResponse)
    ),
    tag = "lines"
)]
pub async fn single_line(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SingleLineParams>,
) -> Json<SingleLineResponse> {
    let line = state.lines_catalog.by_route_id(&params.id).cloned().map(LineView::from);
    Json(SingleLineResponse { line })
}
