pub mod alerts;
pub mod health;
pub mod lines;
pub mod route_changes;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health::health))
        .route("/api/all_alerts", get(alerts::all_alerts))
        .route("/api/single_alert", get(alerts::single_alert))
        .route("/api/get_route_changes", get(route_changes::get_route_changes))
        .route("/api/all_lines", get(lines::all_lines))
        .route("/api/single_line", get(lines::single_line))
}
