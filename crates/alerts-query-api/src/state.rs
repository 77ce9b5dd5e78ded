//! Server-owned state: the two storage contracts, the distance projector,
//! the TTL caches from §4.10/§9, and the startup-built lines catalog.
//! Constructed once in `main` and shared across handlers via `axum::State`.

use std::sync::Arc;
use std::time::Duration;

use alerts_core::cache::CacheLayer;
use alerts_core::clock::{Clock, SystemClock};
use alerts_core::enrich::EnrichedAlert;
use alerts_core::projector::{EquirectangularProjector, Projector};
use alerts_core::route_change::RouteChangesResult;
use alerts_core::store::{AlertStore, TimetableStore};

use crate::catalog::LinesCatalog;

const CACHE_TTL: Duration = Duration::from_secs(600);

/// Coordinates rounded to 6 decimals (per §6) as an integer key so it can be
/// hashed without running afoul of float `Eq`.
pub type RoundedCoord = (i64, i64);

pub fn round_coord(lat: f64, lon: f64) -> RoundedCoord {
    ((lat * 1_000_000.0).round() as i64, (lon * 1_000_000.0).round() as i64)
}

#[derive(Clone)]
pub struct SingleAlertBundle {
    pub alert: EnrichedAlert,
    pub route_changes: RouteChangesResult,
}

pub struct AppState {
    pub timetable: Arc<dyn TimetableStore>,
    pub alerts: Arc<dyn AlertStore>,
    pub clock: Arc<dyn Clock>,
    pub projector: Arc<dyn Projector>,
    pub lines_catalog: LinesCatalog,

    pub cache_all_alerts: CacheLayer<(), Vec<EnrichedAlert>>,
    pub cache_all_alerts_located: CacheLayer<RoundedCoord, Vec<EnrichedAlert>>,
    pub cache_single_alert: CacheLayer<String, Option<SingleAlertBundle>>,
    pub cache_route_changes: CacheLayer<String, RouteChangesResult>,
    pub cache_distance: CacheLayer<(String, RoundedCoord), Option<f64>>,
    pub cache_route_stop_coords: CacheLayer<String, Vec<(f64, f64)>>,
}

impl AppState {
    pub fn new(
        timetable: Arc<dyn TimetableStore>,
        alerts: Arc<dyn AlertStore>,
        lines_catalog: LinesCatalog,
    ) -> Self {
        Self {
            timetable,
            alerts,
            clock: Arc::new(SystemClock),
            projector: Arc::new(EquirectangularProjector),
            lines_catalog,
            cache_all_alerts: CacheLayer::new(1, CACHE_TTL),
            cache_all_alerts_located: CacheLayer::new(512, CACHE_TTL),
            cache_single_alert: CacheLayer::new(512, CACHE_TTL),
            cache_route_changes: CacheLayer::new(512, CACHE_TTL),
            cache_distance: CacheLayer::new(2048, CACHE_TTL),
            cache_route_stop_coords: CacheLayer::new(512, CACHE_TTL),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_coord_matches_six_decimal_precision() {
        assert_eq!(round_coord(32.123456_78, 34.987654_32), (32_123_457, 34_987_654));
    }
}
