//! The two storage contracts the engine is built against. Neither trait
//! knows about SQL; `crates/alerts-ingester` and `crates/alerts-query-api`
//! provide the Postgres-backed implementations.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{NormalizedAlert, RawActivePeriod};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agency {
    pub agency_id: String,
    pub agency_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub stop_id: String,
    pub stop_lat: f64,
    pub stop_lon: f64,
    pub stop_name: String,
    pub stop_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopCoord {
    pub stop_lon: f64,
    pub stop_lat: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteMetadata {
    pub route_id: String,
    pub route_desc: Option<String>,
    pub agency_id: String,
    pub line_number: String,
    pub agency_name: String,
}

/// Read-only queries over the static timetable (agencies, routes, stops,
/// trips, calendars, shapes). Mirrors the method surface of the reference
/// pipeline's timetable query helper, generalized behind a trait so the core
/// can be exercised with in-memory fakes.
#[async_trait]
pub trait TimetableStore: Send + Sync {
    async fn agencies(&self, ids: &[String]) -> Result<BTreeMap<String, Agency>>;

    async fn stops_metadata(&self, stop_ids: &[String]) -> Result<BTreeMap<String, Stop>>;

    async fn routes_short_metadata(
        &self,
        route_ids: &[String],
    ) -> Result<BTreeMap<String, (String, String)>>; // route_id -> (route_short_name, agency_id)

    async fn all_stop_coords_by_route_ids(&self, route_ids: &[String]) -> Result<Vec<(f64, f64)>>;

    /// Trip of `route_id` whose service window best matches `preferred_date`,
    /// per the reference pipeline's tie-break (service covers the date first,
    /// then started most recently, then nearest in time, then matching
    /// weekday).
    async fn representative_trip_id(
        &self,
        route_id: &str,
        preferred_date: NaiveDate,
    ) -> Result<Option<String>>;

    async fn stop_sequence(&self, trip_id: &str) -> Result<Vec<String>>;

    async fn route_metadata(&self, route_id: &str) -> Result<Option<RouteMetadata>>;

    /// Every route in the static timetable, agency name resolved. Backs the
    /// query API's one-shot "actual lines" catalog built at startup
    /// (spec §9's design note).
    async fn all_routes(&self) -> Result<Vec<RouteMetadata>>;

    async fn trip_headsign(&self, trip_id: &str) -> Result<Option<String>>;

    async fn stop_desc(&self, stop_ids: &[String]) -> Result<BTreeMap<String, String>>;

    /// `[(lon,lat), …]` ordered by `shape_pt_sequence`.
    async fn shape_points(&self, trip_id: &str) -> Result<Vec<(f64, f64)>>;

    async fn stops_for_map(&self, stop_ids: &[String]) -> Result<BTreeMap<String, StopCoord>>;

    async fn unique_agencies_for_routes(&self, route_ids: &[String]) -> Result<Vec<String>>;

    /// §4.3.1: distinct routes with some trip stopping at one of `stop_ids`
    /// on a service day overlapping any of `periods`.
    async fn routes_at_stops_in_dateranges(
        &self,
        stop_ids: &[String],
        periods: &[RawActivePeriod],
    ) -> Result<Vec<String>>;

    /// Resolves the feed's "fake" cancelled-trip ids to their scheduled
    /// departure time string, via `trip_id_to_date`.
    async fn departures_for_fake_trip_ids(
        &self,
        fake_trip_ids: &[String],
    ) -> Result<BTreeMap<String, String>>;

    /// §9 open question: cross-check the polygon handle against the store's
    /// own stop geometry column; the contract is a plain point-in-polygon
    /// test over `(stop_lat, stop_lon)`.
    async fn stops_by_polygon(&self, polygon: &[(String, String)]) -> Result<Vec<String>>;
}

/// Upsert/query of normalized alerts. Implementations own the
/// `alert`/`alert_agency`/`alert_route`/`alert_stop` reconciliation described
/// in §4.9.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn upsert_alert(&self, alert: &NormalizedAlert) -> Result<()>;

    /// Stamps `deletion_tstz = now` on every alert row whose id is absent
    /// from `keep_ids` and whose `deletion_tstz` is still null. Returns the
    /// number of rows touched.
    async fn mark_deleted_if_not_in(&self, keep_ids: &[String], now: NaiveDateTime) -> Result<u64>;

    async fn get_alert(&self, id: &str) -> Result<Option<NormalizedAlert>>;

    async fn get_alerts(&self) -> Result<Vec<NormalizedAlert>>;
}
