//! Client-facing JSON shapes. `AlertView` is the result of
//! `_clean_up_alert_dict` in the reference server: an `EnrichedAlert` minus
//! the fields the client never used (`schedule_changes`, `relevant_route_ids`,
//! `added_stop_ids`, `removed_stop_ids`) and minus the raw protobuf bytes,
//! which have no business leaving this process at all.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;
use utoipa::ToSchema;

use alerts_core::enrich::{DepartureChange, EnrichedAlert};
use alerts_core::model::{ActivePeriods, Selector, UseCase};
use alerts_core::store::{Agency, RouteMetadata};

#[derive(Debug, Serialize, ToSchema)]
pub struct AlertView {
    pub id: String,
    pub first_start_time: NaiveDateTime,
    pub last_end_time: NaiveDateTime,
    #[schema(value_type = i32)]
    pub use_case: UseCase,
    #[schema(value_type = Object)]
    pub original_selector: Option<Selector>,
    pub cause: String,
    pub effect: String,
    pub url: BTreeMap<String, String>,
    pub header: BTreeMap<String, String>,
    pub description: BTreeMap<String, String>,
    #[schema(value_type = Object)]
    pub active_periods: ActivePeriods,
    pub is_national: bool,
    pub is_deleted: bool,
    pub is_expired: bool,
    pub deletion_tstz: Option<NaiveDateTime>,
    pub added_stops: Vec<(String, String)>,
    pub removed_stops: Vec<(String, String)>,
    pub relevant_lines: BTreeMap<String, Vec<String>>,
    #[schema(value_type = Vec<Object>)]
    pub relevant_agencies: Vec<Agency>,
    pub first_relevant_date: Option<NaiveDateTime>,
    pub current_active_period_start: Option<NaiveDateTime>,
    #[schema(value_type = Object)]
    pub departure_changes: BTreeMap<String, BTreeMap<String, Vec<DepartureChange>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

impl AlertView {
    pub fn from_enriched(e: EnrichedAlert, now_jerusalem: NaiveDateTime) -> Self {
        let is_deleted = e.alert.is_deleted();
        let is_expired = e.alert.is_expired(now_jerusalem);
        AlertView {
            id: e.alert.id,
            first_start_time: e.alert.first_start_time,
            last_end_time: e.alert.last_end_time,
            use_case: e.alert.use_case,
            original_selector: e.alert.original_selector,
            cause: e.alert.cause,
            effect: e.alert.effect,
            url: e.alert.url,
            header: e.alert.header,
            description: e.alert.description,
            active_periods: e.alert.active_periods,
            is_national: e.alert.is_national,
            is_deleted,
            is_expired,
            deletion_tstz: e.alert.deletion_tstz,
            added_stops: e.added_stops,
            removed_stops: e.removed_stops,
            relevant_lines: e.relevant_lines,
            relevant_agencies: e.relevant_agencies,
            first_relevant_date: e.first_relevant_date,
            current_active_period_start: e.current_active_period_start,
            departure_changes: e.departure_changes,
            distance: e.distance,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AllAlertsResponse {
    pub alerts: Vec<AlertView>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SingleAlertResponse {
    pub alerts: Vec<AlertView>,
    #[schema(value_type = Object)]
    pub route_changes: Option<alerts_core::route_change::RouteChangesResult>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LineView {
    pub route_id: String,
    pub agency_id: String,
    pub agency_name: String,
    pub line_number: String,
    pub route_desc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

impl From<RouteMetadata> for LineView {
    fn from(r: RouteMetadata) -> Self {
        LineView {
            route_id: r.route_id,
            agency_id: r.agency_id,
            agency_name: r.agency_name,
            line_number: r.line_number,
            route_desc: r.route_desc,
            distance: None,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AllLinesResponse {
    pub lines: Vec<LineView>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SingleLineResponse {
    pub line: Option<LineView>,
}
