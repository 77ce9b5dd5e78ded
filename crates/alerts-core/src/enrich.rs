//! Expands a `NormalizedAlert` into the display-ready shape the query API
//! hands back to clients: resolved stop/route/agency names, the next
//! relevant date, and (for SCHEDULE_CHANGES alerts) per-line departure
//! changes (§4.8).

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::Result;
use crate::headsign;
use crate::model::{NormalizedAlert, ScheduleChanges, UseCase};
use crate::projector::line_number_for_sorting;
use crate::representative_date;
use crate::store::{Agency, TimetableStore};

#[derive(Debug, Clone, Serialize)]
pub struct DepartureChange {
    pub route_id: String,
    pub agency_id: String,
    pub line_number: String,
    pub to_text: String,
    pub added_hours: Vec<String>,
    pub removed_hours: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrichedAlert {
    pub alert: NormalizedAlert,
    pub added_stops: Vec<(String, String)>,
    pub removed_stops: Vec<(String, String)>,
    pub relevant_lines: BTreeMap<String, Vec<String>>,
    pub relevant_agencies: Vec<Agency>,
    pub first_relevant_date: Option<NaiveDateTime>,
    pub current_active_period_start: Option<NaiveDateTime>,
    pub departure_changes: BTreeMap<String, BTreeMap<String, Vec<DepartureChange>>>,
    pub distance: Option<f64>,
}

async fn departure_changes(
    store: &dyn TimetableStore,
    alert: &NormalizedAlert,
    today_jerusalem: NaiveDateTime,
) -> Result<BTreeMap<String, BTreeMap<String, Vec<DepartureChange>>>> {
    if alert.use_case != UseCase::ScheduleChanges {
        return Ok(BTreeMap::new());
    }

    let Some(ScheduleChanges::TripChanges(changes)) = &alert.schedule_changes else {
        return Ok(BTreeMap::new());
    };

    let representative_date =
        representative_date::representative_date_for_timetable_lookup(alert, today_jerusalem);

    let mut by_agency_and_line: BTreeMap<String, BTreeMap<String, Vec<DepartureChange>>> = BTreeMap::new();

    for route_id in &alert.relevant_route_ids {
        let Some(route_metadata) = store.route_metadata(route_id).await? else {
            continue;
        };
        let representative_trip_id = store
            .representative_trip_id(route_id, representative_date)
            .await?;
        let to_text = match &representative_trip_id {
            Some(trip_id) => {
                let stop_seq = store.stop_sequence(trip_id).await?;
                headsign::headsign_for_trip(store, trip_id, &stop_seq).await?
            }
            None => String::new(),
        };

        let chgs = changes.get(route_id).cloned().unwrap_or_default();

        by_agency_and_line
            .entry(route_metadata.agency_id.clone())
            .or_default()
            .entry(route_metadata.line_number.clone())
            .or_default()
            .push(DepartureChange {
                route_id: route_id.clone(),
                agency_id: route_metadata.agency_id,
                line_number: route_metadata.line_number,
                to_text,
                added_hours: chgs.added,
                removed_hours: chgs.removed,
            });
    }

    for lines in by_agency_and_line.values_mut() {
        for line_changes in lines.values_mut() {
            line_changes.sort_by(|a, b| a.to_text.cmp(&b.to_text));
        }
    }

    Ok(by_agency_and_line)
}

pub async fn enrich_alert(
    store: &dyn TimetableStore,
    alert: NormalizedAlert,
    today_jerusalem: NaiveDateTime,
) -> Result<EnrichedAlert> {
    let stops = store
        .stops_metadata(
            &alert
                .added_stop_ids
                .iter()
                .chain(alert.removed_stop_ids.iter())
                .cloned()
                .collect::<Vec<_>>(),
        )
        .await?;

    let mut added_stops: Vec<(String, String)> = alert
        .added_stop_ids
        .iter()
        .filter_map(|id| stops.get(id).map(|s| (s.stop_code.clone(), s.stop_name.clone())))
        .collect();
    added_stops.sort_by(|a, b| line_number_for_sorting(&a.0).cmp(&line_number_for_sorting(&b.0)));
    added_stops.dedup();

    let mut removed_stops: Vec<(String, String)> = alert
        .removed_stop_ids
        .iter()
        .filter_map(|id| stops.get(id).map(|s| (s.stop_code.clone(), s.stop_name.clone())))
        .collect();
    removed_stops.sort_by(|a, b| line_number_for_sorting(&a.0).cmp(&line_number_for_sorting(&b.0)));
    removed_stops.dedup();

    let routes = store.routes_short_metadata(&alert.relevant_route_ids).await?;
    let mut lines: BTreeMap<String, std::collections::BTreeSet<String>> = BTreeMap::new();
    for route_id in &alert.relevant_route_ids {
        if let Some((short_name, agency_id)) = routes.get(route_id) {
            lines.entry(agency_id.clone()).or_default().insert(short_name.clone());
        }
    }
    let relevant_lines: BTreeMap<String, Vec<String>> = lines
        .into_iter()
        .map(|(agency_id, names)| {
            let mut v: Vec<String> = names.into_iter().collect();
            v.sort_by(|a, b| line_number_for_sorting(a).cmp(&line_number_for_sorting(b)));
            (agency_id, v)
        })
        .collect();

    let agencies = store.agencies(&alert.relevant_agencies).await?;
    let mut relevant_agencies: Vec<Agency> = alert
        .relevant_agencies
        .iter()
        .filter_map(|id| agencies.get(id).cloned())
        .collect();
    relevant_agencies.sort_by(|a, b| a.agency_name.cmp(&b.agency_name));

    let today_jerusalem_midnight = today_jerusalem.date().and_hms_opt(0, 0, 0).unwrap();
    let (first_relevant_date, current_active_period_start) =
        representative_date::next_relevant_date(&alert, today_jerusalem_midnight);

    let departure_changes = departure_changes(store, &alert, today_jerusalem_midnight).await?;

    Ok(EnrichedAlert {
        added_stops,
        removed_stops,
        relevant_lines,
        relevant_agencies,
        first_relevant_date,
        current_active_period_start,
        departure_changes,
        distance: None,
        alert,
    })
}

/// Ranks enriched alerts the way the reference UI does: active alerts
/// first, closest first (by distance, then by relevance date), with
/// expired/deleted alerts pushed to the end and local alerts preferred
/// over national ones among those stale entries.
pub fn sort_alerts(alerts: &mut [EnrichedAlert], now_jerusalem: NaiveDateTime) {
    alerts.sort_by(|a, b| sort_key(a, now_jerusalem).cmp(&sort_key(b, now_jerusalem)));
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct SortKey {
    is_expired: bool,
    is_deleted: bool,
    distance_bits: u64,
    relevance: NaiveDateTime,
    not_national_if_stale: bool,
}

fn sort_key(alert: &EnrichedAlert, now_jerusalem: NaiveDateTime) -> SortKey {
    let is_expired = alert.alert.is_expired(now_jerusalem);
    let is_deleted = alert.alert.is_deleted();
    let distance = alert.distance.unwrap_or(f64::INFINITY);
    let relevance = alert.current_active_period_start.unwrap_or(alert.alert.last_end_time);
    let not_national_if_stale = if is_expired || is_deleted { !alert.alert.is_national } else { false };

    SortKey {
        is_expired,
        is_deleted,
        distance_bits: distance.to_bits(),
        relevance,
        not_national_if_stale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActivePeriods, Selector, UseCase};

    fn sample(id: &str, is_national: bool, last_end: NaiveDateTime) -> EnrichedAlert {
        EnrichedAlert {
            alert: NormalizedAlert {
                id: id.to_string(),
                first_start_time: last_end,
                last_end_time: last_end,
                raw_data: vec![],
                use_case: UseCase::National,
                original_selector: Some(Selector::National {}),
                cause: "OTHER_CAUSE".into(),
                effect: "OTHER_EFFECT".into(),
                url: BTreeMap::new(),
                header: BTreeMap::new(),
                description: BTreeMap::new(),
                active_periods: ActivePeriods::default(),
                schedule_changes: None,
                is_national,
                deletion_tstz: None,
                relevant_agencies: vec![],
                relevant_route_ids: vec![],
                added_stop_ids: vec![],
                removed_stop_ids: vec![],
            },
            added_stops: vec![],
            removed_stops: vec![],
            relevant_lines: BTreeMap::new(),
            relevant_agencies: vec![],
            first_relevant_date: None,
            current_active_period_start: None,
            departure_changes: BTreeMap::new(),
            distance: None,
        }
    }

    #[test]
    fn active_alerts_sort_before_expired_ones() {
        use chrono::NaiveDate;
        let now = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let expired_end = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let active_end = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();

        let mut alerts = vec![sample("expired", true, expired_end), sample("active", true, active_end)];
        sort_alerts(&mut alerts, now);
        assert_eq!(alerts[0].alert.id, "active");
        assert_eq!(alerts[1].alert.id, "expired");
    }

    #[test]
    fn among_stale_alerts_local_sorts_before_national() {
        use chrono::NaiveDate;
        let now = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let expired_end = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();

        let mut alerts = vec![sample("national", true, expired_end), sample("local", false, expired_end)];
        sort_alerts(&mut alerts, now);
        assert_eq!(alerts[0].alert.id, "local");
        assert_eq!(alerts[1].alert.id, "national");
    }
}
