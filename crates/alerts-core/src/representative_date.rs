//! Picks the single calendar date that best represents an alert, for display
//! (§4.5) and for resolving a route's representative trip (§4.6).

use chrono::{NaiveDate, NaiveDateTime};

use crate::model::NormalizedAlert;

fn day_start(dt: NaiveDateTime) -> NaiveDateTime {
    dt.date().and_hms_opt(0, 0, 0).unwrap()
}

/// Picks the date a route-change diagram should be rendered against: the
/// active period closest to "now", preferring the currently running one.
pub fn find_representative_date(alert: &NormalizedAlert, today_jerusalem: NaiveDateTime) -> NaiveDateTime {
    if alert.is_expired(today_jerusalem) {
        let mut representative = None;
        for period in &alert.active_periods.raw {
            let end = period.end_opt();
            if end.is_none() {
                return today_jerusalem;
            }
            let end_dt = crate::consolidator::to_jerusalem_naive(end.unwrap());
            if representative.is_none() || end_dt > representative.unwrap() {
                representative = Some(end_dt);
            }
        }
        return representative.unwrap_or(today_jerusalem);
    }

    if alert.is_deleted() {
        return day_start(alert.last_end_time);
    }

    let mut representative: Option<NaiveDateTime> = None;
    for period in &alert.active_periods.raw {
        let start = period.start_opt().map(crate::consolidator::to_jerusalem_naive);
        let end = period.end_opt().map(crate::consolidator::to_jerusalem_naive);

        if start.is_none() && end.is_none() {
            return today_jerusalem;
        }

        if let Some(e) = end {
            if e <= today_jerusalem {
                continue;
            }
        }

        if start.is_none() || start.unwrap() <= today_jerusalem {
            return today_jerusalem;
        }

        let d = day_start(start.unwrap());
        if representative.is_none() || d < representative.unwrap() {
            representative = Some(d);
        }
    }

    representative.unwrap_or(today_jerusalem)
}

pub fn representative_date_for_timetable_lookup(
    alert: &NormalizedAlert,
    today_jerusalem: NaiveDateTime,
) -> NaiveDate {
    find_representative_date(alert, today_jerusalem).date()
}

/// Next day an alert is relevant to a rider, and the start instant of the
/// active period that makes it so (§4.6). Returns `(None, None)` for deleted
/// or expired alerts, matching the reference behavior of leaving both fields
/// absent.
pub fn next_relevant_date(
    alert: &NormalizedAlert,
    today_jerusalem: NaiveDateTime,
) -> (Option<NaiveDateTime>, Option<NaiveDateTime>) {
    if alert.is_deleted() || alert.is_expired(today_jerusalem) {
        return (None, None);
    }

    let mut first_relevant_date = None;
    let mut current_active_period_start = None;

    for period in &alert.active_periods.raw {
        let start = period.start_opt().map(crate::consolidator::to_jerusalem_naive);
        let end = period.end_opt().map(crate::consolidator::to_jerusalem_naive);

        if let Some(e) = end {
            if e <= today_jerusalem {
                continue;
            }
        }

        if start.is_none() || start.unwrap() <= today_jerusalem {
            first_relevant_date = Some(today_jerusalem);
            current_active_period_start =
                Some(start.unwrap_or_else(|| crate::consolidator::to_jerusalem_naive(0)));
            break;
        }

        let d = day_start(start.unwrap());
        if first_relevant_date.is_none() || d < first_relevant_date.unwrap() {
            first_relevant_date = Some(d);
            current_active_period_start = start;
        }
    }

    (first_relevant_date, current_active_period_start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActivePeriods, RawActivePeriod, Selector, UseCase};
    use chrono::{NaiveDate, TimeZone};
    use std::collections::BTreeMap;

    fn unix_at(y: i32, m: u32, d: u32, h: u32, min: u32) -> i64 {
        let naive = NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, 0).unwrap();
        crate::clock::JERUSALEM.from_local_datetime(&naive).single().unwrap().to_utc().timestamp()
    }

    fn jerus_naive(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, 0).unwrap()
    }

    fn base_alert(periods: Vec<RawActivePeriod>) -> NormalizedAlert {
        NormalizedAlert {
            id: "a1".into(),
            first_start_time: jerus_naive(2024, 1, 1, 0, 0),
            last_end_time: jerus_naive(2024, 1, 10, 0, 0),
            raw_data: vec![],
            use_case: UseCase::National,
            original_selector: Some(Selector::National {}),
            cause: "OTHER_CAUSE".into(),
            effect: "OTHER_EFFECT".into(),
            url: BTreeMap::new(),
            header: BTreeMap::new(),
            description: BTreeMap::new(),
            active_periods: ActivePeriods { raw: periods, consolidated: vec![] },
            schedule_changes: None,
            is_national: true,
            deletion_tstz: None,
            relevant_agencies: vec![],
            relevant_route_ids: vec![],
            added_stop_ids: vec![],
            removed_stop_ids: vec![],
        }
    }

    #[test]
    fn currently_active_period_picks_today() {
        let today = jerus_naive(2024, 1, 5, 0, 0);
        let alert = base_alert(vec![RawActivePeriod {
            start: unix_at(2024, 1, 1, 0, 0),
            end: unix_at(2024, 1, 10, 0, 0),
        }]);
        assert_eq!(find_representative_date(&alert, today), today);
    }

    #[test]
    fn future_period_picks_its_start_day() {
        let today = jerus_naive(2024, 1, 1, 0, 0);
        let alert = base_alert(vec![RawActivePeriod {
            start: unix_at(2024, 2, 1, 8, 0),
            end: unix_at(2024, 2, 1, 10, 0),
        }]);
        let rep = find_representative_date(&alert, today);
        assert_eq!(rep, jerus_naive(2024, 2, 1, 0, 0));
    }

    #[test]
    fn next_relevant_date_none_when_no_future_periods() {
        let today = jerus_naive(2024, 1, 20, 0, 0);
        let mut alert = base_alert(vec![RawActivePeriod {
            start: unix_at(2024, 1, 1, 0, 0),
            end: unix_at(2024, 1, 10, 0, 0),
        }]);
        alert.last_end_time = jerus_naive(2024, 1, 10, 0, 0);
        let (first, _) = next_relevant_date(&alert, today);
        assert_eq!(first, None);
    }
}
