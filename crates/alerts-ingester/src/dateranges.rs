//! Builds the dynamic `WHERE` clause for "which routes serve these stops
//! during these active periods", grounded on
//! `generate_query___fetch_all_routeids_at_stops_in_dateranges` and
//! `split_active_period_to_subperiods`. Postgres-specific: `daterange`
//! overlap and `AT TIME ZONE` arithmetic over the GTFS `calendar` table.

use alerts_core::model::RawActivePeriod;
use chrono::{DateTime, Datelike, Duration, NaiveDateTime, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{Postgres, QueryBuilder};

const GTFS_CALENDAR_DOW: [&str; 7] = [
    "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday",
];

fn dow_column(weekday: Weekday) -> &'static str {
    GTFS_CALENDAR_DOW[weekday.num_days_from_monday() as usize]
}

/// One of the (up to three) pieces `split_active_period_to_subperiods`
/// breaks a period into: a sub-day remainder at the start, a whole-days
/// middle section, and a sub-day remainder at the end. Each side of a part
/// can be open-ended.
struct SubPeriod {
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
}

/// Ports `split_active_period_to_subperiods`: MOT timestamps are unix
/// seconds that represent *local* Jerusalem time despite the GTFS-RT spec
/// defining active_period as UTC, so the conversion here is a naive
/// reinterpretation, not a timezone conversion.
fn split_active_period_to_subperiods(tz: Tz, start_unix: i64, end_unix: i64) -> Vec<SubPeriod> {
    let has_start = start_unix != 0;
    let has_end = end_unix != 0;

    let start_local = has_start.then(|| naive_from_unix(tz, start_unix));
    let end_local = has_end.then(|| naive_from_unix(tz, end_unix));

    if let (Some(s), Some(e)) = (start_local, end_local) {
        if s.date() == e.date() {
            return vec![SubPeriod { start: Some(s), end: Some(e) }];
        }
    }

    let starts_midnight = start_local.map(is_midnight).unwrap_or(false);
    let ends_midnight = end_local.map(is_midnight).unwrap_or(false);

    let mut parts = Vec::with_capacity(3);
    let mut middle_start = start_local;
    let mut middle_end = end_local;

    if let Some(s) = start_local {
        if !starts_midnight {
            let midnight_after = day_start(s) + Duration::days(1);
            parts.push(SubPeriod { start: Some(s), end: Some(midnight_after) });
            middle_start = Some(midnight_after);
        }
    }

    if let Some(e) = end_local {
        if !ends_midnight {
            let midnight_before = day_start(e);
            parts.push(SubPeriod { start: Some(midnight_before), end: Some(e) });
            middle_end = Some(midnight_before);
        }
    }

    if middle_start != middle_end {
        parts.insert(
            if parts.len() == 2 { 1 } else { 0 },
            SubPeriod { start: middle_start, end: middle_end },
        );
    }

    parts
}

fn naive_from_unix(tz: Tz, unix: i64) -> NaiveDateTime {
    let utc = DateTime::<Utc>::from_timestamp(unix, 0).unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap());
    // Reinterpret the UTC wall-clock reading as already being Jerusalem
    // local time, matching the reference pipeline's (deliberately wrong,
    // but contractually stable) timestamp handling.
    utc.naive_utc()
        .and_local_timezone(tz)
        .single()
        .map(|dt| dt.naive_local())
        .unwrap_or_else(|| utc.naive_utc())
}

fn is_midnight(dt: NaiveDateTime) -> bool {
    dt.time().hour() == 0 && dt.time().minute() == 0
}

fn day_start(dt: NaiveDateTime) -> NaiveDateTime {
    dt.date().and_hms_opt(0, 0, 0).unwrap()
}

/// Every calendar day the sub-period's datetime range touches, matching the
/// reference's `d = s; while d < e: … d += 1 day` loop — a same-day
/// sub-period still contributes its one weekday since the loop compares
/// full datetimes, not dates.
fn relevant_weekdays(start: NaiveDateTime, end: NaiveDateTime) -> Vec<Weekday> {
    let mut seen = std::collections::BTreeSet::new();
    let mut d = start;
    while d < end && seen.len() < 7 {
        seen.insert(d.date().weekday().num_days_from_monday() as u8);
        d += Duration::days(1);
    }
    seen.into_iter().map(|n| Weekday::try_from(n).unwrap()).collect()
}

/// Appends `AND ((cond1) OR (cond2) OR …)` over every sub-period of every
/// active period to `builder`, returning whether any condition was added
/// (a sub-period open on both sides contributes nothing, matching the
/// Python's `if part_condition != ''`).
///
/// Each non-trivial sub-period always contributes its base temporal
/// condition: a single-side date inequality when one side is unbounded, or
/// a calendar/arrival-time `OVERLAPS` check when both sides are bounded.
/// For a bounded sub-period whose weekday set is neither empty nor the full
/// week, a day-of-week mask is layered on top of the overlap check as an
/// additional `AND` clause — it never replaces the base condition.
pub fn push_dateranges_condition(builder: &mut QueryBuilder<'_, Postgres>, tz: Tz, periods: &[RawActivePeriod]) -> bool {
    let mut any = false;
    let mut first_condition = true;

    for period in periods {
        for sub in split_active_period_to_subperiods(tz, period.start, period.end) {
            match (sub.start, sub.end) {
                (Some(s), None) => {
                    open_condition(builder, &mut first_condition);
                    builder.push("calendar.end_date AT TIME ZONE 'Asia/Jerusalem' + stoptimes_int.arrival_time >= ");
                    builder.push_bind(s);
                    any = true;
                }
                (None, Some(e)) => {
                    open_condition(builder, &mut first_condition);
                    builder.push("calendar.start_date AT TIME ZONE 'Asia/Jerusalem' + stoptimes_int.arrival_time < ");
                    builder.push_bind(e);
                    any = true;
                }
                (Some(s), Some(e)) => {
                    open_condition(builder, &mut first_condition);
                    push_overlap_clause(builder, s, e);

                    let dows = relevant_weekdays(s, e);
                    if !dows.is_empty() && dows.len() < 7 {
                        let less_than_a_day = (e - s) < Duration::days(1);

                        builder.push(" AND ((stoptimes_int.arrival_time < INTERVAL '24 hours' AND (");
                        push_dow_disjunction(builder, &dows, 0);
                        builder.push(")");
                        if less_than_a_day {
                            push_within_window(builder, s, e, 0);
                        }
                        builder.push(") OR (stoptimes_int.arrival_time >= INTERVAL '24 hours' AND (");
                        push_dow_disjunction(builder, &dows, 1);
                        builder.push(")");
                        if less_than_a_day {
                            push_within_window(builder, s, e, 1);
                        }
                        builder.push("))");
                    }
                    any = true;
                }
                (None, None) => {}
            }
        }
    }

    if !first_condition {
        builder.push("))");
    }

    any
}

fn open_condition(builder: &mut QueryBuilder<'_, Postgres>, first_condition: &mut bool) {
    if *first_condition {
        builder.push(" AND ((");
        *first_condition = false;
    } else {
        builder.push(") OR (");
    }
}

fn push_overlap_clause(builder: &mut QueryBuilder<'_, Postgres>, s: NaiveDateTime, e: NaiveDateTime) {
    builder.push(
        "(calendar.start_date AT TIME ZONE 'Asia/Jerusalem' + stoptimes_int.arrival_time, \
         calendar.end_date AT TIME ZONE 'Asia/Jerusalem' + stoptimes_int.arrival_time + INTERVAL '1 second') OVERLAPS (",
    );
    builder.push_bind(s);
    builder.push(", ");
    builder.push_bind(e);
    builder.push(")");
}

fn push_dow_disjunction(builder: &mut QueryBuilder<'_, Postgres>, dows: &[Weekday], shift: i64) {
    let mut sep = builder.separated(" OR ");
    for &dow in dows {
        let shifted = (dow.num_days_from_monday() as i64 - shift).rem_euclid(7) as usize;
        sep.push(format!("calendar.{} = TRUE", GTFS_CALENDAR_DOW[shifted]));
    }
}

/// `shift` picks which calendar day the time-of-day window is anchored to:
/// 0 for the `<24h` arrival-time branch, 1 for the `>=24h` branch, where the
/// arrival belongs to the previous service day's calendar row.
fn push_within_window(builder: &mut QueryBuilder<'_, Postgres>, s: NaiveDateTime, e: NaiveDateTime, shift: i64) {
    builder.push(" AND (");
    builder.push_bind(day_start(s) - Duration::days(shift));
    builder.push(" + stoptimes_int.arrival_time) BETWEEN ");
    builder.push_bind(s);
    builder.push(" AND ");
    builder.push_bind(e);
}

/// `SELECT DISTINCT route_id FROM trips … WHERE stoptimes_int.stop_id = ANY($1) [AND (…dateranges…)]`
pub fn build_routes_at_stops_query<'a>(
    stop_ids: &'a [String],
    periods: &'a [RawActivePeriod],
    tz: Tz,
) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::new(
        "SELECT DISTINCT route_id FROM trips \
         INNER JOIN stoptimes_int ON trips.trip_id = stoptimes_int.trip_id \
         INNER JOIN calendar ON trips.service_id = calendar.service_id \
         WHERE stoptimes_int.stop_id = ANY(",
    );
    builder.push_bind(stop_ids);
    builder.push(")");
    push_dateranges_condition(&mut builder, tz, periods);
    builder
}

pub fn build_routes_at_stops_statement<'a>(
    stop_ids: &'a [String],
    periods: &'a [RawActivePeriod],
    tz: Tz,
) -> Query<'a, Postgres, PgArguments> {
    build_routes_at_stops_query(stop_ids, periods, tz).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn jerusalem() -> Tz {
        chrono_tz::Asia::Jerusalem
    }

    #[test]
    fn single_day_period_is_one_subperiod() {
        let start = jerusalem()
            .with_ymd_and_hms(2024, 1, 1, 8, 0, 0)
            .unwrap()
            .naive_local();
        let end = jerusalem()
            .with_ymd_and_hms(2024, 1, 1, 20, 0, 0)
            .unwrap()
            .naive_local();
        let start_unix = start.and_utc().timestamp();
        let end_unix = end.and_utc().timestamp();

        let parts = split_active_period_to_subperiods(jerusalem(), start_unix, end_unix);
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn multi_day_period_splits_into_three_parts() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_opt(20, 0, 0)
            .unwrap();

        let parts = split_active_period_to_subperiods(jerusalem(), start.and_utc().timestamp(), end.and_utc().timestamp());
        assert_eq!(parts.len(), 3);
    }

    #[test]
    fn zero_means_unbounded_on_that_side() {
        let end = NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let parts = split_active_period_to_subperiods(jerusalem(), 0, end.and_utc().timestamp());
        assert!(parts.iter().any(|p| p.start.is_none()));
    }

    #[test]
    fn relevant_weekdays_stops_collecting_at_seven() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(relevant_weekdays(start, end).len(), 7);
    }

    #[test]
    fn relevant_weekdays_includes_start_day_for_a_same_day_period() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(8, 0, 0).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(20, 0, 0).unwrap();
        assert_eq!(relevant_weekdays(start, end), vec![Weekday::Mon]);
    }

    #[test]
    fn single_day_period_overlap_condition_is_present() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(8, 0, 0).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(20, 0, 0).unwrap();
        let periods = vec![RawActivePeriod { start: start.and_utc().timestamp(), end: end.and_utc().timestamp() }];

        let query = build_routes_at_stops_query(&[], &periods, jerusalem());
        let sql = query.sql();

        assert!(sql.contains("OVERLAPS"), "expected an OVERLAPS clause, got: {sql}");
        assert!(sql.contains("calendar.monday = TRUE"), "expected a Monday mask, got: {sql}");
    }

    #[test]
    fn open_ended_period_emits_single_side_inequality() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let periods = vec![RawActivePeriod { start: start.and_utc().timestamp(), end: 0 }];

        let query = build_routes_at_stops_query(&[], &periods, jerusalem());
        let sql = query.sql();

        assert!(
            sql.contains("calendar.end_date AT TIME ZONE 'Asia/Jerusalem' + stoptimes_int.arrival_time >= "),
            "expected a start-open inequality, got: {sql}"
        );
        assert!(!sql.contains("OVERLAPS"), "an unbounded side must not use OVERLAPS, got: {sql}");
    }
}
