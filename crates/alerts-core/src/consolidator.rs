//! Collapses a list of raw `(start,end)` active periods into a compact,
//! human-readable structure of grouped date ranges and time-of-day windows.

use std::collections::HashMap;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone};

use crate::model::{ConsolidatedPeriod, DateEntry, RawActivePeriod, TimeWindow};

pub fn to_jerusalem_naive(unix: i64) -> NaiveDateTime {
    let utc = chrono::DateTime::from_timestamp(unix, 0).expect("unix timestamp in range");
    crate::clock::JERUSALEM
        .from_utc_datetime(&utc.naive_utc())
        .naive_local()
}

fn day_start(dt: NaiveDateTime) -> NaiveDateTime {
    dt.date().and_hms_opt(0, 0, 0).unwrap()
}

/// Collapses raw active periods, matching the reference pipeline's two-pass
/// consolidation: unbounded/multi-day periods fall back to `simple` entries;
/// everything else is grouped by identical daily time windows, then by
/// contiguous date ranges.
pub fn consolidate_active_periods(periods: &[RawActivePeriod]) -> Vec<ConsolidatedPeriod> {
    let mut result = Vec::new();
    // day tuple -> list of ((startH,startM),(endH,endM),crosses_midnight)
    let mut might_need_consolidation: HashMap<(i32, u32, u32), Vec<((u32, u32), (u32, u32), bool)>> =
        HashMap::new();
    let mut day_order: Vec<(i32, u32, u32)> = Vec::new();

    for period in periods {
        let start_opt = period.start_opt();
        let end_opt = period.end_opt();

        let (start, end) = match (start_opt, end_opt) {
            (Some(s), Some(e)) => (to_jerusalem_naive(s), to_jerusalem_naive(e)),
            _ => {
                // An unbounded side can't be consolidated into a day group.
                let start_str = start_opt
                    .map(|s| jerusalem_iso8601(to_jerusalem_naive(s)))
                    .unwrap_or_default();
                let end_str = end_opt
                    .map(|e| jerusalem_iso8601(to_jerusalem_naive(e)))
                    .unwrap_or_default();
                result.push(ConsolidatedPeriod::Simple {
                    simple: (start_str, end_str),
                });
                continue;
            }
        };

        let start_day = day_start(start);
        let end_day = day_start(end);

        if end_day > start_day + Duration::days(1) {
            result.push(ConsolidatedPeriod::Simple {
                simple: (jerusalem_iso8601(start), jerusalem_iso8601(end)),
            });
            continue;
        }

        let key = (start_day.year(), start_day.month(), start_day.day());
        let crosses_midnight = end_day > start_day;
        let entry = might_need_consolidation.entry(key).or_insert_with(|| {
            day_order.push(key);
            Vec::new()
        });
        entry.push((
            (start.hour_min()),
            (end.hour_min()),
            crosses_midnight,
        ));
    }

    // Group days that share an identical (order-sensitive, as inserted) set
    // of time windows.
    let mut consolidated_groups: Vec<(Vec<(i32, u32, u32)>, Vec<((u32, u32), (u32, u32), bool)>)> =
        Vec::new();

    for date_tuple in day_order {
        let times = might_need_consolidation.get(&date_tuple).unwrap().clone();
        let mut found = false;
        for (dates, other_times) in consolidated_groups.iter_mut() {
            if other_times.len() == times.len() && *other_times == times {
                dates.push(date_tuple);
                found = true;
                break;
            }
        }
        if !found {
            consolidated_groups.push((vec![date_tuple], times));
        }
    }

    for (mut dates, mut times) in consolidated_groups {
        dates.sort();
        dates.dedup();
        let date_entries = consolidate_sorted_date_tuple_list(&dates);

        times.sort();
        times.dedup();
        let time_windows: Vec<TimeWindow> = times
            .into_iter()
            .map(|((sh, sm), (eh, em), crosses)| {
                (format!("{sh:02}:{sm:02}"), format!("{eh:02}:{em:02}"), crosses)
            })
            .collect();

        result.push(ConsolidatedPeriod::Grouped {
            dates: date_entries,
            times: time_windows,
        });
    }

    result
}

/// Collapses consecutive dates in a sorted, deduplicated list into inclusive
/// ranges; isolated dates stay scalar.
fn consolidate_sorted_date_tuple_list(sorted: &[(i32, u32, u32)]) -> Vec<DateEntry> {
    let mut result = Vec::new();
    let mut range_start: Option<(i32, u32, u32)> = None;
    let mut range_end: Option<(i32, u32, u32)> = None;
    let mut range_end_date: Option<NaiveDate> = None;

    for &(y, m, d) in sorted {
        let current = NaiveDate::from_ymd_opt(y, m, d).expect("valid date");

        match (range_start, range_end_date) {
            (None, _) => {
                range_start = Some((y, m, d));
                range_end = Some((y, m, d));
                range_end_date = Some(current);
            }
            (Some(_), Some(prev)) if current == prev + Duration::days(1) => {
                range_end = Some((y, m, d));
                range_end_date = Some(current);
            }
            _ => {
                push_date_entry(&mut result, range_start.unwrap(), range_end.unwrap());
                range_start = Some((y, m, d));
                range_end = Some((y, m, d));
                range_end_date = Some(current);
            }
        }
    }

    if let (Some(s), Some(e)) = (range_start, range_end) {
        push_date_entry(&mut result, s, e);
    }

    result
}

fn push_date_entry(result: &mut Vec<DateEntry>, start: (i32, u32, u32), end: (i32, u32, u32)) {
    if start == end {
        result.push(DateEntry::Single(date_tuple_to_str(start)));
    } else {
        result.push(DateEntry::Range(date_tuple_to_str(start), date_tuple_to_str(end)));
    }
}

fn date_tuple_to_str((y, m, d): (i32, u32, u32)) -> String {
    format!("{y:04}-{m:02}-{d:02}")
}

fn jerusalem_iso8601(dt: NaiveDateTime) -> String {
    // local time with the fixed Jerusalem offset at that instant.
    let localized = crate::clock::JERUSALEM
        .from_local_datetime(&dt)
        .single()
        .unwrap_or_else(|| crate::clock::JERUSALEM.from_utc_datetime(&dt));
    localized.to_rfc3339()
}

trait HourMin {
    fn hour_min(&self) -> (u32, u32);
}

impl HourMin for NaiveDateTime {
    fn hour_min(&self) -> (u32, u32) {
        use chrono::Timelike;
        (self.hour(), self.minute())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn unix_at(y: i32, m: u32, d: u32, h: u32, min: u32) -> i64 {
        let naive = NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap();
        crate::clock::JERUSALEM
            .from_local_datetime(&naive)
            .single()
            .unwrap()
            .to_utc()
            .timestamp()
    }

    #[test]
    fn scenario_1_two_days_same_window_merge_into_one_date_range() {
        let periods = vec![
            RawActivePeriod {
                start: unix_at(2024, 1, 1, 8, 0),
                end: unix_at(2024, 1, 1, 10, 0),
            },
            RawActivePeriod {
                start: unix_at(2024, 1, 2, 8, 0),
                end: unix_at(2024, 1, 2, 10, 0),
            },
        ];

        let result = consolidate_active_periods(&periods);
        assert_eq!(result.len(), 1);
        match &result[0] {
            ConsolidatedPeriod::Grouped { dates, times } => {
                assert_eq!(
                    dates,
                    &vec![DateEntry::Range("2024-01-01".into(), "2024-01-02".into())]
                );
                assert_eq!(times, &vec![("08:00".to_string(), "10:00".to_string(), false)]);
            }
            other => panic!("expected grouped entry, got {other:?}"),
        }
    }

    #[test]
    fn unbounded_period_is_simple() {
        let periods = vec![RawActivePeriod { start: 0, end: 0 }];
        let result = consolidate_active_periods(&periods);
        assert_eq!(result.len(), 1);
        assert!(matches!(result[0], ConsolidatedPeriod::Simple { .. }));
    }

    #[test]
    fn multi_day_span_is_simple() {
        let periods = vec![RawActivePeriod {
            start: unix_at(2024, 1, 1, 8, 0),
            end: unix_at(2024, 1, 4, 10, 0),
        }];
        let result = consolidate_active_periods(&periods);
        assert_eq!(result.len(), 1);
        assert!(matches!(result[0], ConsolidatedPeriod::Simple { .. }));
    }

    #[test]
    fn isolated_dates_stay_scalar() {
        let periods = vec![
            RawActivePeriod {
                start: unix_at(2024, 1, 1, 8, 0),
                end: unix_at(2024, 1, 1, 10, 0),
            },
            RawActivePeriod {
                start: unix_at(2024, 1, 5, 8, 0),
                end: unix_at(2024, 1, 5, 10, 0),
            },
        ];
        let result = consolidate_active_periods(&periods);
        match &result[0] {
            ConsolidatedPeriod::Grouped { dates, .. } => {
                assert_eq!(
                    dates,
                    &vec![
                        DateEntry::Single("2024-01-01".into()),
                        DateEntry::Single("2024-01-05".into())
                    ]
                );
            }
            other => panic!("expected grouped entry, got {other:?}"),
        }
    }
}
