use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Sentinel used for an alert's `last_end_time` when no active period has a
/// finite end (unix seconds for 2200-01-01T00:00:00Z).
pub const UNBOUNDED_END_UNIX: i64 = 7_258_118_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UseCase {
    National = 1,
    Agency = 2,
    Region = 3,
    Cities = 4,
    StopsCancelled = 5,
    RouteChangesFlex = 6,
    RouteChangesSimple = 7,
    ScheduleChanges = 8,
}

impl UseCase {
    pub fn has_route_change_semantics(self) -> bool {
        matches!(
            self,
            UseCase::StopsCancelled | UseCase::RouteChangesFlex | UseCase::RouteChangesSimple
        )
    }

    fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => UseCase::National,
            2 => UseCase::Agency,
            3 => UseCase::Region,
            4 => UseCase::Cities,
            5 => UseCase::StopsCancelled,
            6 => UseCase::RouteChangesFlex,
            7 => UseCase::RouteChangesSimple,
            8 => UseCase::ScheduleChanges,
            _ => return None,
        })
    }
}

impl Serialize for UseCase {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for UseCase {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct V;
        impl<'de> Visitor<'de> for V {
            type Value = UseCase;
            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an integer 1..=8")
            }
            fn visit_u64<E: de::Error>(self, v: u64) -> Result<UseCase, E> {
                UseCase::from_u8(v as u8).ok_or_else(|| E::custom(format!("unknown use_case {v}")))
            }
            fn visit_i64<E: de::Error>(self, v: i64) -> Result<UseCase, E> {
                UseCase::from_u8(v as u8).ok_or_else(|| E::custom(format!("unknown use_case {v}")))
            }
        }
        deserializer.deserialize_u64(V)
    }
}

/// `(route_id, stop_id)` as recorded by the classifier for ROUTE_CHANGES_*
/// use cases, kept for the response's `original_selector`.
pub type RouteStopPair = (String, String);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripSelectorEntry {
    pub route_id: String,
    pub fake_trip_id: String,
    pub action: i32,
    pub start_time: String,
}

/// Use-case-discriminated payload, kept as a tagged union per use case rather
/// than a free-form map (wire shape is untagged: the use_case tag itself
/// lives on the enclosing `NormalizedAlert`, not inside this value).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selector {
    National {},
    StopsCancelled {
        stop_ids: Vec<String>,
    },
    RouteChangesFlex {
        route_stop_pairs: Vec<RouteStopPair>,
        old_aramaic: String,
    },
    RouteChangesSimple {
        route_stop_pairs: Vec<RouteStopPair>,
    },
    ScheduleChanges {
        trips: Vec<TripSelectorEntry>,
    },
    Cities {
        cities: Vec<String>,
    },
    Region {
        old_aramaic: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteChangeRemoval {
    pub removed_stop_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteChangeAddition {
    pub added_stop_id: String,
    pub relative_stop_id: String,
    pub is_before: bool,
}

/// One ordered instruction against a route's representative stop sequence.
/// Order matters: FLEX alerts store additions before removals so an added
/// stop can be referenced by a later removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RouteChangeOp {
    Removal(RouteChangeRemoval),
    Addition(RouteChangeAddition),
}

impl RouteChangeOp {
    pub fn removed(stop_id: impl Into<String>) -> Self {
        RouteChangeOp::Removal(RouteChangeRemoval {
            removed_stop_id: stop_id.into(),
        })
    }

    pub fn added(added: impl Into<String>, relative_to: impl Into<String>, is_before: bool) -> Self {
        RouteChangeOp::Addition(RouteChangeAddition {
            added_stop_id: added.into(),
            relative_stop_id: relative_to.into(),
            is_before,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TripScheduleChange {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

/// Either per-route ordered add/remove stop ops (ROUTE_CHANGES_*), or
/// per-route added/removed departure times (SCHEDULE_CHANGES).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScheduleChanges {
    RouteOps(BTreeMap<String, Vec<RouteChangeOp>>),
    TripChanges(BTreeMap<String, TripScheduleChange>),
}

/// Raw `[start,end]` unix-second pair as it appears on the wire; `0` means
/// unbounded on that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawActivePeriod {
    pub start: i64,
    pub end: i64,
}

impl RawActivePeriod {
    pub fn start_opt(&self) -> Option<i64> {
        if self.start == 0 {
            None
        } else {
            Some(self.start)
        }
    }

    pub fn end_opt(&self) -> Option<i64> {
        if self.end == 0 {
            None
        } else {
            Some(self.end)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DateEntry {
    Range(String, String),
    Single(String),
}

/// `(start "HH:MM", end "HH:MM", crosses_midnight)`.
pub type TimeWindow = (String, String, bool);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConsolidatedPeriod {
    Simple {
        simple: (String, String),
    },
    Grouped {
        dates: Vec<DateEntry>,
        times: Vec<TimeWindow>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ActivePeriods {
    pub raw: Vec<RawActivePeriod>,
    pub consolidated: Vec<ConsolidatedPeriod>,
}

/// An alert entity as decoded from the upstream feed, before classification.
/// Constructed by the ingester from the protobuf `FeedEntity` so that
/// `alerts-core` never depends on the protobuf crates directly.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAlert {
    pub id: String,
    pub cause: String,
    pub effect: String,
    pub active_periods: Vec<RawActivePeriod>,
    pub url: BTreeMap<String, String>,
    pub header: BTreeMap<String, String>,
    pub description: BTreeMap<String, String>,
    pub informed_entities: Vec<InformedEntity>,
    pub raw_data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum ScheduleRelationship {
    Scheduled,
    Added,
    Canceled,
    Unscheduled,
    Replacement,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TripDescriptor {
    pub route_id: String,
    pub trip_id: String,
    pub start_time: String,
    pub schedule_relationship: Option<ScheduleRelationship>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InformedEntity {
    pub agency_id: String,
    pub route_id: String,
    pub stop_id: String,
    pub trip: Option<TripDescriptor>,
}

/// The persisted, classified alert. Immutable once written except for
/// `deletion_tstz`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedAlert {
    pub id: String,
    pub first_start_time: NaiveDateTime,
    pub last_end_time: NaiveDateTime,
    pub raw_data: Vec<u8>,
    pub use_case: UseCase,
    /// `None` only for `UseCase::Agency`, matching the upstream pipeline
    /// leaving `original_selector` unset (SQL NULL) for that one case.
    pub original_selector: Option<Selector>,
    pub cause: String,
    pub effect: String,
    pub url: BTreeMap<String, String>,
    pub header: BTreeMap<String, String>,
    pub description: BTreeMap<String, String>,
    pub active_periods: ActivePeriods,
    pub schedule_changes: Option<ScheduleChanges>,
    pub is_national: bool,
    pub deletion_tstz: Option<NaiveDateTime>,
    pub relevant_agencies: Vec<String>,
    pub relevant_route_ids: Vec<String>,
    pub added_stop_ids: Vec<String>,
    pub removed_stop_ids: Vec<String>,
}

impl NormalizedAlert {
    pub fn is_deleted(&self) -> bool {
        self.deletion_tstz.is_some()
    }

    pub fn is_expired(&self, now_jerusalem_naive: NaiveDateTime) -> bool {
        self.last_end_time < now_jerusalem_naive
    }
}

/// `(stop_id, is_added)` — one entry of a mutated trip's stop sequence.
pub type StopSequenceEntry = (String, bool);

/// Derived, never persisted: what a trip on `route_id` looks like with an
/// alert's route-change instructions applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteChange {
    pub route_id: String,
    pub agency_id: String,
    pub line_number: String,
    pub route_desc: Option<String>,
    pub to_text: String,
    pub updated_stop_sequence: Vec<StopSequenceEntry>,
    pub deleted_stop_ids: Vec<String>,
    pub shape: Vec<(f64, f64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn use_case_round_trips_through_json() {
        let v = serde_json::to_value(UseCase::RouteChangesFlex).unwrap();
        assert_eq!(v, serde_json::json!(6));
        let back: UseCase = serde_json::from_value(v).unwrap();
        assert_eq!(back, UseCase::RouteChangesFlex);
    }

    #[test]
    fn selector_national_serializes_to_empty_object() {
        let v = serde_json::to_value(Selector::National {}).unwrap();
        assert_eq!(v, serde_json::json!({}));
    }

    #[test]
    fn selector_stops_cancelled_round_trips() {
        let sel = Selector::StopsCancelled {
            stop_ids: vec!["S1".to_string(), "S2".to_string()],
        };
        let v = serde_json::to_value(&sel).unwrap();
        assert_eq!(v, serde_json::json!({"stop_ids": ["S1", "S2"]}));
    }

    #[test]
    fn raw_active_period_zero_is_unbounded() {
        let p = RawActivePeriod { start: 0, end: 100 };
        assert_eq!(p.start_opt(), None);
        assert_eq!(p.end_opt(), Some(100));
    }
}
