//! Turns a decoded GTFS-RT `FeedMessage` into the `RawAlert`s the classifier
//! consumes, so `alerts-core` never has to depend on `gtfs-realtime`/`prost`.

use std::collections::BTreeMap;

use alerts_core::model::{InformedEntity, RawActivePeriod, RawAlert, ScheduleRelationship, TripDescriptor};
use prost::Message;

use crate::error::{IngestError, Result};

const MAX_FEED_SIZE: usize = 50 * 1024 * 1024;

pub fn decode_feed(bytes: &[u8]) -> Result<gtfs_realtime::FeedMessage> {
    if bytes.len() > MAX_FEED_SIZE {
        tracing::warn!(len = bytes.len(), "feed exceeds expected size, decoding anyway");
    }
    gtfs_realtime::FeedMessage::decode(bytes).map_err(IngestError::from)
}

/// en dash / right single quote are the only two `\uXXXX` escapes the
/// upstream producer reliably mangles; repaired by `alerts_core::selector`
/// once the raw translation strings reach the classifier.
fn translations_to_dict(translation: &[gtfs_realtime::translated_string::Translation]) -> BTreeMap<String, String> {
    translation
        .iter()
        .filter(|t| !t.text.is_empty())
        .map(|t| (t.language.clone().unwrap_or_default(), t.text.clone()))
        .collect()
}

fn cause_to_str(cause: Option<i32>) -> String {
    match cause.unwrap_or(1) {
        1 => "UNKNOWN_CAUSE",
        2 => "OTHER_CAUSE",
        3 => "TECHNICAL_PROBLEM",
        4 => "STRIKE",
        5 => "DEMONSTRATION",
        6 => "ACCIDENT",
        7 => "HOLIDAY",
        8 => "WEATHER",
        9 => "MAINTENANCE",
        10 => "CONSTRUCTION",
        11 => "POLICE_ACTIVITY",
        12 => "MEDICAL_EMERGENCY",
        _ => "UNKNOWN_CAUSE",
    }
    .to_string()
}

fn effect_to_str(effect: Option<i32>) -> String {
    match effect.unwrap_or(8) {
        1 => "NO_SERVICE",
        2 => "REDUCED_SERVICE",
        3 => "SIGNIFICANT_DELAYS",
        4 => "DETOUR",
        5 => "ADDITIONAL_SERVICE",
        6 => "MODIFIED_SERVICE",
        7 => "OTHER_EFFECT",
        8 => "UNKNOWN_EFFECT",
        9 => "STOP_MOVED",
        10 => "NO_EFFECT",
        11 => "ACCESSIBILITY_ISSUE",
        _ => "UNKNOWN_EFFECT",
    }
    .to_string()
}

fn schedule_relationship(v: Option<i32>) -> Option<ScheduleRelationship> {
    Some(match v? {
        0 => ScheduleRelationship::Scheduled,
        1 => ScheduleRelationship::Added,
        2 => ScheduleRelationship::Unscheduled,
        3 => ScheduleRelationship::Canceled,
        5 => ScheduleRelationship::Replacement,
        _ => return None,
    })
}

fn entity_selector(e: &gtfs_realtime::EntitySelector) -> InformedEntity {
    InformedEntity {
        agency_id: e.agency_id.clone().unwrap_or_default(),
        route_id: e.route_id.clone().unwrap_or_default(),
        stop_id: e.stop_id.clone().unwrap_or_default(),
        trip: e.trip.as_ref().map(|t| TripDescriptor {
            route_id: t.route_id.clone().unwrap_or_default(),
            trip_id: t.trip_id.clone().unwrap_or_default(),
            start_time: t.start_time.clone().unwrap_or_default(),
            schedule_relationship: schedule_relationship(t.schedule_relationship),
        }),
    }
}

/// Decodes every `alert`-bearing entity in the feed into a `RawAlert`.
/// Entities without an `alert` payload (trip updates, vehicle positions) are
/// skipped; the MOT service-alerts feed shouldn't carry any, but nothing
/// prevents it.
pub fn raw_alerts_from_feed(feed: &gtfs_realtime::FeedMessage) -> Vec<RawAlert> {
    feed.entity
        .iter()
        .filter_map(|entity| {
            let alert = entity.alert.as_ref()?;

            let active_periods = alert
                .active_period
                .iter()
                .map(|p| RawActivePeriod {
                    start: p.start.unwrap_or(0) as i64,
                    end: p.end.unwrap_or(0) as i64,
                })
                .collect();

            let url = alert
                .url
                .as_ref()
                .map(|t| translations_to_dict(&t.translation))
                .unwrap_or_default();
            let header = alert
                .header_text
                .as_ref()
                .map(|t| translations_to_dict(&t.translation))
                .unwrap_or_default();
            let description = alert
                .description_text
                .as_ref()
                .map(|t| translations_to_dict(&t.translation))
                .unwrap_or_default();

            Some(RawAlert {
                id: entity.id.clone(),
                cause: cause_to_str(alert.cause),
                effect: effect_to_str(alert.effect),
                active_periods,
                url,
                header,
                description,
                informed_entities: alert.informed_entity.iter().map(entity_selector).collect(),
                raw_data: entity.encode_to_vec(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cause_and_effect_fall_back_to_unknown() {
        assert_eq!(cause_to_str(None), "UNKNOWN_CAUSE");
        assert_eq!(cause_to_str(Some(99)), "UNKNOWN_CAUSE");
        assert_eq!(effect_to_str(None), "UNKNOWN_EFFECT");
    }

    #[test]
    fn cause_and_effect_map_known_codes() {
        assert_eq!(cause_to_str(Some(10)), "CONSTRUCTION");
        assert_eq!(effect_to_str(Some(1)), "NO_SERVICE");
    }

    #[test]
    fn schedule_relationship_maps_canceled() {
        assert_eq!(schedule_relationship(Some(3)), Some(ScheduleRelationship::Canceled));
        assert_eq!(schedule_relationship(Some(42)), None);
        assert_eq!(schedule_relationship(None), None);
    }

    #[test]
    fn entities_without_alert_payload_are_skipped() {
        let feed = gtfs_realtime::FeedMessage {
            header: gtfs_realtime::FeedHeader {
                gtfs_realtime_version: "2.0".to_string(),
                incrementality: Some(0),
                timestamp: Some(0),
                feed_version: None,
            },
            entity: vec![gtfs_realtime::FeedEntity {
                id: "no-alert".to_string(),
                is_deleted: None,
                trip_update: None,
                vehicle: None,
                alert: None,
                shape: None,
                stop: None,
                trip_modifications: None,
            }],
        };
        assert!(raw_alerts_from_feed(&feed).is_empty());
    }
}
