//! Assigns each raw alert to one of eight use cases and resolves it against
//! the static timetable, producing a `NormalizedAlert`.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDateTime};

use crate::error::Result;
use crate::model::{
    ActivePeriods, NormalizedAlert, RawAlert, RouteChangeOp, RouteStopPair, ScheduleChanges,
    ScheduleRelationship, Selector, TripScheduleChange, TripSelectorEntry, UseCase,
    UNBOUNDED_END_UNIX,
};
use crate::selector;
use crate::store::TimetableStore;

const CITY_LIST_PREFIX: &str = "ההודעה רלוונטית לישובים: ";

fn unix_to_naive(unix: i64) -> NaiveDateTime {
    DateTime::from_timestamp(unix, 0)
        .expect("unix timestamp in range")
        .naive_utc()
}

fn sorted_unique(mut v: Vec<String>) -> Vec<String> {
    v.sort();
    v.dedup();
    v
}

/// Computes the outer envelope `(first_start_time, last_end_time)`,
/// replicating the reference pipeline's quirky fold: any period with an
/// unbounded start resets the running minimum to epoch, and any period with
/// an unbounded end resets the running maximum to the "forever" sentinel —
/// regardless of what earlier periods already established.
fn envelope(raw: &RawAlert) -> (i64, i64) {
    let mut first_start_time: Option<i64> = None;
    let mut last_end_time: Option<i64> = None;

    for p in &raw.active_periods {
        if p.start != 0 {
            first_start_time = Some(match first_start_time {
                Some(existing) if existing <= p.start => existing,
                _ => p.start,
            });
        } else {
            first_start_time = Some(0);
        }

        if p.end != 0 {
            last_end_time = Some(match last_end_time {
                Some(existing) if existing >= p.end => existing,
                _ => p.end,
            });
        } else {
            last_end_time = Some(UNBOUNDED_END_UNIX);
        }
    }

    (
        first_start_time.unwrap_or(0),
        last_end_time.unwrap_or(UNBOUNDED_END_UNIX),
    )
}

pub async fn classify(raw: &RawAlert, store: &dyn TimetableStore) -> Result<NormalizedAlert> {
    let (first_start_unix, last_end_unix) = envelope(raw);
    let consolidated = crate::consolidator::consolidate_active_periods(&raw.active_periods);

    let mut url = raw.url.clone();
    let mut header = raw.header.clone();
    let mut description = raw.description.clone();
    for map in [&mut url, &mut header, &mut description] {
        for v in map.values_mut() {
            *v = selector::repair_unicode_escapes(v);
        }
    }

    let old_aramaic = description.remove(selector::OAR_LANGUAGE_TAG);

    let mut use_case: Option<UseCase> = None;
    let mut original_selector: Option<Selector> = None;
    let mut relevant_agencies: Vec<String> = Vec::new();
    let mut relevant_route_ids: Vec<String> = Vec::new();
    let mut added_stop_ids: Vec<String> = Vec::new();
    let mut removed_stop_ids: Vec<String> = Vec::new();
    let mut schedule_changes: Option<ScheduleChanges> = None;

    let has_ent = !raw.informed_entities.is_empty();
    let first_entity = raw.informed_entities.first();

    if use_case.is_none() && has_ent && !first_entity.unwrap().stop_id.is_empty() {
        let first = first_entity.unwrap();
        if first.route_id.is_empty() {
            // STOPS_CANCELLED: only stop_id selectors.
            let stop_ids: Vec<String> = raw
                .informed_entities
                .iter()
                .filter(|e| !e.stop_id.is_empty())
                .map(|e| e.stop_id.clone())
                .collect();

            removed_stop_ids.extend(stop_ids.iter().cloned());
            relevant_route_ids = store
                .routes_at_stops_in_dateranges(&removed_stop_ids, &raw.active_periods)
                .await?;
            relevant_agencies = store.unique_agencies_for_routes(&relevant_route_ids).await?;

            use_case = Some(UseCase::StopsCancelled);
            original_selector = Some(Selector::StopsCancelled { stop_ids });
        } else {
            // ROUTE_CHANGES_{SIMPLE,FLEX}: both route_id and stop_id present.
            let mut route_stop_pairs: Vec<RouteStopPair> = Vec::new();
            let mut changes: BTreeMap<String, Vec<RouteChangeOp>> = BTreeMap::new();
            let mut last_entity_route_id = String::new();

            for e in &raw.informed_entities {
                if e.stop_id.is_empty() || e.route_id.is_empty() {
                    continue;
                }

                removed_stop_ids.push(e.stop_id.clone());
                route_stop_pairs.push((e.route_id.clone(), e.stop_id.clone()));

                if !changes.contains_key(&e.route_id) {
                    changes.insert(e.route_id.clone(), Vec::new());
                    relevant_route_ids.push(e.route_id.clone());
                }
                changes
                    .get_mut(&e.route_id)
                    .unwrap()
                    .push(RouteChangeOp::removed(e.stop_id.clone()));

                last_entity_route_id = e.route_id.clone();
            }

            if old_aramaic.is_none() {
                use_case = Some(UseCase::RouteChangesSimple);
                original_selector = Some(Selector::RouteChangesSimple {
                    route_stop_pairs: route_stop_pairs.clone(),
                });
            } else {
                let oar_text = old_aramaic.clone().unwrap();
                use_case = Some(UseCase::RouteChangesFlex);
                original_selector = Some(Selector::RouteChangesFlex {
                    route_stop_pairs: route_stop_pairs.clone(),
                    old_aramaic: oar_text.clone(),
                });

                let oar_additions = selector::parse_route_changes(&oar_text)?;

                for (route_id, additions) in oar_additions {
                    if !changes.contains_key(&route_id) {
                        changes.insert(route_id.clone(), additions.clone());
                        // Faithfully reproduces the reference implementation's
                        // use of the loop variable left over from the
                        // informed_entity iteration above, rather than the
                        // route_id just resolved from the old-aramaic text.
                        relevant_route_ids.push(last_entity_route_id.clone());
                    } else {
                        // Additions go before removals: an addition may
                        // reference a stop a later removal deletes.
                        let existing = changes.remove(&route_id).unwrap();
                        let mut merged = additions.clone();
                        merged.extend(existing);
                        changes.insert(route_id, merged);
                    }

                    for addition in &additions {
                        if let RouteChangeOp::Addition(a) = addition {
                            added_stop_ids.push(a.added_stop_id.clone());
                        }
                    }
                }
            }

            removed_stop_ids = sorted_unique(removed_stop_ids);
            added_stop_ids = sorted_unique(added_stop_ids);
            relevant_route_ids = sorted_unique(relevant_route_ids);
            relevant_agencies = store.unique_agencies_for_routes(&relevant_route_ids).await?;
            schedule_changes = Some(ScheduleChanges::RouteOps(changes));
        }
    } else if use_case.is_none()
        && has_ent
        && first_entity
            .and_then(|e| e.trip.as_ref())
            .map(|t| !t.trip_id.is_empty())
            .unwrap_or(false)
    {
        use_case = Some(UseCase::ScheduleChanges);

        let mut trips = Vec::new();
        let mut all_fake_trip_ids: BTreeSet<String> = BTreeSet::new();
        let mut changes: BTreeMap<String, TripScheduleChange> = BTreeMap::new();

        for ie in &raw.informed_entities {
            let trip = ie.trip.clone().unwrap_or_default();

            trips.push(TripSelectorEntry {
                route_id: trip.route_id.clone(),
                fake_trip_id: trip.trip_id.clone(),
                action: trip
                    .schedule_relationship
                    .map(schedule_relationship_to_i32)
                    .unwrap_or(0),
                start_time: trip.start_time.clone(),
            });

            if !changes.contains_key(&trip.route_id) {
                changes.insert(trip.route_id.clone(), TripScheduleChange::default());
                relevant_route_ids.push(trip.route_id.clone());
            }

            let is_canceled = trip.schedule_relationship == Some(ScheduleRelationship::Canceled)
                && trip.trip_id != "0"
                && !trip.trip_id.is_empty();
            let is_added = trip.schedule_relationship == Some(ScheduleRelationship::Added)
                || trip.trip_id.is_empty()
                || trip.trip_id == "0";

            if is_canceled {
                changes.get_mut(&trip.route_id).unwrap().removed.push(trip.trip_id.clone());
                all_fake_trip_ids.insert(trip.trip_id.clone());
            } else if is_added {
                changes.get_mut(&trip.route_id).unwrap().added.push(trip.start_time.clone());
            }
        }

        let fake_ids: Vec<String> = all_fake_trip_ids.into_iter().collect();
        let departure_times = store.departures_for_fake_trip_ids(&fake_ids).await?;

        for change in changes.values_mut() {
            let mut removed: Vec<String> = change
                .removed
                .iter()
                .filter_map(|t| departure_times.get(t).cloned())
                .collect();
            removed.sort();
            change.removed = removed;
            change.added.sort();
        }

        relevant_agencies = store.unique_agencies_for_routes(&relevant_route_ids).await?;
        original_selector = Some(Selector::ScheduleChanges { trips });
        schedule_changes = Some(ScheduleChanges::TripChanges(changes));
    }

    let mut agency_ids: Vec<String> = Vec::new();
    let mut city_names: Option<Vec<String>> = None;

    if use_case.is_none() {
        if has_ent {
            agency_ids = raw
                .informed_entities
                .iter()
                .filter(|e| !e.agency_id.is_empty() && e.agency_id != "1")
                .map(|e| e.agency_id.clone())
                .collect();
        }

        if agency_ids.is_empty() {
            if let Some(he_desc) = description.get("he") {
                if let Some(i) = he_desc.find(CITY_LIST_PREFIX) {
                    use_case = Some(UseCase::Cities);
                    let rest = &he_desc[i + CITY_LIST_PREFIX.len()..];
                    let first_line = rest.split('\n').next().unwrap_or("");
                    let cities: Vec<String> = first_line.split(',').map(|s| s.to_string()).collect();
                    original_selector = Some(Selector::Cities { cities: cities.clone() });
                    city_names = Some(cities);
                }
            }
        }
    }

    let is_national =
        use_case.is_none() && agency_ids.is_empty() && city_names.is_none() && old_aramaic.is_none();

    if is_national {
        use_case = Some(UseCase::National);
        original_selector = Some(Selector::National {});
    }

    if use_case.is_none() && agency_ids.is_empty() {
        if let Some(oar) = &old_aramaic {
            if oar.starts_with("region=") {
                let polygon = selector::parse_region(oar)?;
                use_case = Some(UseCase::Region);
                original_selector = Some(Selector::Region {
                    old_aramaic: oar.clone(),
                });

                removed_stop_ids = store.stops_by_polygon(&polygon).await?;
                relevant_route_ids = store
                    .routes_at_stops_in_dateranges(&removed_stop_ids, &raw.active_periods)
                    .await?;
                relevant_agencies = store.unique_agencies_for_routes(&relevant_route_ids).await?;
            }
        }
    }

    if use_case.is_none() && !agency_ids.is_empty() {
        use_case = Some(UseCase::Agency);
        relevant_agencies = agency_ids;
        original_selector = None;
    }

    let use_case = use_case.unwrap_or(UseCase::National);

    Ok(NormalizedAlert {
        id: raw.id.clone(),
        first_start_time: unix_to_naive(first_start_unix),
        last_end_time: unix_to_naive(last_end_unix),
        raw_data: raw.raw_data.clone(),
        use_case,
        original_selector,
        cause: raw.cause.clone(),
        effect: raw.effect.clone(),
        url,
        header,
        description,
        active_periods: ActivePeriods {
            raw: raw.active_periods.clone(),
            consolidated,
        },
        schedule_changes,
        is_national,
        deletion_tstz: None,
        relevant_agencies: sorted_unique(relevant_agencies),
        relevant_route_ids: sorted_unique(relevant_route_ids),
        added_stop_ids: sorted_unique(added_stop_ids),
        removed_stop_ids: sorted_unique(removed_stop_ids),
    })
}

fn schedule_relationship_to_i32(r: ScheduleRelationship) -> i32 {
    match r {
        ScheduleRelationship::Scheduled => 0,
        ScheduleRelationship::Added => 4,
        ScheduleRelationship::Canceled => 1,
        ScheduleRelationship::Unscheduled => 5,
        ScheduleRelationship::Replacement => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{InformedEntity, RawActivePeriod, TripDescriptor};
    use crate::store::{Agency, RouteMetadata, Stop, StopCoord};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeStore {
        routes_at_stops: Vec<String>,
        agencies_for_routes: Vec<String>,
        stops_by_polygon_result: Vec<String>,
        departures: BTreeMap<String, String>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TimetableStore for FakeStore {
        async fn agencies(&self, _ids: &[String]) -> Result<BTreeMap<String, Agency>> {
            Ok(BTreeMap::new())
        }
        async fn stops_metadata(&self, _stop_ids: &[String]) -> Result<BTreeMap<String, Stop>> {
            Ok(BTreeMap::new())
        }
        async fn routes_short_metadata(
            &self,
            _route_ids: &[String],
        ) -> Result<BTreeMap<String, (String, String)>> {
            Ok(BTreeMap::new())
        }
        async fn all_stop_coords_by_route_ids(&self, _route_ids: &[String]) -> Result<Vec<(f64, f64)>> {
            Ok(Vec::new())
        }
        async fn representative_trip_id(
            &self,
            _route_id: &str,
            _preferred_date: chrono::NaiveDate,
        ) -> Result<Option<String>> {
            Ok(None)
        }
        async fn stop_sequence(&self, _trip_id: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn route_metadata(&self, _route_id: &str) -> Result<Option<RouteMetadata>> {
            Ok(None)
        }
        async fn trip_headsign(&self, _trip_id: &str) -> Result<Option<String>> {
            Ok(None)
        }
        async fn stop_desc(&self, _stop_ids: &[String]) -> Result<BTreeMap<String, String>> {
            Ok(BTreeMap::new())
        }
        async fn shape_points(&self, _trip_id: &str) -> Result<Vec<(f64, f64)>> {
            Ok(Vec::new())
        }
        async fn stops_for_map(&self, _stop_ids: &[String]) -> Result<BTreeMap<String, StopCoord>> {
            Ok(BTreeMap::new())
        }
        async fn unique_agencies_for_routes(&self, _route_ids: &[String]) -> Result<Vec<String>> {
            self.calls.lock().unwrap().push("unique_agencies_for_routes".into());
            Ok(self.agencies_for_routes.clone())
        }
        async fn routes_at_stops_in_dateranges(
            &self,
            _stop_ids: &[String],
            _periods: &[RawActivePeriod],
        ) -> Result<Vec<String>> {
            Ok(self.routes_at_stops.clone())
        }
        async fn departures_for_fake_trip_ids(
            &self,
            _fake_trip_ids: &[String],
        ) -> Result<BTreeMap<String, String>> {
            Ok(self.departures.clone())
        }
        async fn stops_by_polygon(&self, _polygon: &[(String, String)]) -> Result<Vec<String>> {
            Ok(self.stops_by_polygon_result.clone())
        }
    }

    fn base_raw(id: &str) -> RawAlert {
        RawAlert {
            id: id.to_string(),
            cause: "TECHNICAL_PROBLEM".to_string(),
            effect: "DETOUR".to_string(),
            active_periods: vec![RawActivePeriod { start: 0, end: 0 }],
            url: BTreeMap::new(),
            header: BTreeMap::new(),
            description: BTreeMap::new(),
            informed_entities: Vec::new(),
            raw_data: vec![],
        }
    }

    #[tokio::test]
    async fn scenario_2_stops_cancelled() {
        let mut raw = base_raw("a1");
        raw.informed_entities = vec![
            InformedEntity {
                stop_id: "S1".into(),
                ..Default::default()
            },
            InformedEntity {
                stop_id: "S2".into(),
                ..Default::default()
            },
        ];
        let store = FakeStore {
            routes_at_stops: vec!["R1".into()],
            agencies_for_routes: vec!["AG1".into()],
            ..Default::default()
        };

        let normalized = classify(&raw, &store).await.unwrap();
        assert_eq!(normalized.use_case, UseCase::StopsCancelled);
        assert_eq!(normalized.removed_stop_ids, vec!["S1".to_string(), "S2".to_string()]);
        assert_eq!(normalized.relevant_route_ids, vec!["R1".to_string()]);
    }

    #[tokio::test]
    async fn scenario_3_route_changes_simple() {
        let mut raw = base_raw("a2");
        raw.informed_entities = vec![
            InformedEntity {
                route_id: "R".into(),
                stop_id: "S1".into(),
                ..Default::default()
            },
            InformedEntity {
                route_id: "R".into(),
                stop_id: "S2".into(),
                ..Default::default()
            },
        ];
        let store = FakeStore::default();

        let normalized = classify(&raw, &store).await.unwrap();
        assert_eq!(normalized.use_case, UseCase::RouteChangesSimple);
        match normalized.schedule_changes.unwrap() {
            ScheduleChanges::RouteOps(ops) => {
                let r_ops = ops.get("R").unwrap();
                assert_eq!(
                    r_ops,
                    &vec![RouteChangeOp::removed("S1"), RouteChangeOp::removed("S2")]
                );
            }
            other => panic!("expected RouteOps, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn scenario_4_route_changes_flex_addition_before_removals() {
        let mut raw = base_raw("a3");
        raw.informed_entities = vec![
            InformedEntity {
                route_id: "R".into(),
                stop_id: "S1".into(),
                ..Default::default()
            },
            InformedEntity {
                route_id: "R".into(),
                stop_id: "S2".into(),
                ..Default::default()
            },
        ];
        raw.description
            .insert("oar".into(), "route_id=R,add_stop_id=S3,before_stop_id=S1".into());
        let store = FakeStore::default();

        let normalized = classify(&raw, &store).await.unwrap();
        assert_eq!(normalized.use_case, UseCase::RouteChangesFlex);
        match normalized.schedule_changes.unwrap() {
            ScheduleChanges::RouteOps(ops) => {
                let r_ops = ops.get("R").unwrap();
                assert_eq!(r_ops[0], RouteChangeOp::added("S3", "S1", true));
                assert_eq!(r_ops.len(), 3);
            }
            other => panic!("expected RouteOps, got {other:?}"),
        }
        assert!(!normalized.description.contains_key("oar"));
    }

    #[tokio::test]
    async fn national_when_nothing_narrows_scope() {
        let raw = base_raw("a4");
        let store = FakeStore::default();
        let normalized = classify(&raw, &store).await.unwrap();
        assert_eq!(normalized.use_case, UseCase::National);
        assert_eq!(normalized.original_selector, Some(Selector::National {}));
    }

    #[tokio::test]
    async fn agency_selector_is_none() {
        let mut raw = base_raw("a5");
        raw.informed_entities = vec![InformedEntity {
            agency_id: "5".into(),
            ..Default::default()
        }];
        let store = FakeStore::default();
        let normalized = classify(&raw, &store).await.unwrap();
        assert_eq!(normalized.use_case, UseCase::Agency);
        assert_eq!(normalized.original_selector, None);
        assert_eq!(normalized.relevant_agencies, vec!["5".to_string()]);
    }

    #[tokio::test]
    async fn agency_id_of_one_is_ignored() {
        let mut raw = base_raw("a6");
        raw.informed_entities = vec![InformedEntity {
            agency_id: "1".into(),
            ..Default::default()
        }];
        let store = FakeStore::default();
        let normalized = classify(&raw, &store).await.unwrap();
        assert_eq!(normalized.use_case, UseCase::National);
    }

    #[tokio::test]
    async fn cities_use_case_extracts_list() {
        let mut raw = base_raw("a7");
        raw.description.insert(
            "he".into(),
            "מידע נוסף. ההודעה רלוונטית לישובים: תל אביב,חיפה\nעוד שורה".into(),
        );
        let store = FakeStore::default();
        let normalized = classify(&raw, &store).await.unwrap();
        assert_eq!(normalized.use_case, UseCase::Cities);
        match normalized.original_selector.unwrap() {
            Selector::Cities { cities } => assert_eq!(cities, vec!["תל אביב".to_string(), "חיפה".to_string()]),
            other => panic!("unexpected selector {other:?}"),
        }
    }
}
