//! Builds the before/after stop sequence for every route an alert touches,
//! grouped by agency and line number, plus the map bounding box the UI
//! zooms to (§4.4).

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use tracing::warn;

use crate::error::Result;
use crate::headsign;
use crate::model::{NormalizedAlert, RouteChange, ScheduleChanges, StopSequenceEntry, UseCase};
use crate::store::{StopCoord, TimetableStore};

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct MapBoundingBox {
    pub min_lon: Option<f64>,
    pub min_lat: Option<f64>,
    pub max_lon: Option<f64>,
    pub max_lat: Option<f64>,
}

impl MapBoundingBox {
    fn expand(&mut self, coord: StopCoord) {
        self.min_lon = Some(self.min_lon.map_or(coord.stop_lon, |v| v.min(coord.stop_lon)));
        self.min_lat = Some(self.min_lat.map_or(coord.stop_lat, |v| v.min(coord.stop_lat)));
        self.max_lon = Some(self.max_lon.map_or(coord.stop_lon, |v| v.max(coord.stop_lon)));
        self.max_lat = Some(self.max_lat.map_or(coord.stop_lat, |v| v.max(coord.stop_lat)));
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RouteChangesResult {
    pub route_changes: BTreeMap<String, BTreeMap<String, Vec<RouteChange>>>,
    pub stops_for_map: BTreeMap<String, StopCoord>,
    pub map_bounding_box: MapBoundingBox,
}

/// Removes every occurrence of `entry` from `seq` in place; returns how many
/// were removed. A plain scan-and-compact, no exceptions required.
fn remove_all_occurrences(seq: &mut Vec<StopSequenceEntry>, entry: &StopSequenceEntry) -> usize {
    let before = seq.len();
    seq.retain(|e| e != entry);
    before - seq.len()
}

pub async fn compute_route_changes(
    store: &dyn TimetableStore,
    alert: &NormalizedAlert,
    alert_id: &str,
    representative_date: NaiveDate,
) -> Result<RouteChangesResult> {
    if !alert.use_case.has_route_change_semantics() {
        return Ok(RouteChangesResult {
            route_changes: BTreeMap::new(),
            stops_for_map: BTreeMap::new(),
            map_bounding_box: MapBoundingBox::default(),
        });
    }

    let mut changes_by_agency_and_line: BTreeMap<String, BTreeMap<String, Vec<RouteChange>>> =
        BTreeMap::new();

    let mut all_stop_ids: BTreeSet<String> = alert
        .removed_stop_ids
        .iter()
        .chain(alert.added_stop_ids.iter())
        .cloned()
        .collect();
    let mut near_added_stop_ids: BTreeSet<String> = BTreeSet::new();

    for route_id in &alert.relevant_route_ids {
        let representative_trip_id = store
            .representative_trip_id(route_id, representative_date)
            .await?;
        let Some(representative_trip_id) = representative_trip_id else {
            warn!(route_id, "no representative trip found for route");
            continue;
        };
        let raw_stop_seq = store.stop_sequence(&representative_trip_id).await?;
        all_stop_ids.extend(raw_stop_seq.iter().cloned());

        let mut stop_seq: Vec<StopSequenceEntry> =
            raw_stop_seq.iter().map(|s| (s.clone(), false)).collect();
        let mut deleted_stop_ids = Vec::new();

        if alert.use_case == UseCase::StopsCancelled {
            for removed_stop_id in &alert.removed_stop_ids {
                let times_removed =
                    remove_all_occurrences(&mut stop_seq, &(removed_stop_id.clone(), false));
                if times_removed > 0 || alert.relevant_route_ids.len() == 1 {
                    deleted_stop_ids.push(removed_stop_id.clone());
                }
            }
        } else if let Some(ScheduleChanges::RouteOps(ops_by_route)) = &alert.schedule_changes {
            if let Some(ops) = ops_by_route.get(route_id) {
                for op in ops {
                    match op {
                        crate::model::RouteChangeOp::Removal(r) => {
                            let times_removed = remove_all_occurrences(
                                &mut stop_seq,
                                &(r.removed_stop_id.clone(), false),
                            );
                            if times_removed == 0 {
                                warn!(
                                    route_id,
                                    alert_id,
                                    trip_id = %representative_trip_id,
                                    stop_id = %r.removed_stop_id,
                                    "tried removing stop not on route"
                                );
                            }
                            if times_removed > 0 || alert.relevant_route_ids.len() == 1 {
                                deleted_stop_ids.push(r.removed_stop_id.clone());
                            }
                        }
                        crate::model::RouteChangeOp::Addition(a) => {
                            let dest_idx =
                                stop_seq.iter().position(|(stop_id, _)| *stop_id == a.relative_stop_id);
                            let Some(mut dest_idx) = dest_idx else {
                                warn!(
                                    route_id,
                                    alert_id,
                                    trip_id = %representative_trip_id,
                                    relative_stop_id = %a.relative_stop_id,
                                    "tried adding stop relative to stop not on route"
                                );
                                continue;
                            };
                            if !a.is_before {
                                dest_idx += 1;
                            }
                            stop_seq.insert(dest_idx, (a.added_stop_id.clone(), true));
                        }
                    }
                }
            }
        }

        for window in stop_seq.windows(2) {
            let (prev_id, prev_added) = &window[0];
            let (cur_id, cur_added) = &window[1];
            if *cur_added && !*prev_added {
                near_added_stop_ids.insert(prev_id.clone());
            } else if !*cur_added && *prev_added {
                near_added_stop_ids.insert(cur_id.clone());
            }
        }

        let Some(route_metadata) = store.route_metadata(route_id).await? else {
            warn!(route_id, "no route metadata found");
            continue;
        };

        let to_text = headsign::headsign_for_trip(store, &representative_trip_id, &raw_stop_seq).await?;

        let mut shape = store.shape_points(&representative_trip_id).await?;
        if shape.is_empty() {
            let stop_data = store.stops_for_map(&raw_stop_seq).await?;
            shape = raw_stop_seq
                .iter()
                .filter_map(|s| stop_data.get(s).map(|c| (c.stop_lon, c.stop_lat)))
                .collect();
        }

        let agency_id = route_metadata.agency_id.clone();
        let line_number = route_metadata.line_number.clone();

        let change = RouteChange {
            route_id: route_id.clone(),
            agency_id: agency_id.clone(),
            line_number: line_number.clone(),
            route_desc: route_metadata.route_desc,
            to_text,
            updated_stop_sequence: stop_seq,
            deleted_stop_ids,
            shape,
            dir_name: None,
            alt_name: None,
        };

        changes_by_agency_and_line
            .entry(agency_id)
            .or_default()
            .entry(line_number)
            .or_default()
            .push(change);
    }

    for lines in changes_by_agency_and_line.values_mut() {
        for line_changes in lines.values_mut() {
            headsign::label_headsigns_for_direction_and_alternative(line_changes)?;
        }
    }

    let all_stop_ids: Vec<String> = all_stop_ids.into_iter().collect();
    let stops_for_map = store.stops_for_map(&all_stop_ids).await?;

    for lines in changes_by_agency_and_line.values_mut() {
        for line_changes in lines.values_mut() {
            line_changes.sort_by(|a, b| {
                (
                    &a.to_text,
                    a.dir_name.as_deref().unwrap_or(""),
                    a.alt_name.as_deref().unwrap_or(""),
                )
                    .cmp(&(
                        &b.to_text,
                        b.dir_name.as_deref().unwrap_or(""),
                        b.alt_name.as_deref().unwrap_or(""),
                    ))
            });
        }
    }

    let mut map_bounding_box = MapBoundingBox::default();
    for stop_id in alert
        .added_stop_ids
        .iter()
        .chain(alert.removed_stop_ids.iter())
        .chain(near_added_stop_ids.iter())
    {
        if let Some(coord) = stops_for_map.get(stop_id) {
            map_bounding_box.expand(*coord);
        }
    }

    Ok(RouteChangesResult {
        route_changes: changes_by_agency_and_line,
        stops_for_map,
        map_bounding_box,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_all_occurrences_counts_and_compacts() {
        let mut seq = vec![
            ("A".to_string(), false),
            ("B".to_string(), false),
            ("A".to_string(), false),
        ];
        let removed = remove_all_occurrences(&mut seq, &("A".to_string(), false));
        assert_eq!(removed, 2);
        assert_eq!(seq, vec![("B".to_string(), false)]);
    }

    #[test]
    fn remove_all_occurrences_zero_when_absent() {
        let mut seq = vec![("B".to_string(), false)];
        let removed = remove_all_occurrences(&mut seq, &("A".to_string(), false));
        assert_eq!(removed, 0);
        assert_eq!(seq.len(), 1);
    }

    #[test]
    fn bounding_box_expands_over_all_points() {
        let mut bbox = MapBoundingBox::default();
        bbox.expand(StopCoord { stop_lon: 34.8, stop_lat: 32.0 });
        bbox.expand(StopCoord { stop_lon: 34.9, stop_lat: 31.9 });
        assert_eq!(bbox.min_lon, Some(34.8));
        assert_eq!(bbox.max_lon, Some(34.9));
        assert_eq!(bbox.min_lat, Some(31.9));
        assert_eq!(bbox.max_lat, Some(32.0));
    }
}
