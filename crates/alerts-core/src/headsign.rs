//! Derives a human-readable destination label ("to_text") for a route change
//! or departure change, and disambiguates duplicate labels within a line by
//! direction/alternative suffixes (§4.7).

use std::collections::BTreeMap;

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{CoreError, Result};
use crate::model::RouteChange;
use crate::store::TimetableStore;

static STOP_DESC_CITY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("עיר: (.*) רציף:").unwrap());

static ROUTE_DESC_DIR_ALT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^-]+-([^-]+)-([^-]+)$").unwrap());

/// Pulls the city name out of the MoT's "עיר: X רציף: Y" stop description
/// convention.
pub fn extract_city_from_stop_desc(stop_desc: &str) -> Result<String> {
    STOP_DESC_CITY_PATTERN
        .captures(stop_desc)
        .map(|c| c[1].to_string())
        .ok_or_else(|| CoreError::InputMalformed(format!("unrecognized stop_desc: {stop_desc}")))
}

/// `route_desc` fields look like `<agency>-<direction>-<alternative>`; pulls
/// out the (direction, alternative) pair.
fn direction_and_alternative(route_desc: &str) -> Result<(String, String)> {
    ROUTE_DESC_DIR_ALT_PATTERN
        .captures(route_desc)
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .ok_or_else(|| CoreError::InputMalformed(format!("unrecognized route_desc: {route_desc}")))
}

/// Trip headsign if the static timetable has one; otherwise falls back to
/// the destination city (or, if the endpoints share a city, the terminal
/// stop's name).
pub async fn headsign_for_trip(
    store: &dyn TimetableStore,
    representative_trip_id: &str,
    raw_stop_seq: &[String],
) -> Result<String> {
    let headsign = store.trip_headsign(representative_trip_id).await?;

    if let Some(h) = headsign.filter(|h| !h.is_empty()) {
        return Ok(h.replace('_', " - "));
    }

    let first_stop_id = raw_stop_seq
        .first()
        .ok_or_else(|| CoreError::InputMalformed("empty stop sequence".into()))?;
    let last_stop_id = raw_stop_seq
        .last()
        .ok_or_else(|| CoreError::InputMalformed("empty stop sequence".into()))?;

    let descs = store
        .stop_desc(&[first_stop_id.clone(), last_stop_id.clone()])
        .await?;

    let first_city = extract_city_from_stop_desc(
        descs
            .get(first_stop_id)
            .ok_or_else(|| CoreError::ReferentialMiss(format!("no stop_desc for {first_stop_id}")))?,
    )?;
    let last_city = extract_city_from_stop_desc(
        descs
            .get(last_stop_id)
            .ok_or_else(|| CoreError::ReferentialMiss(format!("no stop_desc for {last_stop_id}")))?,
    )?;

    if first_city != last_city {
        return Ok(last_city);
    }

    let stops = store.stops_metadata(&[last_stop_id.clone()]).await?;
    Ok(stops
        .get(last_stop_id)
        .ok_or_else(|| CoreError::ReferentialMiss(format!("no stop metadata for {last_stop_id}")))?
        .stop_name
        .clone())
}

/// Within a single line's route changes, gives duplicate `to_text` labels a
/// `(dir_name, alt_name)` suffix so a rider can tell them apart; unique
/// labels get `route_desc` stripped with no suffix added.
pub fn label_headsigns_for_direction_and_alternative(line_changes: &mut [RouteChange]) -> Result<()> {
    let mut dir_alt_by_headsign: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();

    for chg in line_changes.iter() {
        let route_desc = chg
            .route_desc
            .as_deref()
            .ok_or_else(|| CoreError::InputMalformed("route change missing route_desc".into()))?;
        let pair = direction_and_alternative(route_desc)?;
        dir_alt_by_headsign.entry(chg.to_text.clone()).or_default().push(pair);
    }

    for chg in line_changes.iter_mut() {
        let other_dups = dir_alt_by_headsign.get(&chg.to_text).unwrap();

        if other_dups.len() == 1 {
            chg.route_desc = None;
            continue;
        }

        let route_desc = chg.route_desc.take().unwrap();
        let (dir_id, alt_id) = direction_and_alternative(&route_desc)?;

        if other_dups.iter().any(|(d, _)| *d != dir_id) {
            let mut dirs: Vec<&String> = other_dups.iter().map(|(d, _)| d).collect();
            dirs.sort();
            dirs.dedup();
            let idx = dirs.iter().position(|d| **d == dir_id).unwrap();
            chg.dir_name = Some((idx + 1).to_string());
        }

        if alt_id != "#" && other_dups.iter().any(|(_, a)| *a != alt_id) {
            let mut alts: Vec<&String> = other_dups.iter().map(|(_, a)| a).filter(|a| **a != "#").collect();
            alts.sort();
            alts.dedup();

            if alts.len() == 1 {
                chg.alt_name = Some("#".to_string());
            } else {
                let idx = alts.iter().position(|a| **a == alt_id).unwrap();
                chg.alt_name = Some((idx + 1).to_string());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(to_text: &str, route_desc: &str) -> RouteChange {
        RouteChange {
            route_id: "R".into(),
            agency_id: "A".into(),
            line_number: "1".into(),
            route_desc: Some(route_desc.to_string()),
            to_text: to_text.to_string(),
            updated_stop_sequence: vec![],
            deleted_stop_ids: vec![],
            shape: vec![],
            dir_name: None,
            alt_name: None,
        }
    }

    #[test]
    fn unique_headsign_drops_route_desc_without_suffix() {
        let mut changes = vec![change("Towards A", "X-1-#")];
        label_headsigns_for_direction_and_alternative(&mut changes).unwrap();
        assert_eq!(changes[0].route_desc, None);
        assert_eq!(changes[0].dir_name, None);
        assert_eq!(changes[0].alt_name, None);
    }

    #[test]
    fn duplicate_headsign_different_direction_gets_dir_name() {
        let mut changes = vec![change("Towards A", "X-1-#"), change("Towards A", "X-2-#")];
        label_headsigns_for_direction_and_alternative(&mut changes).unwrap();
        assert_eq!(changes[0].dir_name, Some("1".to_string()));
        assert_eq!(changes[1].dir_name, Some("2".to_string()));
        assert_eq!(changes[0].alt_name, None);
    }

    #[test]
    fn duplicate_headsign_single_alternative_gets_hash_marker() {
        let mut changes = vec![change("Towards A", "X-1-#"), change("Towards A", "X-1-2")];
        label_headsigns_for_direction_and_alternative(&mut changes).unwrap();
        assert_eq!(changes[0].alt_name, Some("#".to_string()));
        assert_eq!(changes[1].alt_name, Some("#".to_string()));
    }

    #[test]
    fn city_extraction_pulls_name_between_markers() {
        let city = extract_city_from_stop_desc("עיר: תל אביב רציף: 4").unwrap();
        assert_eq!(city, "תל אביב");
    }
}
