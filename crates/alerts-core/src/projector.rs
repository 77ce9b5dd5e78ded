//! Sort key for route/line numbers, and the straight-line distance from a
//! rider's location to an alert used to rank `all_alerts?current_location=`.
//!
//! The reference pipeline projects WGS84 coordinates into the Israeli Grid
//! (EPSG:2039) before taking a euclidean distance, via `pyproj`. That's out
//! of scope here (no coordinate-projection crate in this workspace's
//! dependency stack) — distances are computed with an equirectangular
//! approximation instead, which is accurate to a few meters at this
//! region's latitude and is injectable via `Projector` so a more precise
//! implementation can be swapped in without touching the ranking logic.

use crate::error::{CoreError, Result};
use crate::model::{NormalizedAlert, UseCase};
use crate::selector;
use crate::store::Stop;

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Projects a `(lat, lon)` pair to a flat-plane coordinate so distances
/// between nearby points can be computed with ordinary euclidean distance.
pub trait Projector: Send + Sync {
    fn project(&self, lat: f64, lon: f64) -> (f64, f64);
}

/// Equirectangular approximation centered on the input point's own latitude;
/// adequate at the scale of a single alert's stops.
pub struct EquirectangularProjector;

impl Projector for EquirectangularProjector {
    fn project(&self, lat: f64, lon: f64) -> (f64, f64) {
        let lat_rad = lat.to_radians();
        let x = lon.to_radians() * lat_rad.cos() * EARTH_RADIUS_METERS;
        let y = lat_rad * EARTH_RADIUS_METERS;
        (x, y)
    }
}

fn euclidean(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// Sort key for a line/route number string: digits-first by numeric value,
/// falling back to lexicographic order for anything non-numeric (e.g. a
/// line named only with letters sorts before every numbered line).
pub fn line_number_for_sorting(line_number: &str) -> (i64, &str) {
    for token in line_number.split_whitespace() {
        if let Ok(n) = token.parse::<i64>() {
            return (n, line_number);
        }
    }
    (-1, line_number)
}

/// Distance from `current_location` to an alert: nearest added/removed stop
/// if either set is non-empty; else nearest stop among the alert's relevant
/// routes; else, for a no-stops REGION alert, distance to the region
/// polygon's vertex hull. `None` when nothing to measure against.
pub fn distance_to_alert(
    projector: &dyn Projector,
    current_location: (f64, f64),
    alert: &NormalizedAlert,
    stops: &std::collections::BTreeMap<String, Stop>,
    all_route_stop_coords: &[(f64, f64)],
) -> Result<Option<f64>> {
    let current = projector.project(current_location.0, current_location.1);

    if alert.use_case == UseCase::Region && alert.added_stop_ids.is_empty() && alert.removed_stop_ids.is_empty() {
        let old_aramaic = match &alert.original_selector {
            Some(crate::model::Selector::Region { old_aramaic }) => old_aramaic,
            _ => {
                return Err(CoreError::InputMalformed(
                    "REGION alert missing old_aramaic selector".into(),
                ))
            }
        };
        let polygon = selector::parse_region(old_aramaic)?;
        let projected: Vec<(f64, f64)> = polygon
            .iter()
            .map(|(lat, lon)| -> Result<(f64, f64)> {
                let lat: f64 = lat
                    .parse()
                    .map_err(|_| CoreError::InputMalformed(format!("bad lat in region: {lat}")))?;
                let lon: f64 = lon
                    .parse()
                    .map_err(|_| CoreError::InputMalformed(format!("bad lon in region: {lon}")))?;
                Ok(projector.project(lat, lon))
            })
            .collect::<Result<_>>()?;
        return Ok(distance_to_polygon(current, &projected));
    }

    let mut all_stop_ids: Vec<&String> = alert
        .added_stop_ids
        .iter()
        .chain(alert.removed_stop_ids.iter())
        .collect();
    all_stop_ids.sort();
    all_stop_ids.dedup();

    if !all_stop_ids.is_empty() {
        let distances = all_stop_ids.iter().filter_map(|id| {
            stops
                .get(*id)
                .map(|s| euclidean(current, projector.project(s.stop_lat, s.stop_lon)))
        });
        return Ok(distances.fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.min(d)))));
    }

    if !alert.relevant_route_ids.is_empty() {
        let distances = all_route_stop_coords
            .iter()
            .map(|&(lat, lon)| euclidean(current, projector.project(lat, lon)));
        return Ok(distances.fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.min(d)))));
    }

    Ok(None)
}

/// Minimum distance from `point` to the boundary of the polygon formed by
/// `vertices` (in the order given), or `None` for fewer than 2 vertices.
fn distance_to_polygon(point: (f64, f64), vertices: &[(f64, f64)]) -> Option<f64> {
    if vertices.len() < 2 {
        return vertices.first().map(|v| euclidean(point, *v));
    }

    let mut min_dist = f64::INFINITY;
    for i in 0..vertices.len() {
        let a = vertices[i];
        let b = vertices[(i + 1) % vertices.len()];
        min_dist = min_dist.min(distance_to_segment(point, a, b));
    }
    Some(min_dist)
}

fn distance_to_segment(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return euclidean(p, a);
    }
    let t = (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len_sq).clamp(0.0, 1.0);
    euclidean(p, (a.0 + t * dx, a.1 + t * dy))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_line_numbers_sort_before_named_ones() {
        let mut lines = vec!["12", "5", "A"];
        lines.sort_by_key(|l| line_number_for_sorting(l));
        assert_eq!(lines, vec!["A", "5", "12"]);
    }

    #[test]
    fn line_number_with_suffix_still_parses_numeric_token() {
        let key = line_number_for_sorting("17 Express");
        assert_eq!(key.0, 17);
    }

    #[test]
    fn distance_to_segment_is_zero_on_the_segment() {
        let d = distance_to_segment((0.5, 0.0), (0.0, 0.0), (1.0, 0.0));
        assert!(d.abs() < 1e-9);
    }

    #[test]
    fn equirectangular_projection_preserves_relative_order() {
        let p = EquirectangularProjector;
        let near = p.project(32.0, 34.8);
        let far = p.project(32.0, 35.5);
        let origin = p.project(32.0, 34.8);
        assert!(euclidean(origin, far) > euclidean(origin, near));
    }
}
