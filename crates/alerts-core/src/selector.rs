//! Parses the feed's "Old-Aramaic" vendor text payload: either a region
//! polygon or a list of route stop-addition instructions. Also repairs the
//! small set of literal unicode escapes the upstream feed emits malformed.

use crate::error::{CoreError, Result};
use crate::model::RouteChangeOp;
use std::collections::BTreeMap;

pub const OAR_LANGUAGE_TAG: &str = "oar";
const REGION_PREFIX: &str = "region=";

/// `region=lat,lon:lat,lon:…` → ordered `[lat, lon]` string pairs. Kept as
/// strings (not parsed to floats) to avoid rounding drift before the string
/// is stored and re-parsed downstream (e.g. for distance calculations).
pub fn parse_region(text: &str) -> Result<Vec<(String, String)>> {
    let mut text = text.trim();
    if let Some(stripped) = text.strip_suffix(';') {
        text = stripped;
    }
    if let Some(stripped) = text.strip_prefix(REGION_PREFIX) {
        text = stripped;
    }

    text.split(':')
        .map(|pair| {
            let mut parts = pair.splitn(2, ',');
            let lat = parts.next().unwrap_or_default();
            let lon = parts
                .next()
                .ok_or_else(|| CoreError::InputMalformed(format!("bad region coordinate: {pair}")))?;
            Ok((lat.to_string(), lon.to_string()))
        })
        .collect()
}

/// `route_id=R,add_stop_id=S,before_stop_id=B;route_id=R,add_stop_id=S,after_stop_id=A;…`
/// → `route_id -> [ RouteChangeOp::Addition, … ]`, preserving the order the
/// segments appeared in.
pub fn parse_route_changes(text: &str) -> Result<BTreeMap<String, Vec<RouteChangeOp>>> {
    let mut results: BTreeMap<String, Vec<RouteChangeOp>> = BTreeMap::new();

    for segment in text.split(';') {
        if segment.is_empty() {
            continue;
        }

        let mut fields: BTreeMap<&str, &str> = BTreeMap::new();
        for kv in segment.split(',') {
            let mut parts = kv.splitn(2, '=');
            let key = parts.next().unwrap_or_default();
            let value = parts.next().ok_or_else(|| {
                CoreError::InputMalformed(format!("malformed old-aramaic segment: {kv}"))
            })?;
            fields.insert(key, value);
        }

        let route_id = *fields
            .get("route_id")
            .ok_or_else(|| CoreError::InputMalformed(format!("missing route_id in: {segment}")))?;
        let added_stop_id = *fields
            .get("add_stop_id")
            .ok_or_else(|| CoreError::InputMalformed(format!("missing add_stop_id in: {segment}")))?;

        let (relative_stop_id, is_before) = if let Some(before) = fields.get("before_stop_id") {
            (*before, true)
        } else if let Some(after) = fields.get("after_stop_id") {
            (*after, false)
        } else {
            return Err(CoreError::InputMalformed(format!(
                "missing before/after_stop_id in: {segment}"
            )));
        };

        results
            .entry(route_id.to_string())
            .or_default()
            .push(RouteChangeOp::added(added_stop_id, relative_stop_id, is_before));
    }

    Ok(results)
}

/// Literal `\uXXXX` escapes are replaced only for the two code points the
/// upstream producer reliably mangles (en dash, right single quote); every
/// other escape — valid-looking or not — is left verbatim.
pub fn repair_unicode_escapes(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 6 <= bytes.len() && bytes[i + 1] == b'u' {
            let escape = &s[i..i + 6];
            match escape {
                "\\u2013" => {
                    out.push('\u{2013}');
                    i += 6;
                    continue;
                }
                "\\u2019" => {
                    out.push('\u{2019}');
                    i += 6;
                    continue;
                }
                _ => {
                    out.push_str(escape);
                    i += 6;
                    continue;
                }
            }
        }
        let ch = s[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_6_region_parses_to_string_pairs() {
        let result = parse_region("region=32.1,34.8:32.2,34.8:32.2,34.9;").unwrap();
        assert_eq!(
            result,
            vec![
                ("32.1".to_string(), "34.8".to_string()),
                ("32.2".to_string(), "34.8".to_string()),
                ("32.2".to_string(), "34.9".to_string()),
            ]
        );
    }

    #[test]
    fn scenario_4_route_changes_addition_before_removal() {
        let result = parse_route_changes("route_id=R,add_stop_id=S3,before_stop_id=S1").unwrap();
        let ops = result.get("R").unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0], RouteChangeOp::added("S3", "S1", true));
    }

    #[test]
    fn route_changes_after_stop_id_sets_is_before_false() {
        let result = parse_route_changes("route_id=R,add_stop_id=S3,after_stop_id=S1").unwrap();
        assert_eq!(result.get("R").unwrap()[0], RouteChangeOp::added("S3", "S1", false));
    }

    #[test]
    fn route_changes_empty_segments_are_skipped() {
        let result = parse_route_changes(";;route_id=R,add_stop_id=S,before_stop_id=T;;").unwrap();
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn route_changes_missing_relative_stop_is_malformed() {
        let result = parse_route_changes("route_id=R,add_stop_id=S3");
        assert!(result.is_err());
    }

    #[test]
    fn unicode_repair_only_replaces_allowed_escapes() {
        let input = "a\\u2013b\\u2019c\\u0041d";
        let result = repair_unicode_escapes(input);
        assert_eq!(result, "a\u{2013}b\u{2019}c\\u0041d");
    }
}
