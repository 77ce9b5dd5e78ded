//! Parses the `current_location=lat_lon` query parameter the same way the
//! reference server does: split on `_`, take the first two tokens, round
//! each to 6 decimals server-side (§6).

use crate::error::ApiError;

pub fn parse_current_location(raw: &str) -> Result<(f64, f64), ApiError> {
    let mut parts = raw.split('_');
    let lat_str = parts
        .next()
        .ok_or_else(|| ApiError::BadRequest("current_location missing latitude".to_string()))?;
    let lon_str = parts
        .next()
        .ok_or_else(|| ApiError::BadRequest("current_location missing longitude".to_string()))?;

    let lat: f64 = lat_str
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("current_location: bad latitude {lat_str}")))?;
    let lon: f64 = lon_str
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("current_location: bad longitude {lon_str}")))?;

    Ok(round_to_6_decimals(lat, lon))
}

fn round_to_6_decimals(lat: f64, lon: f64) -> (f64, f64) {
    ((lat * 1_000_000.0).round() / 1_000_000.0, (lon * 1_000_000.0).round() / 1_000_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_floats_joined_by_underscore() {
        let (lat, lon) = parse_current_location("32.123456789_34.987654321").unwrap();
        assert_eq!(lat, 32.123457);
        assert_eq!(lon, 34.987654);
    }

    #[test]
    fn ignores_extra_tokens_past_the_first_two() {
        let (lat, lon) = parse_current_location("32.0_34.0_ignored").unwrap();
        assert_eq!((lat, lon), (32.0, 34.0));
    }

    #[test]
    fn rejects_missing_longitude() {
        assert!(parse_current_location("32.0").is_err());
    }

    #[test]
    fn rejects_unparseable_latitude() {
        assert!(parse_current_location("abc_34.0").is_err());
    }
}
