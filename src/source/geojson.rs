//! GeoJSON feature-collection point parsing.

use serde::Deserialize;
use serde_json::Value;

use crate::error::ParseError;
use crate::models::GeoPoint;

/// How many features to consume from a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointLimit {
    #[default]
    Unlimited,
    First(usize),
}

impl PointLimit {
    /// Legacy integer form: `-1` is unlimited, any other negative value consumes nothing.
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            -1 => PointLimit::Unlimited,
            n if n < 0 => PointLimit::First(0),
            n => PointLimit::First(usize::try_from(n).unwrap_or(usize::MAX)),
        }
    }

    fn cap(&self, total: usize) -> usize {
        match self {
            PointLimit::Unlimited => total,
            PointLimit::First(k) => (*k).min(total),
        }
    }
}

impl From<Option<usize>> for PointLimit {
    fn from(limit: Option<usize>) -> Self {
        limit.map_or(PointLimit::Unlimited, PointLimit::First)
    }
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    features: Option<Vec<Feature>>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    coordinates: Option<Vec<Value>>,
}

/// Parse a GeoJSON feature collection into points, in file order.
///
/// Only `features[].geometry.coordinates` (`[lon, lat, ...]`) is consumed. Features past
/// the limit are not validated.
pub fn parse(bytes: &[u8], limit: PointLimit) -> Result<Vec<GeoPoint>, ParseError> {
    let collection: FeatureCollection = serde_json::from_slice(bytes)?;
    let features = collection.features.ok_or(ParseError::MissingFeatures)?;

    let take = limit.cap(features.len());
    let mut points = Vec::with_capacity(take);

    for (index, feature) in features.iter().take(take).enumerate() {
        let coords = feature
            .geometry
            .as_ref()
            .and_then(|g| g.coordinates.as_deref())
            .filter(|c| c.len() >= 2)
            .ok_or(ParseError::MissingCoordinates { index })?;

        let lon = coords[0]
            .as_f64()
            .ok_or(ParseError::NonNumericCoordinate { index })?;
        let lat = coords[1]
            .as_f64()
            .ok_or(ParseError::NonNumericCoordinate { index })?;

        points.push(GeoPoint::new(lat, lon));
    }

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_POINTS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [30.5, 50.4]}},
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [30.6, 50.45]}}
        ]
    }"#;

    #[test]
    fn test_parse_all_in_order() {
        let points = parse(TWO_POINTS.as_bytes(), PointLimit::Unlimited).unwrap();
        assert_eq!(
            points,
            vec![GeoPoint::new(50.4, 30.5), GeoPoint::new(50.45, 30.6)]
        );
    }

    #[test]
    fn test_parse_with_limit() {
        let points = parse(TWO_POINTS.as_bytes(), PointLimit::First(1)).unwrap();
        assert_eq!(points, vec![GeoPoint::new(50.4, 30.5)]);

        let points = parse(TWO_POINTS.as_bytes(), PointLimit::First(10)).unwrap();
        assert_eq!(points.len(), 2);

        let points = parse(TWO_POINTS.as_bytes(), PointLimit::First(0)).unwrap();
        assert!(points.is_empty());
    }

    #[test]
    fn test_raw_limit() {
        assert_eq!(PointLimit::from_raw(-1), PointLimit::Unlimited);
        assert_eq!(PointLimit::from_raw(100), PointLimit::First(100));
        assert_eq!(PointLimit::from_raw(-5), PointLimit::First(0));
        let points = parse(TWO_POINTS.as_bytes(), PointLimit::from_raw(-1)).unwrap();
        assert_eq!(points.len(), 2);
    }

    #[test]
    fn test_empty_features() {
        let points = parse(br#"{"type":"FeatureCollection","features":[]}"#, PointLimit::Unlimited).unwrap();
        assert!(points.is_empty());
    }

    #[test]
    fn test_missing_features_key() {
        let err = parse(br#"{"type":"FeatureCollection"}"#, PointLimit::Unlimited).unwrap_err();
        assert!(matches!(err, ParseError::MissingFeatures));
    }

    #[test]
    fn test_malformed_json() {
        let err = parse(b"{\"features\": [", PointLimit::Unlimited).unwrap_err();
        assert!(matches!(err, ParseError::Json(_)));
    }

    #[test]
    fn test_missing_coordinates() {
        let json = r#"{"features":[
            {"geometry":{"coordinates":[1.0, 2.0]}},
            {"geometry":{"type":"Point"}}
        ]}"#;
        let err = parse(json.as_bytes(), PointLimit::Unlimited).unwrap_err();
        assert!(matches!(err, ParseError::MissingCoordinates { index: 1 }));

        // Only the first feature is consumed, so the broken one is never looked at
        let points = parse(json.as_bytes(), PointLimit::First(1)).unwrap();
        assert_eq!(points, vec![GeoPoint::new(2.0, 1.0)]);
    }

    #[test]
    fn test_non_numeric_coordinate() {
        let json = r#"{"features":[{"geometry":{"coordinates":["30.5", 50.4]}}]}"#;
        let err = parse(json.as_bytes(), PointLimit::Unlimited).unwrap_err();
        assert!(matches!(err, ParseError::NonNumericCoordinate { index: 0 }));
    }

    #[test]
    fn test_altitude_ignored_and_no_range_check() {
        let json = r#"{"features":[{"geometry":{"coordinates":[200.0, -95.0, 120.0]}}]}"#;
        let points = parse(json.as_bytes(), PointLimit::Unlimited).unwrap();
        assert_eq!(points, vec![GeoPoint::new(-95.0, 200.0)]);
    }
}
