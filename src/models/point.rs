//! Geographic point and bounding box types.

use geo::{Distance, Haversine};
use serde::{Deserialize, Serialize};

/// Meters per degree of latitude (and of longitude at the equator)
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Geographic point (lat/lon)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Haversine distance to another point in meters.
    pub fn distance_meters(&self, other: &GeoPoint) -> f64 {
        Haversine.distance(geo::Point::from(*self), geo::Point::from(*other))
    }

    /// Box of roughly `radius_m` meters around this point.
    ///
    /// Longitude span widens with latitude; near the poles it saturates at the full range.
    pub fn surrounding_box(&self, radius_m: f64) -> BoundingBox {
        let dlat = radius_m / METERS_PER_DEGREE;
        let cos_lat = self.lat.to_radians().cos().abs();
        let dlon = if cos_lat < 1e-9 {
            180.0
        } else {
            (radius_m / (METERS_PER_DEGREE * cos_lat)).min(180.0)
        };
        BoundingBox {
            min_lat: self.lat - dlat,
            max_lat: self.lat + dlat,
            min_lon: self.lon - dlon,
            max_lon: self.lon + dlon,
        }
    }
}

impl From<GeoPoint> for geo::Point<f64> {
    fn from(p: GeoPoint) -> Self {
        geo::Point::new(p.lon, p.lat)
    }
}

/// Axis-aligned lat/lon extent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    /// Smallest box enclosing every point, `None` for an empty slice.
    pub fn enclosing(points: &[GeoPoint]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut bbox = Self::new(first.lat, first.lat, first.lon, first.lon);
        for p in rest {
            bbox.min_lat = bbox.min_lat.min(p.lat);
            bbox.max_lat = bbox.max_lat.max(p.lat);
            bbox.min_lon = bbox.min_lon.min(p.lon);
            bbox.max_lon = bbox.max_lon.max(p.lon);
        }
        Some(bbox)
    }

    /// Inclusive on all edges.
    pub fn contains(&self, p: &GeoPoint) -> bool {
        p.lat >= self.min_lat && p.lat <= self.max_lat && p.lon >= self.min_lon && p.lon <= self.max_lon
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
            && self.min_lon <= other.max_lon
            && self.max_lon >= other.min_lon
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }

    /// Split at the midpoint into (NW, NE, SW, SE)
    pub fn quadrants(&self) -> [BoundingBox; 4] {
        let mid = self.center();
        [
            BoundingBox::new(mid.lat, self.max_lat, self.min_lon, mid.lon),
            BoundingBox::new(mid.lat, self.max_lat, mid.lon, self.max_lon),
            BoundingBox::new(self.min_lat, mid.lat, self.min_lon, mid.lon),
            BoundingBox::new(self.min_lat, mid.lat, mid.lon, self.max_lon),
        ]
    }
}
