//! In-memory nearest-segment matcher backed by an R-tree.

use std::path::Path;

use async_trait::async_trait;
use geo::{Coord, LineString};
use hashbrown::{HashMap, HashSet};
use rstar::primitives::{GeomWithData, Line};
use rstar::{PointDistance, RTree};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use super::SegmentResolver;
use crate::error::ResolutionError;
use crate::models::{AvoidRoadEntry, GeoPoint, Profile, RoadSegmentId};

/// Web Mercator half-extent in meters (EPSG:3857)
const EARTH_MERCATOR_MAX: f64 = 20_037_508.34;

/// Maximum latitude that can be represented in Web Mercator
const MAX_LATITUDE: f64 = 85.051_128_78;

/// Default snapping radius for points that are not exactly on a road
pub const DEFAULT_MAX_SNAP_DISTANCE_M: f64 = 50.0;

type IndexedLine = GeomWithData<Line<[f64; 2]>, RoadSegmentId>;

#[derive(Debug, Error)]
pub enum RoadIndexError {
    #[error("failed to read road network {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed road network JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("road feature {index}: {reason}")]
    InvalidFeature { index: usize, reason: String },
}

#[derive(Debug, Deserialize)]
struct RoadCollection {
    features: Vec<RoadFeature>,
}

#[derive(Debug, Deserialize)]
struct RoadFeature {
    geometry: RoadGeometry,
    #[serde(default)]
    properties: RoadProperties,
}

#[derive(Debug, Deserialize)]
struct RoadGeometry {
    #[serde(rename = "type")]
    geo_type: String,
    coordinates: Value,
}

#[derive(Debug, Default, Deserialize)]
struct RoadProperties {
    id: Option<u64>,
    #[serde(default)]
    profiles: Vec<Profile>,
}

/// Nearest-segment matcher over road polylines, one R-tree per profile.
///
/// Roads without a profile list are routable by every profile.
pub struct RoadIndex {
    networks: HashMap<Profile, RTree<IndexedLine>>,
    shared: RTree<IndexedLine>,
    max_snap_distance_m: f64,
}

/// Collects roads before bulk-loading the R-trees
pub struct RoadIndexBuilder {
    by_profile: HashMap<Profile, Vec<IndexedLine>>,
    shared: Vec<IndexedLine>,
    max_snap_distance_m: f64,
}

impl RoadIndexBuilder {
    pub fn new(max_snap_distance_m: f64) -> Self {
        Self {
            by_profile: HashMap::new(),
            shared: Vec::new(),
            max_snap_distance_m,
        }
    }

    /// Add a road polyline. An empty `profiles` slice makes it available to all profiles.
    pub fn add_road(
        &mut self,
        id: RoadSegmentId,
        geometry: &LineString<f64>,
        profiles: &[Profile],
    ) -> &mut Self {
        let lines: Vec<IndexedLine> = geometry
            .lines()
            .map(|l| {
                GeomWithData::new(
                    Line::new(to_mercator(l.start.y, l.start.x), to_mercator(l.end.y, l.end.x)),
                    id,
                )
            })
            .collect();

        if profiles.is_empty() {
            self.shared.extend(lines);
        } else {
            for profile in profiles {
                self.by_profile
                    .entry(profile.clone())
                    .or_default()
                    .extend(lines.iter().cloned());
            }
        }
        self
    }

    pub fn build(self) -> RoadIndex {
        let networks = self
            .by_profile
            .into_iter()
            .map(|(profile, mut lines)| {
                lines.extend(self.shared.iter().cloned());
                (profile, RTree::bulk_load(lines))
            })
            .collect();

        RoadIndex {
            networks,
            shared: RTree::bulk_load(self.shared),
            max_snap_distance_m: self.max_snap_distance_m,
        }
    }
}

impl RoadIndex {
    pub fn builder(max_snap_distance_m: f64) -> RoadIndexBuilder {
        RoadIndexBuilder::new(max_snap_distance_m)
    }

    /// Load roads from a GeoJSON file of `LineString`/`MultiLineString` features.
    ///
    /// Each feature needs a numeric `id` property (the raw composite segment id) and may
    /// carry a `profiles` array.
    pub fn load_from_file<P: AsRef<Path>>(
        path: P,
        max_snap_distance_m: f64,
    ) -> Result<Self, RoadIndexError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| RoadIndexError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_geojson(&bytes, max_snap_distance_m)
    }

    pub fn from_geojson(bytes: &[u8], max_snap_distance_m: f64) -> Result<Self, RoadIndexError> {
        let collection: RoadCollection = serde_json::from_slice(bytes)?;
        let mut builder = Self::builder(max_snap_distance_m);

        for (index, feature) in collection.features.into_iter().enumerate() {
            let invalid = |reason: &str| RoadIndexError::InvalidFeature {
                index,
                reason: reason.to_string(),
            };

            let id = feature
                .properties
                .id
                .map(RoadSegmentId)
                .ok_or_else(|| invalid("missing numeric `id` property"))?;

            let parts: Vec<Vec<[f64; 2]>> = match feature.geometry.geo_type.as_str() {
                "LineString" => vec![serde_json::from_value(feature.geometry.coordinates)?],
                "MultiLineString" => serde_json::from_value(feature.geometry.coordinates)?,
                other => {
                    return Err(invalid(&format!("unsupported geometry type {}", other)));
                }
            };

            for part in parts {
                let line: LineString<f64> = part
                    .into_iter()
                    .map(|[lon, lat]| Coord { x: lon, y: lat })
                    .collect();
                builder.add_road(id, &line, &feature.properties.profiles);
            }
        }

        let index = builder.build();
        info!(
            "Road index loaded: {} shared segments, {} profile networks",
            index.shared.size(),
            index.networks.len()
        );
        Ok(index)
    }

    fn network(&self, profile: &Profile) -> &RTree<IndexedLine> {
        self.networks.get(profile).unwrap_or(&self.shared)
    }

    /// Nearest segment within the snapping radius of `point`
    pub fn nearest(&self, point: &GeoPoint, profile: &Profile) -> Option<RoadSegmentId> {
        let query = to_mercator(point.lat, point.lon);
        // Mercator stretches distances by 1 / cos(lat)
        let scale = point.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians().cos();
        let max_distance = self.max_snap_distance_m / scale;

        self.network(profile)
            .nearest_neighbor(&query)
            .filter(|line| line.distance_2(&query) <= max_distance * max_distance)
            .map(|line| line.data)
    }
}

#[async_trait]
impl SegmentResolver for RoadIndex {
    async fn resolve(
        &self,
        points: &[GeoPoint],
        profile: &Profile,
    ) -> Result<Vec<AvoidRoadEntry>, ResolutionError> {
        if self.network(profile).size() == 0 {
            return Err(ResolutionError::NoRoadNetwork(profile.clone()));
        }

        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        let mut matched = 0;
        for point in points {
            if let Some(id) = self.nearest(point, profile) {
                matched += 1;
                if seen.insert(id) {
                    entries.push(AvoidRoadEntry::new(id, *point));
                }
            }
        }

        debug!(
            "Matched {} of {} points to {} segments for {}",
            matched,
            points.len(),
            entries.len(),
            profile
        );
        Ok(entries)
    }
}

fn to_mercator(lat: f64, lon: f64) -> [f64; 2] {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let x = lon * EARTH_MERCATOR_MAX / 180.0;
    let lat_rad = lat.to_radians();
    let y = (lat_rad.tan() + (1.0 / lat_rad.cos())).ln() * EARTH_MERCATOR_MAX / std::f64::consts::PI;
    [x, y]
}
