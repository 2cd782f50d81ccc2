//! Segment resolution: mapping points to road-network segments.
//!
//! The road graph and its nearest-segment matcher live outside this crate; the pipeline
//! only talks to them through [`SegmentResolver`]. [`RoadIndex`] is an in-memory matcher
//! over road geometries loaded from GeoJSON.

mod road_index;

use async_trait::async_trait;

use crate::error::ResolutionError;
use crate::models::{AvoidRoadEntry, GeoPoint, Profile};

pub use road_index::{RoadIndex, RoadIndexBuilder, RoadIndexError, DEFAULT_MAX_SNAP_DISTANCE_M};

/// Maps points to their nearest road segments for a routing profile.
///
/// Implementations return at most one entry per segment. An empty result means no
/// roads were found near any point, which is a valid outcome; a missing road network
/// must be reported as [`ResolutionError::NoRoadNetwork`].
#[async_trait]
pub trait SegmentResolver: Send + Sync {
    async fn resolve(
        &self,
        points: &[GeoPoint],
        profile: &Profile,
    ) -> Result<Vec<AvoidRoadEntry>, ResolutionError>;
}
