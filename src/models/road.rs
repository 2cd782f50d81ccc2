//! Road segment identifiers, exclusion entries and routing profiles.

use serde::{Deserialize, Serialize};

use super::GeoPoint;

/// Number of low bits the road graph reserves for the sub-object index
pub const SUB_OBJECT_BITS: u32 = 6;

/// Raw composite identifier of a road segment in the external road graph.
///
/// The low [`SUB_OBJECT_BITS`] bits encode a sub-object index; the remaining bits are
/// the segment's base (way) id, which is what gets persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoadSegmentId(pub u64);

impl RoadSegmentId {
    /// Rebuild a raw id from a persisted base id (sub-object index 0)
    pub fn from_base_id(base: u64) -> Self {
        Self(base << SUB_OBJECT_BITS)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    pub fn base_id(&self) -> u64 {
        self.0 >> SUB_OBJECT_BITS
    }
}

impl std::fmt::Display for RoadSegmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "road/{}", self.base_id())
    }
}

/// A single excluded segment with the point that caused it to be excluded
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AvoidRoadEntry {
    pub id: RoadSegmentId,
    pub location: GeoPoint,
}

impl AvoidRoadEntry {
    pub fn new(id: RoadSegmentId, location: GeoPoint) -> Self {
        Self { id, location }
    }
}

/// Named routing configuration an exclusion set applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Profile(String);

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().trim().to_lowercase())
    }

    pub fn car() -> Self {
        Self::new("car")
    }

    pub fn bicycle() -> Self {
        Self::new("bicycle")
    }

    pub fn pedestrian() -> Self {
        Self::new("pedestrian")
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Usable as a single directory name: non-empty, not `.`/`..`, no separators.
    pub fn is_path_safe(&self) -> bool {
        !self.0.is_empty()
            && self.0 != "."
            && self.0 != ".."
            && !self.0.contains(['/', '\\', ':', '\0'])
    }
}

impl From<String> for Profile {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<Profile> for String {
    fn from(profile: Profile) -> Self {
        profile.0
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::car()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Profile {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}
