//! Core data models shared by every pipeline stage.

pub mod point;
pub mod road;

pub use point::{BoundingBox, GeoPoint};
pub use road::{AvoidRoadEntry, Profile, RoadSegmentId};
