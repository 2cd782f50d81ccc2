//! Avoid-roads - turn a GeoJSON point layer into per-profile road exclusions
//!
//! Points are fetched from a file or URL, indexed in a quadtree, matched to road segments,
//! and published as an impassable-roads set for routing.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod source;
pub mod spatial;

pub use config::Config;
pub use error::{ParseError, PersistError, ResolutionError, RunError, SubmitError, TransportError};
pub use models::{AvoidRoadEntry, BoundingBox, GeoPoint, Profile, RoadSegmentId};
pub use pipeline::{Orchestrator, RunHandle, RunReport, RunRequest, RunState};
pub use registry::{AvoidRoadsRegistry, RoutingConfig};
pub use resolver::{RoadIndex, SegmentResolver};
