//! Spatial indexing of ingested points.

mod dedup;
mod quadtree;

pub use dedup::SpatialDeduplicator;
pub use quadtree::{QuadTree, QuadTreeConfig};
