//! Point ingestion: payload acquisition and GeoJSON parsing.

mod fetch;
mod geojson;

pub use fetch::{decode_payload, Fetcher, SourceDescriptor};
pub use geojson::{parse, PointLimit};
