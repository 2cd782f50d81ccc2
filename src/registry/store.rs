//! On-disk format of a persisted exclusion set.

use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::info;

use crate::error::PersistError;
use crate::models::{AvoidRoadEntry, GeoPoint, RoadSegmentId};

/// `{ "avoid_roads": [ ... ] }`
#[derive(Debug, Serialize, Deserialize)]
struct AvoidRoadsFile {
    avoid_roads: Vec<AvoidRoadRecord>,
}

/// One persisted exclusion; `road_id` is the segment's base id
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AvoidRoadRecord {
    pub road_id: u64,
    pub lat: f64,
    pub lon: f64,
}

impl From<&AvoidRoadEntry> for AvoidRoadRecord {
    fn from(entry: &AvoidRoadEntry) -> Self {
        Self {
            road_id: entry.id.base_id(),
            lat: entry.location.lat,
            lon: entry.location.lon,
        }
    }
}

impl From<AvoidRoadRecord> for AvoidRoadEntry {
    fn from(record: AvoidRoadRecord) -> Self {
        AvoidRoadEntry::new(
            RoadSegmentId::from_base_id(record.road_id),
            GeoPoint::new(record.lat, record.lon),
        )
    }
}

/// Write records next to `path` and rename over it, so readers never see a partial file.
pub fn write_atomic<'a, I>(path: &Path, entries: I) -> Result<(), PersistError>
where
    I: IntoIterator<Item = &'a AvoidRoadEntry>,
{
    let io_err = |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(io_err)?;

    let file = AvoidRoadsFile {
        avoid_roads: entries.into_iter().map(AvoidRoadRecord::from).collect(),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer(&mut writer, &file).map_err(PersistError::Encode)?;
        writer.flush().map_err(io_err)?;
    }
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;

    info!(
        "Saved {} avoid roads to {}",
        file.avoid_roads.len(),
        path.display()
    );
    Ok(())
}

/// Read persisted records. A missing file reads as empty.
pub fn read(path: &Path) -> Result<Vec<AvoidRoadRecord>, PersistError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(PersistError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let file: AvoidRoadsFile =
        serde_json::from_slice(&bytes).map_err(|source| PersistError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(file.avoid_roads)
}
