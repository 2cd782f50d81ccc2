//! Error taxonomy for the resolution pipeline.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::models::Profile;

/// The byte stream could not be acquired
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid source url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("fetch did not finish within {0:?}")]
    Timeout(Duration),
}

/// The payload is not a usable feature collection
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not gzip-decodable: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("feature collection has no `features` array")]
    MissingFeatures,

    #[error("feature {index} has no coordinate pair")]
    MissingCoordinates { index: usize },

    #[error("feature {index} has a non-numeric coordinate")]
    NonNumericCoordinate { index: usize },
}

/// The segment resolver could not produce a mapping
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("no road network loaded for profile {0}")]
    NoRoadNetwork(Profile),

    #[error("segment resolution did not finish within {0:?}")]
    Timeout(Duration),

    #[error("segment resolution failed: {0}")]
    Failed(String),
}

/// The registry could not be written to or read from disk
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode avoid roads: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode avoid roads file {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("profile name {0:?} cannot be used as a directory name")]
    InvalidProfile(String),
}

/// Terminal failure of a single pipeline run
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("run was cancelled")]
    Cancelled,

    #[error("pipeline worker stopped before the run finished")]
    Aborted,
}

/// A request the orchestrator refused to start
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("a run is already in progress")]
    Busy,

    #[error("pipeline worker has shut down")]
    WorkerGone,
}
