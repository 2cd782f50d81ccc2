//! Acquisition of point payloads from local files or HTTP.

use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use flate2::read::GzDecoder;
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use crate::error::{ParseError, TransportError};

const USER_AGENT: &str = "avoid-roads/0.1 (point ingest)";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Where a run's points come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    File(PathBuf),
    Url(Url),
}

impl SourceDescriptor {
    /// `http(s)://` strings become URLs, anything else a file path.
    ///
    /// URLs must point at a `.json` (or `.json.gz`) document.
    pub fn parse(input: &str) -> Result<Self, TransportError> {
        let trimmed = input.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            let url = Url::parse(trimmed).map_err(|e| TransportError::InvalidUrl {
                url: trimmed.to_string(),
                reason: e.to_string(),
            })?;
            let path = url.path();
            if !(path.ends_with(".json") || path.ends_with(".json.gz")) {
                return Err(TransportError::InvalidUrl {
                    url: trimmed.to_string(),
                    reason: "expected a .json document".to_string(),
                });
            }
            Ok(SourceDescriptor::Url(url))
        } else {
            Ok(SourceDescriptor::File(PathBuf::from(trimmed)))
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SourceDescriptor::File(_) => "file",
            SourceDescriptor::Url(_) => "url",
        }
    }
}

impl std::fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceDescriptor::File(path) => write!(f, "{}", path.display()),
            SourceDescriptor::Url(url) => write!(f, "{}", url),
        }
    }
}

/// Reads whole payloads from files or HTTP
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(request_timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Read the full byte stream behind a descriptor
    pub async fn fetch(&self, source: &SourceDescriptor) -> Result<Vec<u8>, TransportError> {
        match source {
            SourceDescriptor::File(path) => {
                debug!("Reading points from file {}", path.display());
                tokio::fs::read(path)
                    .await
                    .map_err(|source| TransportError::Io {
                        path: path.clone(),
                        source,
                    })
            }
            SourceDescriptor::Url(url) => {
                info!("Downloading points from {}", url);
                let http_err = |source| TransportError::Http {
                    url: url.to_string(),
                    source,
                };

                let response = self
                    .client
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(http_err)?;

                if !response.status().is_success() {
                    return Err(TransportError::Status {
                        url: url.to_string(),
                        status: response.status().as_u16(),
                    });
                }

                let body = response.bytes().await.map_err(http_err)?;
                Ok(body.to_vec())
            }
        }
    }
}

/// Inflate gzip payloads, pass everything else through.
pub fn decode_payload(bytes: Vec<u8>) -> Result<Vec<u8>, ParseError> {
    if !bytes.starts_with(&GZIP_MAGIC) {
        return Ok(bytes);
    }

    let mut decoded = Vec::new();
    GzDecoder::new(bytes.as_slice())
        .read_to_end(&mut decoded)
        .map_err(ParseError::Decompress)?;
    debug!("Inflated {} -> {} bytes", bytes.len(), decoded.len());
    Ok(decoded)
}
