use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::Profile;
use crate::resolver::DEFAULT_MAX_SNAP_DISTANCE_M;
use crate::source::PointLimit;
use crate::spatial::QuadTreeConfig;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Root directory for persisted exclusion sets, one subdirectory per profile
    pub avoid_roads_dir: PathBuf,
    /// Write the registry to disk after each successful run
    pub persist_results: bool,
    pub default_profile: Profile,
    /// Cap on features consumed from each input
    pub limit: Option<usize>,
    pub quadtree: QuadTreeConfig,
    /// Collapse points closer than this many meters; unset keeps every point
    pub dedup_radius_m: Option<f64>,
    pub fetch_timeout_secs: Option<u64>,
    pub resolve_timeout_secs: Option<u64>,
    pub max_snap_distance_m: f64,
    /// Profiles whose persisted exclusions are reloaded at startup
    pub profiles: Vec<Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            avoid_roads_dir: PathBuf::from("avoid_roads"),
            persist_results: true,
            default_profile: Profile::car(),
            limit: None,
            quadtree: QuadTreeConfig::default(),
            dedup_radius_m: None,
            fetch_timeout_secs: None,
            resolve_timeout_secs: None,
            max_snap_distance_m: DEFAULT_MAX_SNAP_DISTANCE_M,
            profiles: Vec::new(),
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.quadtree.capacity == 0 {
            anyhow::bail!("quadtree.capacity must be at least 1");
        }
        if !(self.quadtree.fill_factor > 0.0 && self.quadtree.fill_factor <= 1.0) {
            anyhow::bail!(
                "quadtree.fill_factor must be in (0, 1], got {}",
                self.quadtree.fill_factor
            );
        }
        if self.max_snap_distance_m <= 0.0 {
            anyhow::bail!("max_snap_distance_m must be positive");
        }
        if self.dedup_radius_m.is_some_and(|r| r < 0.0) {
            anyhow::bail!("dedup_radius_m must not be negative");
        }
        for profile in std::iter::once(&self.default_profile).chain(&self.profiles) {
            if !profile.is_path_safe() {
                anyhow::bail!("profile name {:?} cannot be used as a directory name", profile.name());
            }
        }
        Ok(())
    }

    pub fn point_limit(&self) -> PointLimit {
        self.limit.into()
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_secs.map(Duration::from_secs)
    }

    pub fn resolve_timeout(&self) -> Option<Duration> {
        self.resolve_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.quadtree.capacity, 8);
        assert_eq!(config.quadtree.fill_factor, 0.55);
        assert_eq!(config.default_profile, Profile::car());
        assert_eq!(config.point_limit(), PointLimit::Unlimited);
        assert!(config.persist_results);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(
            r#"
            avoid_roads_dir = "/data/avoid"
            persist_results = false
            default_profile = "Bicycle"
            limit = 100
            dedup_radius_m = 15.0
            resolve_timeout_secs = 30
            profiles = ["car", "bicycle"]

            [quadtree]
            capacity = 16
            "#,
        )
        .unwrap();

        assert_eq!(config.default_profile, Profile::bicycle());
        assert_eq!(config.point_limit(), PointLimit::First(100));
        assert_eq!(config.quadtree.capacity, 16);
        assert_eq!(config.quadtree.fill_factor, 0.55);
        assert_eq!(config.resolve_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.fetch_timeout(), None);
        assert_eq!(config.avoid_roads_dir, PathBuf::from("/data/avoid"));
        assert!(!config.persist_results);
    }

    #[test]
    fn test_invalid_fill_factor() {
        let mut config = Config::default();
        config.quadtree.fill_factor = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_profile_outside_avoid_roads_dir() {
        let config: Config = toml::from_str(r#"profiles = ["car", "../../etc"]"#).unwrap();
        assert!(config.validate().is_err());

        let config: Config = toml::from_str(r#"default_profile = "/tmp/x""#).unwrap();
        assert!(config.validate().is_err());
    }
}
