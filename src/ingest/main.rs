//! Avoid-roads ingest.
//!
//! Reads a GeoJSON point layer, snaps it onto a road network, and stores the matched
//! roads as the exclusion set for a routing profile.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use avoid_roads::config::Config;
use avoid_roads::models::Profile;
use avoid_roads::pipeline::{Orchestrator, RunRequest};
use avoid_roads::registry::RoutingConfig;
use avoid_roads::resolver::RoadIndex;
use avoid_roads::source::{Fetcher, PointLimit, SourceDescriptor};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "ingest")]
#[command(about = "Resolve a GeoJSON point layer into roads to avoid")]
struct Args {
    /// Point layer: a local file or an http(s) URL ending in .json
    #[arg(short, long)]
    source: String,

    /// Road network GeoJSON (LineString features with a numeric `id`)
    #[arg(short, long)]
    roads: PathBuf,

    /// Routing profile to update (defaults to the config's default profile)
    #[arg(short, long)]
    profile: Option<Profile>,

    /// Maximum number of points to read, -1 for all
    #[arg(long, allow_hyphen_values = true)]
    limit: Option<i64>,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for persisted avoid roads
    #[arg(long)]
    avoid_roads_dir: Option<PathBuf>,

    /// Collapse points closer than this many meters
    #[arg(long)]
    dedup_radius: Option<f64>,

    /// Keep results in memory only
    #[arg(long)]
    no_persist: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(dir) = args.avoid_roads_dir {
        config.avoid_roads_dir = dir;
    }
    if let Some(radius) = args.dedup_radius {
        config.dedup_radius_m = Some(radius);
    }
    if args.no_persist {
        config.persist_results = false;
    }
    config.validate()?;

    let profile = args.profile.unwrap_or_else(|| config.default_profile.clone());
    if !profile.is_path_safe() {
        anyhow::bail!("Profile name {:?} cannot be used as a directory name", profile.name());
    }
    let limit = match args.limit {
        Some(raw) => PointLimit::from_raw(raw),
        None => config.point_limit(),
    };
    let source = SourceDescriptor::parse(&args.source).context("Invalid point source")?;

    info!("Avoid Roads Ingest");
    info!("Source: {} ({})", source, source.kind());
    info!("Profile: {}", profile);

    let roads = RoadIndex::load_from_file(&args.roads, config.max_snap_distance_m)
        .with_context(|| format!("Failed to load road network {}", args.roads.display()))?;
    let fetcher = Fetcher::new(config.fetch_timeout()).context("Failed to build HTTP client")?;

    let routing = Arc::new(RoutingConfig::default());
    let orchestrator = Orchestrator::new(&config, fetcher, Arc::new(roads), Arc::clone(&routing));

    match orchestrator.registries().load(&profile) {
        Ok(previous) if !previous.is_empty() => {
            info!("Replacing {} previously stored avoid roads", previous.len());
        }
        Ok(_) => {}
        Err(e) => warn!("Ignoring stored avoid roads for {}: {}", profile, e),
    }

    let handle = orchestrator
        .submit(RunRequest::new(source, profile.clone()).with_limit(limit))
        .context("Failed to start avoid roads run")?;

    let report = handle.outcome().await?;
    println!("{}", report);

    if let Some(path) = &report.persisted_to {
        info!("Avoid roads saved to {}", path.display());
    } else if report.persist_error.is_some() {
        warn!("Avoid roads were applied but not saved");
    }
    info!(
        "{} roads are now impassable for {}",
        routing.impassable_roads(&profile).len(),
        profile
    );

    Ok(())
}
