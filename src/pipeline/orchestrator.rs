use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use super::{RunFailure, RunOutcome, RunReport, RunState, StageTimings};
use crate::config::Config;
use crate::error::{PersistError, ResolutionError, RunError, SubmitError, TransportError};
use crate::models::Profile;
use crate::registry::{AvoidRoadsRegistry, RegistrySet, RoutingConfig};
use crate::resolver::SegmentResolver;
use crate::source::{decode_payload, parse as parse_points, Fetcher, PointLimit, SourceDescriptor};
use crate::spatial::SpatialDeduplicator;

/// Invoked on the worker once a run reaches `Completed` or `Failed`
pub type CompletionCallback = Box<dyn FnOnce(&RunOutcome) + Send + 'static>;

/// One ingestion request
pub struct RunRequest {
    pub source: SourceDescriptor,
    pub profile: Profile,
    pub limit: PointLimit,
    cancel: Option<Arc<AtomicBool>>,
    on_complete: Option<CompletionCallback>,
}

impl RunRequest {
    pub fn new(source: SourceDescriptor, profile: Profile) -> Self {
        Self {
            source,
            profile,
            limit: PointLimit::Unlimited,
            cancel: None,
            on_complete: None,
        }
    }

    pub fn with_limit(mut self, limit: PointLimit) -> Self {
        self.limit = limit;
        self
    }

    /// Use a caller-owned cancellation flag instead of a fresh one
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&RunOutcome) + Send + 'static,
    {
        self.on_complete = Some(Box::new(callback));
        self
    }
}

/// Completion handle for a submitted run
pub struct RunHandle {
    run_id: u64,
    profile: Profile,
    cancel: Arc<AtomicBool>,
    state: watch::Receiver<RunState>,
    outcome: oneshot::Receiver<RunOutcome>,
}

impl RunHandle {
    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Ask the worker to stop at the next stage boundary
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    /// Wait for the run to finish
    pub async fn outcome(self) -> RunOutcome {
        let RunHandle {
            run_id,
            profile,
            state,
            outcome,
            ..
        } = self;

        match outcome.await {
            Ok(outcome) => outcome,
            Err(_) => {
                let stage = *state.borrow();
                Err(RunFailure {
                    run_id,
                    profile,
                    stage,
                    error: RunError::Aborted,
                    timings: StageTimings::default(),
                })
            }
        }
    }
}

struct Job {
    run_id: u64,
    request: RunRequest,
    cancel: Arc<AtomicBool>,
    reply: oneshot::Sender<RunOutcome>,
}

/// Runs the avoid-roads pipeline on a single background worker.
///
/// At most one run is in flight; a request submitted while a run is active is rejected
/// with [`SubmitError::Busy`]. All registry mutation happens on the worker.
pub struct Orchestrator {
    jobs: mpsc::Sender<Job>,
    busy: Arc<AtomicBool>,
    state: watch::Receiver<RunState>,
    registries: Arc<RegistrySet>,
    routing: Arc<RoutingConfig>,
    next_run_id: AtomicU64,
}

impl Orchestrator {
    /// Restore the configured profiles' persisted exclusions and start the worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        config: &Config,
        fetcher: Fetcher,
        resolver: Arc<dyn SegmentResolver>,
        routing: Arc<RoutingConfig>,
    ) -> Self {
        let registries = Arc::new(RegistrySet::new(config.avoid_roads_dir.clone()));
        registries.restore(&config.profiles, &routing);

        let (jobs_tx, jobs_rx) = mpsc::channel(1);
        let (state_tx, state_rx) = watch::channel(RunState::Idle);
        let busy = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            fetcher,
            dedup: SpatialDeduplicator::new(config.quadtree, config.dedup_radius_m),
            resolver,
            registries: Arc::clone(&registries),
            routing: Arc::clone(&routing),
            persist_results: config.persist_results,
            fetch_timeout: config.fetch_timeout(),
            resolve_timeout: config.resolve_timeout(),
            busy: Arc::clone(&busy),
            state: state_tx,
        };
        tokio::spawn(worker.run(jobs_rx));

        Self {
            jobs: jobs_tx,
            busy,
            state: state_rx,
            registries,
            routing,
            next_run_id: AtomicU64::new(0),
        }
    }

    /// Start a run, or reject it if one is already active.
    pub fn submit(&self, request: RunRequest) -> Result<RunHandle, SubmitError> {
        if self.jobs.is_closed() {
            return Err(SubmitError::WorkerGone);
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(
                profile = %request.profile,
                source = %request.source,
                "Rejected avoid roads request: a run is already in progress"
            );
            return Err(SubmitError::Busy);
        }

        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = request.cancel.clone().unwrap_or_default();
        let profile = request.profile.clone();
        let (reply, outcome) = oneshot::channel();

        let job = Job {
            run_id,
            request,
            cancel: Arc::clone(&cancel),
            reply,
        };
        if self.jobs.try_send(job).is_err() {
            self.busy.store(false, Ordering::Release);
            return Err(SubmitError::WorkerGone);
        }

        Ok(RunHandle {
            run_id,
            profile,
            cancel,
            state: self.state.clone(),
            outcome,
        })
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Watch state transitions of the current run
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// The registry for `profile`, created empty if no run or restore produced one yet
    pub fn registry(&self, profile: &Profile) -> Arc<AvoidRoadsRegistry> {
        self.registries.get_or_create(profile)
    }

    pub fn registries(&self) -> &RegistrySet {
        &self.registries
    }

    pub fn routing(&self) -> &Arc<RoutingConfig> {
        &self.routing
    }
}

type StageResult<T> = Result<T, (RunState, RunError)>;

struct Worker {
    fetcher: Fetcher,
    dedup: SpatialDeduplicator,
    resolver: Arc<dyn SegmentResolver>,
    registries: Arc<RegistrySet>,
    routing: Arc<RoutingConfig>,
    persist_results: bool,
    fetch_timeout: Option<Duration>,
    resolve_timeout: Option<Duration>,
    busy: Arc<AtomicBool>,
    state: watch::Sender<RunState>,
}

impl Worker {
    async fn run(self, mut jobs: mpsc::Receiver<Job>) {
        while let Some(job) = jobs.recv().await {
            self.process(job).await;
        }
        debug!("Avoid roads worker stopped");
    }

    async fn process(&self, job: Job) {
        let Job {
            run_id,
            request,
            cancel,
            reply,
        } = job;
        let RunRequest {
            source,
            profile,
            limit,
            on_complete,
            ..
        } = request;

        info!(
            run_id,
            profile = %profile,
            source = %source,
            kind = source.kind(),
            "Processing avoid roads"
        );

        let mut timings = StageTimings::default();
        let outcome = match self
            .execute(run_id, &source, &profile, limit, &cancel, &mut timings)
            .await
        {
            Ok(report) => {
                self.enter(run_id, RunState::Completed);
                info!(
                    run_id,
                    profile = %profile,
                    "Found {} unique roads to avoid in {:.3}s",
                    report.resolved_segments,
                    timings.total().as_secs_f64()
                );
                Ok(report)
            }
            Err((stage, error)) => {
                self.enter(run_id, RunState::Failed);
                error!(
                    run_id,
                    profile = %profile,
                    stage = %stage,
                    "Avoid roads run failed: {}",
                    error
                );
                Err(RunFailure {
                    run_id,
                    profile,
                    stage,
                    error,
                    timings,
                })
            }
        };

        self.busy.store(false, Ordering::Release);
        if let Some(callback) = on_complete {
            callback(&outcome);
        }
        // The caller may have dropped its handle
        let _ = reply.send(outcome);
    }

    async fn execute(
        &self,
        run_id: u64,
        source: &SourceDescriptor,
        profile: &Profile,
        limit: PointLimit,
        cancel: &AtomicBool,
        timings: &mut StageTimings,
    ) -> StageResult<RunReport> {
        let started_at = Utc::now();

        self.enter(run_id, RunState::Fetching);
        let clock = Instant::now();
        let bytes = with_deadline(
            self.fetch_timeout,
            self.fetcher.fetch(source),
            TransportError::Timeout,
        )
        .await
        .map_err(|e| (RunState::Fetching, e.into()))?;
        timings.download = clock.elapsed();
        debug!(run_id, "Read {} bytes from {}", bytes.len(), source);
        check_cancelled(cancel, RunState::Fetching)?;

        self.enter(run_id, RunState::Parsing);
        let clock = Instant::now();
        let points = decode_payload(bytes)
            .and_then(|payload| parse_points(&payload, limit))
            .map_err(|e| (RunState::Parsing, e.into()))?;
        timings.parse = clock.elapsed();
        debug!(run_id, "Parsed {} points", points.len());
        check_cancelled(cancel, RunState::Parsing)?;

        self.enter(run_id, RunState::Deduping);
        let clock = Instant::now();
        let candidates = self.dedup.candidates(&points);
        timings.dedup = clock.elapsed();
        check_cancelled(cancel, RunState::Deduping)?;

        self.enter(run_id, RunState::Resolving);
        let clock = Instant::now();
        let mapping = with_deadline(
            self.resolve_timeout,
            self.resolver.resolve(&candidates, profile),
            ResolutionError::Timeout,
        )
        .await
        .map_err(|e| (RunState::Resolving, e.into()))?;
        timings.resolve = clock.elapsed();
        check_cancelled(cancel, RunState::Resolving)?;

        let registry = self.registries.get_or_create(profile);
        registry.replace(mapping);
        registry.apply(&self.routing);
        let resolved_segments = registry.len();

        let (persisted_to, persist_error) = if self.persist_results {
            match self.persist(Arc::clone(&registry), profile).await {
                Ok(path) => (Some(path), None),
                Err(e) => {
                    warn!(run_id, profile = %profile, "Failed to save avoid roads: {}", e);
                    (None, Some(e))
                }
            }
        } else {
            (None, None)
        };

        Ok(RunReport {
            run_id,
            profile: profile.clone(),
            source: source.to_string(),
            started_at,
            parsed_points: points.len(),
            candidate_points: candidates.len(),
            resolved_segments,
            timings: *timings,
            persisted_to,
            persist_error,
        })
    }

    /// Write and fsync on the blocking pool
    async fn persist(
        &self,
        registry: Arc<AvoidRoadsRegistry>,
        profile: &Profile,
    ) -> Result<PathBuf, PersistError> {
        let path = self.registries.path_for(profile)?;
        let target = path.clone();
        tokio::task::spawn_blocking(move || registry.persist(&target))
            .await
            .map_err(|e| PersistError::Io {
                path: path.clone(),
                source: std::io::Error::other(e),
            })??;
        Ok(path)
    }

    fn enter(&self, run_id: u64, next: RunState) {
        let previous = self.state.send_replace(next);
        debug_assert!(
            previous.can_advance_to(next),
            "illegal run transition {} -> {}",
            previous,
            next
        );
        info!(run_id, stage = %next, "Avoid roads run {} -> {}", previous, next);
    }
}

fn check_cancelled(cancel: &AtomicBool, stage: RunState) -> StageResult<()> {
    if cancel.load(Ordering::Acquire) {
        return Err((stage, RunError::Cancelled));
    }
    Ok(())
}

async fn with_deadline<T, E, F>(
    deadline: Option<Duration>,
    fut: F,
    on_timeout: fn(Duration) -> E,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match deadline {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(on_timeout(limit)),
        },
        None => fut.await,
    }
}
