use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::RunState;
use crate::error::{PersistError, RunError};
use crate::models::Profile;

/// Wall time spent in each stage
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StageTimings {
    pub download: Duration,
    pub parse: Duration,
    pub dedup: Duration,
    pub resolve: Duration,
}

impl StageTimings {
    pub fn total(&self) -> Duration {
        self.download + self.parse + self.dedup + self.resolve
    }
}

/// Summary of a completed run
#[derive(Debug)]
pub struct RunReport {
    pub run_id: u64,
    pub profile: Profile,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub parsed_points: usize,
    pub candidate_points: usize,
    pub resolved_segments: usize,
    pub timings: StageTimings,
    /// Set when the registry was written to disk
    pub persisted_to: Option<PathBuf>,
    /// The in-memory registry is still updated when this is set
    pub persist_error: Option<PersistError>,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Found {} unique roads to avoid ({} points, {} candidates, profile {})",
            self.resolved_segments, self.parsed_points, self.candidate_points, self.profile
        )?;
        writeln!(f, "Time to download: {:.3}s", self.timings.download.as_secs_f64())?;
        writeln!(f, "Time to parse JSON: {:.3}s", self.timings.parse.as_secs_f64())?;
        writeln!(f, "Time to index points: {:.3}s", self.timings.dedup.as_secs_f64())?;
        write!(f, "Time to find roads: {:.3}s", self.timings.resolve.as_secs_f64())?;
        if let Some(e) = &self.persist_error {
            write!(f, "\nFailed to save avoid roads: {}", e)?;
        }
        Ok(())
    }
}

/// A run that ended in `Failed`, with the stage it failed in
#[derive(Debug, thiserror::Error)]
#[error("run {run_id} failed while {stage}: {error}")]
pub struct RunFailure {
    pub run_id: u64,
    pub profile: Profile,
    pub stage: RunState,
    #[source]
    pub error: RunError,
    pub timings: StageTimings,
}

pub type RunOutcome = Result<RunReport, RunFailure>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;

    fn report() -> RunReport {
        RunReport {
            run_id: 3,
            profile: Profile::car(),
            source: "points.json".to_string(),
            started_at: Utc::now(),
            parsed_points: 10,
            candidate_points: 10,
            resolved_segments: 4,
            timings: StageTimings {
                download: Duration::from_millis(1500),
                parse: Duration::from_millis(20),
                dedup: Duration::from_millis(1),
                resolve: Duration::from_millis(250),
            },
            persisted_to: None,
            persist_error: None,
        }
    }

    #[test]
    fn test_summary_lines() {
        let text = report().to_string();
        assert!(text.starts_with("Found 4 unique roads to avoid"));
        assert!(text.contains("Time to download: 1.500s"));
        assert!(text.contains("Time to find roads: 0.250s"));
        assert!(!text.contains("Failed to save"));
    }

    #[test]
    fn test_total_timing() {
        assert_eq!(report().timings.total(), Duration::from_millis(1771));
    }

    #[test]
    fn test_failure_names_stage() {
        let failure = RunFailure {
            run_id: 7,
            profile: Profile::car(),
            stage: RunState::Parsing,
            error: ParseError::MissingFeatures.into(),
            timings: StageTimings::default(),
        };
        assert_eq!(
            failure.to_string(),
            "run 7 failed while parsing: feature collection has no `features` array"
        );
    }
}
