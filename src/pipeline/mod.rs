//! Run orchestration: fetch, parse, index and resolve points, then publish the result.

mod orchestrator;
mod report;
mod state;

pub use orchestrator::{CompletionCallback, Orchestrator, RunHandle, RunRequest};
pub use report::{RunFailure, RunOutcome, RunReport, StageTimings};
pub use state::RunState;
