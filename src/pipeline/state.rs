use std::fmt;

/// Lifecycle of the orchestrator's current run.
///
/// `Idle -> Fetching -> Parsing -> Deduping -> Resolving -> {Completed | Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RunState {
    #[default]
    Idle,
    Fetching,
    Parsing,
    Deduping,
    Resolving,
    Completed,
    Failed,
}

impl RunState {
    /// A run is in flight
    pub fn is_active(self) -> bool {
        matches!(
            self,
            RunState::Fetching | RunState::Parsing | RunState::Deduping | RunState::Resolving
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_advance_to(self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Idle | Completed | Failed, Fetching) => true,
            (Fetching, Parsing) | (Parsing, Deduping) | (Deduping, Resolving) => true,
            (Resolving, Completed) => true,
            (from, Failed) => from.is_active(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Fetching => "fetching",
            RunState::Parsing => "parsing",
            RunState::Deduping => "deduping",
            RunState::Resolving => "resolving",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            RunState::Idle,
            RunState::Fetching,
            RunState::Parsing,
            RunState::Deduping,
            RunState::Resolving,
            RunState::Completed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(RunState::Completed.can_advance_to(RunState::Fetching));
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!RunState::Idle.can_advance_to(RunState::Resolving));
        assert!(!RunState::Parsing.can_advance_to(RunState::Completed));
        assert!(!RunState::Idle.can_advance_to(RunState::Failed));
        assert!(!RunState::Completed.can_advance_to(RunState::Failed));
        assert!(RunState::Deduping.can_advance_to(RunState::Failed));
    }
}
