use crate::models::PoiRecord;
use crate::services::progress::{ProgressTracker, RunTarget};
use std::fmt;

/// Phase of the query state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunPhase {
    #[default]
    Idle,
    Running,
    Paused,
    Finished,
    Cancelled,
    CredentialsExhausted,
}

impl RunPhase {
    /// True while a worker owns the run (running or paused).
    pub fn is_active(self) -> bool {
        matches!(self, RunPhase::Running | RunPhase::Paused)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunPhase::Finished | RunPhase::Cancelled | RunPhase::CredentialsExhausted
        )
    }
}

/// Reason a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
    CredentialsExhausted,
}

impl From<RunOutcome> for RunPhase {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Completed => RunPhase::Finished,
            RunOutcome::Cancelled => RunPhase::Cancelled,
            RunOutcome::CredentialsExhausted => RunPhase::CredentialsExhausted,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "completed"),
            RunOutcome::Cancelled => write!(f, "cancelled by user"),
            RunOutcome::CredentialsExhausted => write!(f, "all API keys exhausted"),
        }
    }
}

/// Execution strategy for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Sequential,
    ChunkedBatch,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Sequential => write!(f, "sequential"),
            StrategyKind::ChunkedBatch => write!(f, "chunked batch"),
        }
    }
}

/// Single source of truth for the state of the current (or last) query run.
///
/// # Thread Safety
///
/// `RunState` is wrapped in `Arc<RwLock<RunState>>` by [`crate::state::StateManager`].
/// The worker is the only writer while a run is active; frontends read snapshots.
#[derive(Clone, Debug, Default)]
pub struct RunState {
    pub phase: RunPhase,
    pub keyword: String,
    pub strategy: Option<StrategyKind>,

    // Cursor
    pub current_region: Option<String>,
    pub current_page: u32,

    // Progress
    pub progress: ProgressTracker,

    // Results kept in memory for manual export
    pub records: Vec<PoiRecord>,
    pub export_warnings: usize,
    pub last_outcome: Option<RunOutcome>,
}

impl RunState {
    /// Reset per-run fields and install a new run target.
    pub fn begin(&mut self, keyword: &str, regions: &[String], strategy: StrategyKind) {
        self.phase = RunPhase::Running;
        self.keyword = keyword.to_string();
        self.strategy = Some(strategy);
        self.current_region = None;
        self.current_page = 0;
        self.records.clear();
        self.export_warnings = 0;
        self.last_outcome = None;
        self.progress.begin_run(RunTarget::new(regions.iter().cloned()));
    }

    pub fn push_records(&mut self, records: &[PoiRecord]) {
        self.records.extend_from_slice(records);
    }

    /// Returns `(completed, total)` for the run target, or `(0, 0)` without one.
    pub fn run_counts(&self) -> (usize, usize) {
        self.progress
            .run_snapshot()
            .map(|s| (s.completed, s.total))
            .unwrap_or((0, 0))
    }

    /// Reset everything back to idle, dropping collected records.
    pub fn reset(&mut self) {
        *self = RunState::default();
    }
}
