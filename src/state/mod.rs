// State management module
//
// This module provides the StateManager which wraps RunState with thread-safe access
// using Arc<RwLock<T>> and emits change events for frontend updates.

use crate::models::{PoiRecord, RunOutcome, RunPhase, RunState, StrategyKind};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

/// Change events emitted when state is modified
///
/// These events notify interested parties (the controller, the console frontend)
/// about state changes without requiring them to poll the state.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// The run phase moved (e.g. Running -> Paused)
    PhaseChanged { from: RunPhase, to: RunPhase },

    /// A run has started
    RunStarted {
        keyword: String,
        total_regions: usize,
        strategy: StrategyKind,
    },

    /// Region progress or the fetch cursor moved
    ProgressUpdated {
        completed: usize,
        total: usize,
        current_region: Option<String>,
    },

    /// More records were collected
    RecordsCollected { total: usize },

    /// The run ended
    RunFinished { outcome: RunOutcome, records: usize },

    /// State has been reset
    StateReset,
}

/// Fields compared by change detection.
///
/// Comparing a digest instead of a full clone keeps updates cheap once a run has
/// collected many records.
#[derive(Debug, Clone, PartialEq)]
struct StateDigest {
    phase: RunPhase,
    keyword: String,
    strategy: Option<StrategyKind>,
    run_counts: (usize, usize),
    current_region: Option<String>,
    current_page: u32,
    records: usize,
    last_outcome: Option<RunOutcome>,
}

impl From<&RunState> for StateDigest {
    fn from(state: &RunState) -> Self {
        Self {
            phase: state.phase,
            keyword: state.keyword.clone(),
            strategy: state.strategy,
            run_counts: state.run_counts(),
            current_region: state.current_region.clone(),
            current_page: state.current_page,
            records: state.records.len(),
            last_outcome: state.last_outcome,
        }
    }
}

/// Thread-safe state manager with event emission
///
/// This is the central state component that:
/// - Provides thread-safe access to [`RunState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`StateChange`] events
/// - Enforces the single-active-run rule with an atomic check-and-set
/// - Supports subscribing to state changes via tokio broadcast channels
///
/// # Usage
///
/// Always use `StateManager` instead of accessing [`RunState`] directly:
/// - [`read()`](Self::read) for reading state
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to state changes
///
/// # Related Types
///
/// - [`crate::models::RunState`]: The underlying state structure
/// - [`crate::services::orchestrator::QueryOrchestrator`]: The only writer during a run
/// - [`crate::ui::controller::SearchController`]: Reads snapshots for the frontend
pub struct StateManager {
    /// The run state protected by RwLock for thread-safe access
    state: Arc<RwLock<RunState>>,

    /// Broadcast channel for emitting state change events
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with idle state
    ///
    /// # Returns
    /// A new StateManager with a broadcast channel buffer of 256 events
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(256);
        Self {
            state: Arc::new(RwLock::new(RunState::default())),
            state_tx,
        }
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, RunState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, RunState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get a snapshot of the current state
    ///
    /// This clones the entire state including collected records. For single
    /// fields use [`read()`](Self::read) with a closure.
    pub fn snapshot(&self) -> RunState {
        self.read_guard().clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let phase = state_manager.read(|state| state.phase);
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&RunState) -> R,
    {
        let state = self.read_guard();
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// # Returns
    /// A vector of StateChange events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut RunState),
    {
        let changes = {
            let mut state = self.write_guard();
            let before = StateDigest::from(&*state);
            update_fn(&mut state);
            Self::detect_changes(&before, &StateDigest::from(&*state))
        };

        self.emit(&changes);
        changes
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn emit(&self, changes: &[StateChange]) {
        for change in changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }
    }

    fn detect_changes(old: &StateDigest, new: &StateDigest) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.phase != new.phase {
            changes.push(StateChange::PhaseChanged {
                from: old.phase,
                to: new.phase,
            });

            if new.phase == RunPhase::Running && !old.phase.is_active() {
                if let Some(strategy) = new.strategy {
                    changes.push(StateChange::RunStarted {
                        keyword: new.keyword.clone(),
                        total_regions: new.run_counts.1,
                        strategy,
                    });
                }
            }

            if new.phase.is_terminal() {
                if let Some(outcome) = new.last_outcome {
                    changes.push(StateChange::RunFinished {
                        outcome,
                        records: new.records,
                    });
                }
            }
        }

        if old.run_counts != new.run_counts || old.current_region != new.current_region {
            changes.push(StateChange::ProgressUpdated {
                completed: new.run_counts.0,
                total: new.run_counts.1,
                current_region: new.current_region.clone(),
            });
        }

        if new.records > old.records {
            changes.push(StateChange::RecordsCollected { total: new.records });
        }

        changes
    }

    // Convenience methods for common state updates

    /// Begin a run unless one is already active.
    ///
    /// The phase check and the transition happen under one write lock, so two
    /// concurrent callers can never both start a run.
    ///
    /// # Errors
    /// Returns the current phase when a run is already running or paused.
    pub fn try_begin_run(
        &self,
        keyword: &str,
        regions: &[String],
        strategy: StrategyKind,
    ) -> Result<Vec<StateChange>, RunPhase> {
        let changes = {
            let mut state = self.write_guard();
            if state.phase.is_active() {
                return Err(state.phase);
            }
            let before = StateDigest::from(&*state);
            state.begin(keyword, regions, strategy);
            Self::detect_changes(&before, &StateDigest::from(&*state))
        };

        self.emit(&changes);
        Ok(changes)
    }

    /// Switch between Running and Paused. Other phases are left alone.
    pub fn set_paused(&self, paused: bool) -> Vec<StateChange> {
        self.update(|state| {
            state.phase = match (state.phase, paused) {
                (RunPhase::Running, true) => RunPhase::Paused,
                (RunPhase::Paused, false) => RunPhase::Running,
                (phase, _) => phase,
            };
        })
    }

    /// Record the region and page about to be fetched
    pub fn set_cursor(&self, region: &str, page: u32) -> Vec<StateChange> {
        self.update(|state| {
            if state.current_region.as_deref() != Some(region) {
                state.current_region = Some(region.to_string());
            }
            state.current_page = page;
        })
    }

    pub fn push_records(&self, records: &[PoiRecord]) -> Vec<StateChange> {
        self.update(|state| state.push_records(records))
    }

    pub fn mark_region_complete(&self, region: &str) -> Vec<StateChange> {
        self.update(|state| {
            state.progress.mark_complete(region);
        })
    }

    pub fn note_export_warning(&self) {
        self.update(|state| state.export_warnings += 1);
    }

    /// Move to the terminal phase for `outcome` and drop the run target.
    pub fn finish_run(&self, outcome: RunOutcome) -> Vec<StateChange> {
        self.update(|state| {
            state.last_outcome = Some(outcome);
            state.phase = outcome.into();
            state.current_region = None;
            state.current_page = 0;
            state.progress.end_run();
        })
    }

    /// Reset all run state back to idle
    ///
    /// Ignored while a run is active.
    pub fn reset_run_state(&self) -> Vec<StateChange> {
        if self.is_active() {
            tracing::warn!("Ignoring state reset while a run is active");
            return Vec::new();
        }

        let mut changes = self.update(|state| state.reset());

        let reset_event = StateChange::StateReset;
        let _ = self.state_tx.send(reset_event.clone());
        changes.push(reset_event);

        changes
    }

    pub fn phase(&self) -> RunPhase {
        self.read(|state| state.phase)
    }

    pub fn is_active(&self) -> bool {
        self.phase().is_active()
    }

    /// Records collected by the current (or last) run
    pub fn records(&self) -> Vec<PoiRecord> {
        self.read(|state| state.records.clone())
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Make StateManager cloneable for sharing across tasks
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}
