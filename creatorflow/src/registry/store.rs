//! Storage backend for run records and creator pipeline state.
//!
//! Every conditional write the pipeline relies on (insert-if-absent,
//! compare-and-swap, guarded status) is a single store call, so a backend
//! that executes each call atomically gives the whole system its
//! concurrency guarantees.

use crate::core::{
    CreatorId, CreatorPipelineState, PipelineRun, PipelineStatus, RunId, RunMetrics, RunStatus,
};
use crate::errors::StoreError;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Result of an ownership compare-and-swap.
#[derive(Debug, Clone)]
pub struct OwnershipSwap {
    /// Whether the pointer was swapped.
    pub applied: bool,
    /// The state row after the attempt. When the swap did not apply, this
    /// shows who actually holds the pointer.
    pub state: CreatorPipelineState,
}

/// Protocol for the registry storage backend.
///
/// Implementations must execute each method atomically with respect to the
/// others; the in-memory backend does this with one lock, a database
/// backend with single-statement conditional writes.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Inserts a run record unless one with the same id exists.
    ///
    /// Returns the stored record and whether this call inserted it.
    async fn insert_run_if_absent(
        &self,
        run: PipelineRun,
    ) -> Result<(PipelineRun, bool), StoreError>;

    /// Gets a run record by id.
    async fn get_run(&self, run_id: &RunId) -> Result<Option<PipelineRun>, StoreError>;

    /// Stamps the heartbeat time and merges metrics, only while the run is
    /// still running. Returns whether the write applied.
    async fn record_heartbeat(
        &self,
        run_id: &RunId,
        metrics: &RunMetrics,
    ) -> Result<bool, StoreError>;

    /// Moves a running record to a terminal status.
    ///
    /// Returns false without writing when the record is missing or already
    /// terminal, so the first terminal outcome always wins.
    async fn finish_run(
        &self,
        run_id: &RunId,
        status: RunStatus,
        failure_reason: Option<String>,
        superseded_by: Option<RunId>,
    ) -> Result<bool, StoreError>;

    /// Gets a creator's state row.
    async fn get_state(
        &self,
        creator_id: &CreatorId,
    ) -> Result<Option<CreatorPipelineState>, StoreError>;

    /// Gets a creator's state row, creating an empty one if absent.
    async fn ensure_state(
        &self,
        creator_id: &CreatorId,
    ) -> Result<CreatorPipelineState, StoreError>;

    /// Atomically replaces the ownership pointer iff it currently equals
    /// `expected`, optionally resetting the status in the same write.
    ///
    /// A missing state row is treated as a fresh row with no owner, so a
    /// swap with `expected == None` can claim a creator that has never
    /// been seen before.
    async fn compare_and_swap_owner(
        &self,
        creator_id: &CreatorId,
        expected: Option<&RunId>,
        next: Option<&RunId>,
        status_on_swap: Option<PipelineStatus>,
    ) -> Result<OwnershipSwap, StoreError>;

    /// Writes the status (and optional error message) iff `run_id` holds
    /// the ownership pointer. Returns whether the write applied.
    async fn set_status_if_owner(
        &self,
        creator_id: &CreatorId,
        run_id: &RunId,
        status: PipelineStatus,
        error: Option<String>,
    ) -> Result<bool, StoreError>;
}

#[derive(Debug, Default)]
struct Tables {
    runs: HashMap<RunId, PipelineRun>,
    states: HashMap<CreatorId, CreatorPipelineState>,
}

/// In-memory registry store.
///
/// One mutex over both tables makes every trait method atomic, which is
/// exactly the contract a production backend provides with conditional
/// writes.
#[derive(Debug, Default)]
pub struct InMemoryRegistryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryRegistryStore {
    /// Creates a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of run records.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.tables.lock().runs.len()
    }

    /// Returns all run records for a creator, in no particular order.
    #[must_use]
    pub fn runs_for_creator(&self, creator_id: &CreatorId) -> Vec<PipelineRun> {
        self.tables
            .lock()
            .runs
            .values()
            .filter(|run| &run.creator_id == creator_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RegistryStore for InMemoryRegistryStore {
    async fn insert_run_if_absent(
        &self,
        run: PipelineRun,
    ) -> Result<(PipelineRun, bool), StoreError> {
        let mut tables = self.tables.lock();
        if let Some(existing) = tables.runs.get(&run.run_id) {
            return Ok((existing.clone(), false));
        }
        tables.runs.insert(run.run_id.clone(), run.clone());
        Ok((run, true))
    }

    async fn get_run(&self, run_id: &RunId) -> Result<Option<PipelineRun>, StoreError> {
        Ok(self.tables.lock().runs.get(run_id).cloned())
    }

    async fn record_heartbeat(
        &self,
        run_id: &RunId,
        metrics: &RunMetrics,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock();
        let Some(run) = tables.runs.get_mut(run_id) else {
            return Ok(false);
        };
        if !run.is_active() {
            return Ok(false);
        }
        run.heartbeat_at = Some(Utc::now());
        run.metrics.merge(metrics);
        Ok(true)
    }

    async fn finish_run(
        &self,
        run_id: &RunId,
        status: RunStatus,
        failure_reason: Option<String>,
        superseded_by: Option<RunId>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock();
        let Some(run) = tables.runs.get_mut(run_id) else {
            return Ok(false);
        };
        if !run.is_active() {
            return Ok(false);
        }
        run.status = status;
        run.finished_at = Some(Utc::now());
        run.failure_reason = failure_reason;
        run.superseded_by = superseded_by;
        Ok(true)
    }

    async fn get_state(
        &self,
        creator_id: &CreatorId,
    ) -> Result<Option<CreatorPipelineState>, StoreError> {
        Ok(self.tables.lock().states.get(creator_id).cloned())
    }

    async fn ensure_state(
        &self,
        creator_id: &CreatorId,
    ) -> Result<CreatorPipelineState, StoreError> {
        let mut tables = self.tables.lock();
        let state = tables
            .states
            .entry(creator_id.clone())
            .or_insert_with(|| CreatorPipelineState::new(creator_id.clone()));
        Ok(state.clone())
    }

    async fn compare_and_swap_owner(
        &self,
        creator_id: &CreatorId,
        expected: Option<&RunId>,
        next: Option<&RunId>,
        status_on_swap: Option<PipelineStatus>,
    ) -> Result<OwnershipSwap, StoreError> {
        let mut tables = self.tables.lock();
        let state = tables
            .states
            .entry(creator_id.clone())
            .or_insert_with(|| CreatorPipelineState::new(creator_id.clone()));

        let applied = state.pipeline_run_id.as_ref() == expected;
        if applied {
            state.pipeline_run_id = next.cloned();
            if let Some(status) = status_on_swap {
                state.status = status;
            }
            state.updated_at = Utc::now();
        }
        Ok(OwnershipSwap {
            applied,
            state: state.clone(),
        })
    }

    async fn set_status_if_owner(
        &self,
        creator_id: &CreatorId,
        run_id: &RunId,
        status: PipelineStatus,
        error: Option<String>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock();
        let Some(state) = tables.states.get_mut(creator_id) else {
            return Ok(false);
        };
        if !state.owns(run_id) {
            return Ok(false);
        }
        let now = Utc::now();
        state.status = status;
        state.updated_at = now;
        if status == PipelineStatus::Ready {
            state.last_ready_at = Some(now);
        }
        if error.is_some() {
            state.last_error = error;
        }
        Ok(true)
    }
}
