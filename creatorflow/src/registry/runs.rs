//! Run lifecycle operations built on the registry store.
//!
//! These are the only ways runners touch run records and creator state:
//! idempotent begin, the ownership guard, best-effort heartbeats, guarded
//! status writes, and terminal bookkeeping.

use crate::core::{
    CreatorId, CreatorPipelineState, PipelineRun, PipelineStatus, RunDescriptor, RunId,
    RunMetrics, RunStatus,
};
use crate::errors::{PipelineError, SupersededRun};
use crate::events::{get_alert_sink, Alert};
use crate::registry::store::RegistryStore;
use std::sync::Arc;

/// How many times a launch retries its ownership takeover when racing
/// other launches for the same creator.
const TAKEOVER_ATTEMPTS: usize = 3;

/// High-level registry operations shared by the launcher, the runner, and
/// the watchdog.
#[derive(Clone)]
pub struct PipelineRegistry {
    store: Arc<dyn RegistryStore>,
}

impl PipelineRegistry {
    /// Creates a registry over the given store.
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self { store }
    }

    /// Creates the run record for a launch, reusing it if it already exists.
    ///
    /// Duplicate begins happen by design: a replayed queue message or a
    /// host retry calls this again with the same run id and must not
    /// produce a second record.
    pub async fn begin_run(&self, descriptor: RunDescriptor) -> Result<PipelineRun, PipelineError> {
        let (run, inserted) = self
            .store
            .insert_run_if_absent(PipelineRun::started(descriptor))
            .await?;
        if inserted {
            tracing::info!(
                run_id = %run.run_id,
                creator_id = %run.creator_id,
                trigger = %run.trigger,
                "run record created"
            );
        } else {
            tracing::debug!(run_id = %run.run_id, "run record already exists, reusing");
        }
        Ok(run)
    }

    /// The guard called before every write a run makes.
    ///
    /// Returns the supersession exit when the creator's pointer no longer
    /// names `run_id` (including when the pointer was released or the
    /// creator has no state row at all).
    pub async fn ensure_active_run(
        &self,
        creator_id: &CreatorId,
        run_id: &RunId,
    ) -> Result<(), PipelineError> {
        match self.store.get_state(creator_id).await? {
            Some(state) if state.owns(run_id) => Ok(()),
            Some(state) => {
                let mut exit = SupersededRun::new(creator_id.clone(), run_id.clone());
                if let Some(owner) = state.pipeline_run_id {
                    exit = exit.with_current_owner(owner);
                }
                Err(exit.into())
            }
            None => Err(SupersededRun::new(creator_id.clone(), run_id.clone()).into()),
        }
    }

    /// Best-effort liveness signal: stamps the heartbeat time and merges
    /// progress metrics into the run record.
    ///
    /// Heartbeat problems must never fail a run, so store errors are
    /// logged and swallowed here.
    pub async fn heartbeat(&self, run_id: &RunId, metrics: &RunMetrics) {
        match self.store.record_heartbeat(run_id, metrics).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(run_id = %run_id, "heartbeat dropped, run no longer running");
            }
            Err(error) => {
                tracing::warn!(run_id = %run_id, %error, "heartbeat write failed");
            }
        }
    }

    /// Advances the creator's status, only if `run_id` still owns the
    /// pointer. Returns whether the write applied; a skipped write is not
    /// an error here, callers that need to stop on it check the flag.
    pub async fn set_status(
        &self,
        creator_id: &CreatorId,
        run_id: &RunId,
        status: PipelineStatus,
    ) -> Result<bool, PipelineError> {
        let applied = self
            .store
            .set_status_if_owner(creator_id, run_id, status, None)
            .await?;
        if applied {
            tracing::debug!(creator_id = %creator_id, run_id = %run_id, %status, "status advanced");
        } else {
            tracing::debug!(
                creator_id = %creator_id,
                run_id = %run_id,
                %status,
                "status write skipped, run no longer owns the pointer"
            );
        }
        Ok(applied)
    }

    /// Marks a run record completed. A no-op if it already reached a
    /// terminal status.
    pub async fn complete_run(&self, run_id: &RunId) -> Result<(), PipelineError> {
        if self
            .store
            .finish_run(run_id, RunStatus::Completed, None, None)
            .await?
        {
            tracing::info!(run_id = %run_id, "run completed");
        } else {
            tracing::debug!(run_id = %run_id, "completion dropped, run already terminal");
        }
        Ok(())
    }

    /// Marks a run record failed and, if the run still owns the pointer,
    /// moves the creator to the error status. Raises the run-failed alert.
    pub async fn fail_run(
        &self,
        creator_id: &CreatorId,
        run_id: &RunId,
        reason: &str,
    ) -> Result<(), PipelineError> {
        let finished = self
            .store
            .finish_run(run_id, RunStatus::Failed, Some(reason.to_string()), None)
            .await?;
        if !finished {
            tracing::debug!(run_id = %run_id, "failure dropped, run already terminal");
            return Ok(());
        }

        self.store
            .set_status_if_owner(
                creator_id,
                run_id,
                PipelineStatus::Error,
                Some(reason.to_string()),
            )
            .await?;

        tracing::error!(creator_id = %creator_id, run_id = %run_id, reason, "run failed");
        get_alert_sink()
            .raise(
                Alert::error(
                    Alert::RUN_FAILED,
                    format!("pipeline run {run_id} for creator {creator_id} failed: {reason}"),
                )
                .with_creator(creator_id.clone())
                .with_run(run_id.clone()),
            )
            .await;
        Ok(())
    }

    /// Marks a run record superseded. A no-op if the record already
    /// reached a terminal status.
    ///
    /// `superseded_by` is absent when the pointer was released rather than
    /// handed to a newer run.
    pub async fn mark_superseded(
        &self,
        run_id: &RunId,
        superseded_by: Option<&RunId>,
    ) -> Result<(), PipelineError> {
        if self
            .store
            .finish_run(run_id, RunStatus::Superseded, None, superseded_by.cloned())
            .await?
        {
            tracing::info!(run_id = %run_id, superseded_by = ?superseded_by, "run superseded");
        } else {
            tracing::debug!(run_id = %run_id, "supersession dropped, run already terminal");
        }
        Ok(())
    }

    /// Points the creator at a new run, whatever the pointer held before,
    /// and resets the status to pending in the same write.
    ///
    /// Returns the previous owner so the caller can mark it superseded.
    /// Fails with the supersession exit only if other launches keep
    /// winning the pointer race.
    pub async fn take_ownership(
        &self,
        creator_id: &CreatorId,
        run_id: &RunId,
    ) -> Result<Option<RunId>, PipelineError> {
        for _ in 0..TAKEOVER_ATTEMPTS {
            let state = self.store.ensure_state(creator_id).await?;
            let expected = state.pipeline_run_id.clone();
            let swap = self
                .store
                .compare_and_swap_owner(
                    creator_id,
                    expected.as_ref(),
                    Some(run_id),
                    Some(PipelineStatus::Pending),
                )
                .await?;
            if swap.applied {
                tracing::info!(
                    creator_id = %creator_id,
                    run_id = %run_id,
                    previous = ?expected,
                    "ownership taken"
                );
                return Ok(expected);
            }
        }

        let state = self.store.ensure_state(creator_id).await?;
        let mut exit = SupersededRun::new(creator_id.clone(), run_id.clone());
        if let Some(owner) = state.pipeline_run_id {
            exit = exit.with_current_owner(owner);
        }
        Err(exit.into())
    }

    /// Swaps the pointer from `expected` to `next` in one conditional
    /// write. Returns whether the claim applied.
    ///
    /// This is the watchdog's takeover primitive: it must claim only if
    /// the original run still holds the pointer.
    pub async fn claim_ownership_if(
        &self,
        creator_id: &CreatorId,
        expected: &RunId,
        next: &RunId,
    ) -> Result<bool, PipelineError> {
        let swap = self
            .store
            .compare_and_swap_owner(creator_id, Some(expected), Some(next), None)
            .await?;
        Ok(swap.applied)
    }

    /// Releases the pointer if `run_id` still holds it. Returns whether
    /// the release applied.
    pub async fn release_ownership(
        &self,
        creator_id: &CreatorId,
        run_id: &RunId,
    ) -> Result<bool, PipelineError> {
        let swap = self
            .store
            .compare_and_swap_owner(creator_id, Some(run_id), None, None)
            .await?;
        Ok(swap.applied)
    }

    /// Gets a run record.
    pub async fn get_run(&self, run_id: &RunId) -> Result<Option<PipelineRun>, PipelineError> {
        Ok(self.store.get_run(run_id).await?)
    }

    /// Gets a creator's state row.
    pub async fn get_state(
        &self,
        creator_id: &CreatorId,
    ) -> Result<Option<CreatorPipelineState>, PipelineError> {
        Ok(self.store.get_state(creator_id).await?)
    }
}
