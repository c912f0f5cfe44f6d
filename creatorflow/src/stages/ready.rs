//! Mark-ready stage: the terminal commit of a successful run.

use crate::core::PipelineStatus;
use crate::errors::PipelineError;
use crate::pipeline::{PipelineStage, RunContext};
use async_trait::async_trait;

/// Commits the ready status and retires the run's ownership.
///
/// The ready write itself is the runner's guarded entry-status write for
/// this stage, so a run that lost the pointer exits superseded without
/// ever marking the creator ready. The body only releases the pointer and
/// fires the best-effort notification.
pub struct MarkReadyStage;

#[async_trait]
impl PipelineStage for MarkReadyStage {
    fn name(&self) -> &'static str {
        "mark_ready"
    }

    fn entry_status(&self) -> PipelineStatus {
        PipelineStatus::Ready
    }

    async fn execute(&self, ctx: &RunContext) -> Result<(), PipelineError> {
        let creator = ctx.creator_id().clone();

        // Ready is committed; the pointer has done its job. Release it so
        // the next launch claims a free pointer instead of superseding.
        let released = ctx
            .registry()
            .release_ownership(&creator, ctx.run_id())
            .await?;
        if !released {
            tracing::debug!(
                creator_id = %creator,
                run_id = %ctx.run_id(),
                "pointer moved after ready commit, nothing to release"
            );
        }

        ctx.ports().notifier.creator_ready(&creator, ctx.run_id()).await;
        ctx.record_progress("ready", true).await;
        tracing::info!(creator_id = %creator, run_id = %ctx.run_id(), "creator marked ready");
        Ok(())
    }
}
