//! Stage sequencing under the ownership guard.
//!
//! The runner owns the contract every stage relies on: the ownership
//! guard runs before the stage, the creator-facing status advances on
//! entry, and a heartbeat lands at every stage boundary. Stages only
//! implement their body; exits and terminal bookkeeping live here.

use crate::config::PipelineConfig;
use crate::core::{CreatorId, PipelineStatus, RunDescriptor, RunId, RunMetrics};
use crate::errors::{PipelineError, SupersededRun};
use crate::ports::PipelinePorts;
use crate::registry::PipelineRegistry;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// One stage of the ingestion sequence.
///
/// Stages are stateless; everything they need arrives through the
/// [`RunContext`]. A stage that writes creator data must call
/// [`RunContext::ensure_active`] before each write burst so a superseded
/// run stops at the next boundary instead of racing its successor.
#[async_trait]
pub trait PipelineStage: Send + Sync {
    /// Stable name used in logs and metric keys.
    fn name(&self) -> &'static str;

    /// Status the creator shows while this stage works.
    fn entry_status(&self) -> PipelineStatus;

    /// Runs the stage body.
    async fn execute(&self, ctx: &RunContext) -> Result<(), PipelineError>;
}

/// Everything a stage needs: run identity, collaborators, config, and
/// the shared metrics accumulator.
pub struct RunContext {
    descriptor: RunDescriptor,
    registry: PipelineRegistry,
    ports: PipelinePorts,
    config: PipelineConfig,
    metrics: Mutex<RunMetrics>,
}

impl RunContext {
    /// Builds a context for one run.
    #[must_use]
    pub fn new(
        descriptor: RunDescriptor,
        registry: PipelineRegistry,
        ports: PipelinePorts,
        config: PipelineConfig,
    ) -> Self {
        Self {
            descriptor,
            registry,
            ports,
            config,
            metrics: Mutex::new(RunMetrics::new()),
        }
    }

    /// The run this context executes.
    #[must_use]
    pub fn run_id(&self) -> &RunId {
        &self.descriptor.run_id
    }

    /// The creator being ingested.
    #[must_use]
    pub fn creator_id(&self) -> &CreatorId {
        &self.descriptor.creator_id
    }

    /// Launch-time facts about the run.
    #[must_use]
    pub fn descriptor(&self) -> &RunDescriptor {
        &self.descriptor
    }

    /// Registry operations for guards, status writes, and bookkeeping.
    #[must_use]
    pub fn registry(&self) -> &PipelineRegistry {
        &self.registry
    }

    /// The collaborator bundle.
    #[must_use]
    pub fn ports(&self) -> &PipelinePorts {
        &self.ports
    }

    /// Tuning knobs for every stage.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The ownership guard. Errors with the supersession exit when the
    /// creator's pointer no longer names this run.
    pub async fn ensure_active(&self) -> Result<(), PipelineError> {
        self.registry
            .ensure_active_run(self.creator_id(), self.run_id())
            .await
    }

    /// Records a metric and heartbeats the full snapshot.
    pub async fn record_progress(&self, key: &str, value: impl Into<serde_json::Value> + Send) {
        let snapshot = {
            let mut metrics = self.metrics.lock();
            metrics.set(key, value);
            metrics.clone()
        };
        self.registry.heartbeat(self.run_id(), &snapshot).await;
    }

    /// Heartbeats the current metrics snapshot without changing it.
    pub async fn heartbeat(&self) {
        let snapshot = self.metrics.lock().clone();
        self.registry.heartbeat(self.run_id(), &snapshot).await;
    }

    /// Copy of the metrics recorded so far.
    #[must_use]
    pub fn metrics_snapshot(&self) -> RunMetrics {
        self.metrics.lock().clone()
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", self.run_id())
            .field("creator_id", self.creator_id())
            .finish_non_exhaustive()
    }
}

/// How a run ended. Every variant except `Failed` is a clean exit.
#[derive(Debug)]
pub enum RunOutcome {
    /// All stages finished and the creator was marked ready.
    Ready,
    /// The creator had too little usable content; the pipeline stopped
    /// early without error.
    InsufficientContent {
        /// Usable transcripts found.
        found: usize,
        /// Minimum the pipeline needs.
        required: usize,
    },
    /// A newer run took the pointer; this run stopped at a stage boundary.
    Superseded {
        /// The run now holding the pointer, when the pointer was handed
        /// over rather than released.
        by: Option<RunId>,
    },
    /// The run failed; the creator shows the error status.
    Failed {
        /// What stopped the run.
        error: PipelineError,
    },
}

impl RunOutcome {
    /// Whether the run made the creator ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Whether the run ended without failing.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// Executes a stage sequence for one run and settles the outcome.
pub struct StageRunner {
    stages: Vec<Arc<dyn PipelineStage>>,
}

impl StageRunner {
    /// Builds a runner over an explicit stage sequence.
    #[must_use]
    pub fn new(stages: Vec<Arc<dyn PipelineStage>>) -> Self {
        Self { stages }
    }

    /// Stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Begins (or resumes) the run record, then runs the sequence to an
    /// outcome. All errors are settled here; the caller gets
    /// bookkeeping-complete results, never a raw error.
    pub async fn run(&self, ctx: &RunContext) -> RunOutcome {
        if let Err(error) = ctx.registry().begin_run(ctx.descriptor().clone()).await {
            return self.settle(ctx, error).await;
        }

        tracing::info!(
            run_id = %ctx.run_id(),
            creator_id = %ctx.creator_id(),
            trigger = %ctx.descriptor().trigger,
            stages = self.stages.len(),
            "run starting"
        );

        for stage in &self.stages {
            if let Err(error) = self.run_stage(stage.as_ref(), ctx).await {
                return self.settle(ctx, error).await;
            }
        }

        if let Err(error) = ctx.registry().complete_run(ctx.run_id()).await {
            tracing::warn!(run_id = %ctx.run_id(), %error, "completion bookkeeping failed");
        }
        tracing::info!(run_id = %ctx.run_id(), creator_id = %ctx.creator_id(), "run finished ready");
        RunOutcome::Ready
    }

    async fn run_stage(
        &self,
        stage: &dyn PipelineStage,
        ctx: &RunContext,
    ) -> Result<(), PipelineError> {
        ctx.ensure_active().await?;

        let applied = ctx
            .registry()
            .set_status(ctx.creator_id(), ctx.run_id(), stage.entry_status())
            .await?;
        if !applied {
            // The pointer moved between the guard and the write.
            ctx.ensure_active().await?;
            return Err(SupersededRun::new(ctx.creator_id().clone(), ctx.run_id().clone()).into());
        }

        tracing::info!(
            run_id = %ctx.run_id(),
            stage = stage.name(),
            status = %stage.entry_status(),
            "stage starting"
        );
        // The run row tracks the stage it is on, so a row that stops
        // heartbeating names the stage it died in.
        ctx.record_progress("stage", stage.name()).await;
        let started = Instant::now();
        stage.execute(ctx).await?;

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        ctx.record_progress(&format!("stage_{}_ms", stage.name()), elapsed_ms)
            .await;
        tracing::debug!(run_id = %ctx.run_id(), stage = stage.name(), elapsed_ms, "stage finished");
        Ok(())
    }

    /// Terminal bookkeeping for a stage error. Bookkeeping failures are
    /// logged, never surfaced; the outcome already tells the caller what
    /// happened to the run itself.
    async fn settle(&self, ctx: &RunContext, error: PipelineError) -> RunOutcome {
        match error {
            PipelineError::Superseded(exit) => {
                tracing::info!(
                    run_id = %ctx.run_id(),
                    creator_id = %ctx.creator_id(),
                    current_owner = ?exit.current_owner,
                    "run superseded, stopping cleanly"
                );
                if let Err(err) = ctx
                    .registry()
                    .mark_superseded(ctx.run_id(), exit.current_owner.as_ref())
                    .await
                {
                    tracing::warn!(run_id = %ctx.run_id(), error = %err, "supersession bookkeeping failed");
                }
                RunOutcome::Superseded {
                    by: exit.current_owner,
                }
            }
            PipelineError::InsufficientContent(exit) => {
                tracing::info!(
                    run_id = %ctx.run_id(),
                    creator_id = %ctx.creator_id(),
                    found = exit.found,
                    required = exit.required,
                    "insufficient content, stopping cleanly"
                );
                let registry = ctx.registry();
                if let Err(err) = registry
                    .set_status(
                        ctx.creator_id(),
                        ctx.run_id(),
                        PipelineStatus::InsufficientContent,
                    )
                    .await
                {
                    tracing::warn!(run_id = %ctx.run_id(), error = %err, "status bookkeeping failed");
                }
                if let Err(err) = registry.release_ownership(ctx.creator_id(), ctx.run_id()).await {
                    tracing::warn!(run_id = %ctx.run_id(), error = %err, "pointer release failed");
                }
                if let Err(err) = registry.complete_run(ctx.run_id()).await {
                    tracing::warn!(run_id = %ctx.run_id(), error = %err, "completion bookkeeping failed");
                }
                RunOutcome::InsufficientContent {
                    found: exit.found,
                    required: exit.required,
                }
            }
            error => {
                if let Err(err) = ctx
                    .registry()
                    .fail_run(ctx.creator_id(), ctx.run_id(), &error.to_string())
                    .await
                {
                    tracing::warn!(run_id = %ctx.run_id(), error = %err, "failure bookkeeping failed");
                }
                RunOutcome::Failed { error }
            }
        }
    }
}

impl std::fmt::Debug for StageRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRunner")
            .field("stages", &self.stage_names())
            .finish()
    }
}
