//! Delayed fallback for starts the queue never executed.
//!
//! Every launch arms a watchdog. After a grace window it checks whether the
//! dispatched run visibly started; if nothing did and the creator still
//! points at the original run, it claims the pointer under a derived
//! fallback run id and executes the stage sequence in-process. The claim is
//! a compare-and-swap, so a late consumer and the watchdog can never both
//! own the creator: whichever moves the pointer second loses.

use crate::config::PipelineConfig;
use crate::core::{CreatorId, RunDescriptor, RunId, RunTrigger};
use crate::errors::PipelineError;
use crate::events::{get_alert_sink, Alert};
use crate::pipeline::{RunContext, RunOutcome, StageRunner};
use crate::ports::PipelinePorts;
use crate::registry::PipelineRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Why a watchdog stood down without claiming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogSkip {
    /// A consumer began the run record; normal delivery worked.
    RunStarted,
    /// The creator's pointer no longer names the watched run.
    PointerMoved,
    /// The creator settled into a terminal status during the grace window.
    AlreadySettled,
    /// The pointer moved between the checks and the claim itself.
    LostClaimRace,
}

/// How a watchdog task ended.
#[derive(Debug)]
pub enum WatchdogOutcome {
    /// Cancelled before the grace window elapsed.
    Cancelled,
    /// Delivery worked or the creator moved on; nothing to recover.
    NotNeeded(WatchdogSkip),
    /// The watchdog claimed the pointer and drove the fallback run to a
    /// clean exit: ready, insufficient content, or superseded in turn.
    Recovered {
        /// How the fallback run ended.
        outcome: RunOutcome,
    },
    /// The fallback run itself failed. The creator shows the error status
    /// with the pointer released, so the next launch claims freely.
    FallbackFailed {
        /// What stopped the fallback run.
        reason: String,
    },
    /// A registry check or the claim errored; the watchdog gave up without
    /// engaging.
    Aborted {
        /// The failing operation's error.
        reason: String,
    },
}

/// Everything a watchdog needs to execute a fallback run in-process.
#[derive(Clone)]
pub struct WatchdogDeps {
    /// Registry operations for the checks, the claim, and bookkeeping.
    pub registry: PipelineRegistry,
    /// Collaborators for the fallback run.
    pub ports: PipelinePorts,
    /// Pipeline config; the grace window comes from `config.watchdog`.
    pub config: PipelineConfig,
    /// Stage sequence the fallback executes.
    pub runner: Arc<StageRunner>,
}

/// Handle to one armed watchdog.
#[derive(Debug)]
pub struct WatchdogHandle {
    cancel: Arc<Notify>,
    task: JoinHandle<WatchdogOutcome>,
}

impl WatchdogHandle {
    /// Cancels the watchdog if it is still inside the grace window. A
    /// watchdog that already claimed its fallback run finishes it.
    pub fn cancel(&self) {
        self.cancel.notify_one();
    }

    /// Waits for the watchdog task to finish.
    pub async fn join(self) -> Result<WatchdogOutcome, PipelineError> {
        self.task
            .await
            .map_err(|error| PipelineError::Other(error.into()))
    }
}

/// Arms watchdogs over a fixed dependency bundle.
#[derive(Clone)]
pub struct DispatchWatchdog {
    deps: WatchdogDeps,
}

impl DispatchWatchdog {
    /// Creates a watchdog factory.
    #[must_use]
    pub fn new(deps: WatchdogDeps) -> Self {
        Self { deps }
    }

    /// Arms a watchdog for one dispatched run. The event id, when known,
    /// is carried onto the fallback run record.
    #[must_use]
    pub fn watch(
        &self,
        creator_id: CreatorId,
        run_id: RunId,
        event_id: Option<String>,
    ) -> WatchdogHandle {
        let cancel = Arc::new(Notify::new());
        let task = tokio::spawn(run_watchdog(
            self.deps.clone(),
            creator_id,
            run_id,
            event_id,
            cancel.clone(),
        ));
        WatchdogHandle { cancel, task }
    }
}

impl std::fmt::Debug for DispatchWatchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchWatchdog")
            .field("grace_ms", &self.deps.config.watchdog.grace_ms)
            .finish_non_exhaustive()
    }
}

async fn run_watchdog(
    deps: WatchdogDeps,
    creator_id: CreatorId,
    run_id: RunId,
    event_id: Option<String>,
    cancel: Arc<Notify>,
) -> WatchdogOutcome {
    let grace = Duration::from_millis(deps.config.watchdog.grace_ms);
    tokio::select! {
        () = tokio::time::sleep(grace) => {}
        () = cancel.notified() => {
            tracing::debug!(run_id = %run_id, "watchdog cancelled during grace window");
            return WatchdogOutcome::Cancelled;
        }
    }

    let skip = match stand_down_reason(&deps.registry, &creator_id, &run_id).await {
        Ok(skip) => skip,
        Err(error) => {
            tracing::error!(run_id = %run_id, %error, "watchdog check failed");
            return WatchdogOutcome::Aborted {
                reason: error.to_string(),
            };
        }
    };
    if let Some(skip) = skip {
        tracing::debug!(run_id = %run_id, reason = ?skip, "watchdog standing down");
        return WatchdogOutcome::NotNeeded(skip);
    }

    let fallback_id = run_id.to_fallback();
    let claimed = match deps
        .registry
        .claim_ownership_if(&creator_id, &run_id, &fallback_id)
        .await
    {
        Ok(claimed) => claimed,
        Err(error) => {
            tracing::error!(run_id = %run_id, %error, "watchdog claim failed");
            return WatchdogOutcome::Aborted {
                reason: error.to_string(),
            };
        }
    };
    if !claimed {
        tracing::debug!(run_id = %run_id, "pointer moved before the claim, standing down");
        return WatchdogOutcome::NotNeeded(WatchdogSkip::LostClaimRace);
    }

    tracing::warn!(
        creator_id = %creator_id,
        run_id = %run_id,
        fallback_run_id = %fallback_id,
        grace_ms = deps.config.watchdog.grace_ms,
        "start never executed, watchdog engaging fallback"
    );
    get_alert_sink()
        .raise(
            Alert::warn(
                Alert::FALLBACK_ENGAGED,
                "dispatched start never executed, running fallback in-process",
            )
            .with_creator(creator_id.clone())
            .with_run(fallback_id.clone())
            .with_context(serde_json::json!({
                "original_run_id": run_id,
                "grace_ms": deps.config.watchdog.grace_ms,
            })),
        )
        .await;

    let mut descriptor = RunDescriptor::new(fallback_id.clone(), creator_id.clone())
        .with_trigger(RunTrigger::AutoRecovery)
        .with_replay_of(run_id.clone());
    if let Some(event_id) = event_id {
        descriptor = descriptor.with_event_id(event_id);
    }

    let ctx = RunContext::new(
        descriptor,
        deps.registry.clone(),
        deps.ports.clone(),
        deps.config.clone(),
    );
    match deps.runner.run(&ctx).await {
        RunOutcome::Failed { error } => {
            let reason = error.to_string();
            // The error status is already written; the watchdog also clears
            // the pointer so the next launch claims a free creator instead
            // of superseding a failed fallback.
            match deps
                .registry
                .release_ownership(&creator_id, &fallback_id)
                .await
            {
                Ok(false) => {
                    tracing::debug!(run_id = %fallback_id, "pointer already moved, nothing to release");
                }
                Ok(true) => {}
                Err(error) => {
                    tracing::warn!(run_id = %fallback_id, %error, "pointer release failed");
                }
            }
            get_alert_sink()
                .raise(
                    Alert::error(Alert::FALLBACK_FAILED, "fallback run failed")
                        .with_creator(creator_id.clone())
                        .with_run(fallback_id.clone())
                        .with_context(serde_json::json!({
                            "original_run_id": run_id,
                            "reason": reason,
                        })),
                )
                .await;
            WatchdogOutcome::FallbackFailed { reason }
        }
        outcome => {
            tracing::info!(
                creator_id = %creator_id,
                fallback_run_id = %fallback_id,
                outcome = ?outcome,
                "fallback run settled"
            );
            WatchdogOutcome::Recovered { outcome }
        }
    }
}

/// Returns why the watchdog should stand down, or `None` when the claim
/// should proceed.
async fn stand_down_reason(
    registry: &PipelineRegistry,
    creator_id: &CreatorId,
    run_id: &RunId,
) -> Result<Option<WatchdogSkip>, PipelineError> {
    if registry.get_run(run_id).await?.is_some() {
        return Ok(Some(WatchdogSkip::RunStarted));
    }

    let Some(state) = registry.get_state(creator_id).await? else {
        // Nothing ever claimed the creator; the launch itself went nowhere.
        return Ok(Some(WatchdogSkip::PointerMoved));
    };
    if !state.owns(run_id) {
        return Ok(Some(WatchdogSkip::PointerMoved));
    }
    if state.status.is_terminal() {
        return Ok(Some(WatchdogSkip::AlreadySettled));
    }
    Ok(None)
}
