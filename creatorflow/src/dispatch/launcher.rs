//! The launch path: win the pointer, send the start, arm the watchdog.
//!
//! Launching is effectively-once by construction, not by transport
//! guarantees. The pointer swap happens before any message moves, so a
//! duplicate or racing launch settles on the registry's compare-and-swap;
//! the message may then be delivered zero, one, or many times and the
//! creator still ends up with exactly one writing run.

use super::dispatcher::{DispatchReceipt, RunDispatcher};
use super::queue::{StartMessage, StartQueue};
use super::watchdog::{DispatchWatchdog, WatchdogDeps, WatchdogHandle};
use crate::config::PipelineConfig;
use crate::core::{CreatorId, RunId, RunTrigger};
use crate::errors::PipelineError;
use crate::pipeline::{RunContext, RunOutcome, StageRunner};
use crate::ports::PipelinePorts;
use crate::registry::PipelineRegistry;
use std::sync::Arc;

/// One request to (re)start a creator's pipeline.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// Creator to ingest.
    pub creator_id: CreatorId,
    /// Platform username the consumer's scraper works under.
    pub handle: String,
    /// What prompted the launch.
    pub trigger: RunTrigger,
    /// Caller-chosen run id; generated when absent.
    pub run_id: Option<RunId>,
    /// The failed run this launch replays, for dead-letter replays.
    pub replay_of: Option<RunId>,
}

impl LaunchRequest {
    /// Creates an onboarding launch request.
    #[must_use]
    pub fn new(creator_id: CreatorId, handle: impl Into<String>) -> Self {
        Self {
            creator_id,
            handle: handle.into(),
            trigger: RunTrigger::Onboarding,
            run_id: None,
            replay_of: None,
        }
    }

    /// Sets the trigger.
    #[must_use]
    pub fn with_trigger(mut self, trigger: RunTrigger) -> Self {
        self.trigger = trigger;
        self
    }

    /// Pins the run id instead of generating one.
    #[must_use]
    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Links the launch to the failed run it replays.
    #[must_use]
    pub fn with_replay_of(mut self, run_id: RunId) -> Self {
        self.replay_of = Some(run_id);
        self
    }
}

/// What a launch produced.
#[derive(Debug)]
pub struct LaunchTicket {
    /// The launched run.
    pub run_id: RunId,
    /// Deterministic id of the logical start.
    pub event_id: String,
    /// Delivery receipt; absent when every transport failed and the armed
    /// watchdog alone will drive the run.
    pub receipt: Option<DispatchReceipt>,
    /// The armed fallback watchdog.
    pub watchdog: WatchdogHandle,
}

/// Launches pipeline runs and executes delivered starts.
pub struct PipelineLauncher {
    registry: PipelineRegistry,
    dispatcher: RunDispatcher,
    ports: PipelinePorts,
    config: PipelineConfig,
    runner: Arc<StageRunner>,
}

impl PipelineLauncher {
    /// Creates a launcher over a queue and the standard stage sequence.
    #[must_use]
    pub fn new(
        registry: PipelineRegistry,
        queue: Arc<dyn StartQueue>,
        ports: PipelinePorts,
        config: PipelineConfig,
    ) -> Self {
        let runner = Arc::new(crate::stages::standard_pipeline());
        Self::with_runner(registry, queue, ports, config, runner)
    }

    /// Creates a launcher with an explicit stage sequence.
    #[must_use]
    pub fn with_runner(
        registry: PipelineRegistry,
        queue: Arc<dyn StartQueue>,
        ports: PipelinePorts,
        config: PipelineConfig,
        runner: Arc<StageRunner>,
    ) -> Self {
        let dispatcher = RunDispatcher::new(queue, config.dispatch.clone());
        Self {
            registry,
            dispatcher,
            ports,
            config,
            runner,
        }
    }

    /// Launches a run: wins the pointer, marks the displaced owner
    /// superseded, dispatches the start, and arms the watchdog.
    ///
    /// Dispatch failing on every transport does not fail the launch; the
    /// pointer is already won and the watchdog will execute the run
    /// in-process after the grace window.
    pub async fn launch(&self, request: LaunchRequest) -> Result<LaunchTicket, PipelineError> {
        let run_id = request.run_id.clone().unwrap_or_else(RunId::generate);

        let previous = self
            .registry
            .take_ownership(&request.creator_id, &run_id)
            .await?;
        if let Some(previous_run) = previous {
            self.registry
                .mark_superseded(&previous_run, Some(&run_id))
                .await?;
        }

        let mut message = StartMessage::new(
            request.creator_id.clone(),
            request.handle.clone(),
            run_id.clone(),
            request.trigger,
        );
        if let Some(replay_of) = &request.replay_of {
            message = message.with_replay_of(replay_of.clone());
        }

        let receipt = match self.dispatcher.send(&message).await {
            Ok(receipt) => Some(receipt),
            Err(error) => {
                tracing::error!(
                    creator_id = %request.creator_id,
                    run_id = %run_id,
                    %error,
                    "start undeliverable on every transport, watchdog will run it in-process"
                );
                None
            }
        };

        let watchdog = DispatchWatchdog::new(self.watchdog_deps()).watch(
            request.creator_id.clone(),
            run_id.clone(),
            Some(message.event_id.clone()),
        );

        tracing::info!(
            creator_id = %request.creator_id,
            run_id = %run_id,
            event_id = %message.event_id,
            trigger = %request.trigger,
            delivered = receipt.is_some(),
            "run launched"
        );
        Ok(LaunchTicket {
            run_id,
            event_id: message.event_id,
            receipt,
            watchdog,
        })
    }

    /// Executes a delivered start message in-process, the way a queue
    /// consumer does: build the descriptor, begin the record, drive the
    /// stage sequence.
    pub async fn run_from_queue(&self, message: &StartMessage) -> RunOutcome {
        let ctx = RunContext::new(
            message.to_descriptor(),
            self.registry.clone(),
            self.ports.clone(),
            self.config.clone(),
        );
        self.runner.run(&ctx).await
    }

    fn watchdog_deps(&self) -> WatchdogDeps {
        WatchdogDeps {
            registry: self.registry.clone(),
            ports: self.ports.clone(),
            config: self.config.clone(),
            runner: self.runner.clone(),
        }
    }
}

impl std::fmt::Debug for PipelineLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineLauncher")
            .field("stages", &self.runner.stage_names())
            .finish_non_exhaustive()
    }
}
