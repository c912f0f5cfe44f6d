//! # Creatorflow
//!
//! A run-reliability layer for creator content pipelines.
//!
//! Creatorflow takes a creator from onboarding to a ready draft product
//! through a seven-stage ingestion sequence, and makes the whole journey
//! safe to retry, race, and re-run:
//!
//! - **Effectively-once launch**: a compare-and-swap ownership pointer
//!   serializes runners per creator, so concurrent launches cannot interleave
//! - **Two-transport dispatch**: start messages go to the queue first and
//!   fall back to HTTP ingress endpoints, with best-effort delivery
//!   verification
//! - **Watchdog recovery**: a start that never executes is claimed and
//!   re-run in-process after a grace window
//! - **Supersession**: a newer launch displaces a stale run cleanly; the
//!   displaced run notices at its next stage boundary and exits
//! - **Idempotent stages**: every stage converges on re-run instead of
//!   duplicating, so recovery is always a plain re-launch
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use creatorflow::prelude::*;
//!
//! // Wire the launcher over a registry, a start queue, and the stage ports.
//! let registry = PipelineRegistry::new(Arc::new(InMemoryRegistryStore::new()));
//! let queue = Arc::new(LocalStartQueue::new());
//! let launcher = PipelineLauncher::new(registry, queue.clone(), ports, PipelineConfig::default());
//!
//! // Launch: claim the creator, dispatch the start, arm the watchdog.
//! let ticket = launcher
//!     .launch(LaunchRequest::new(CreatorId::new("creator-1"), "sourdough_sam"))
//!     .await?;
//!
//! // A queue consumer picks the message up and drives the run.
//! let message = queue.sent().remove(0);
//! let outcome = launcher.run_from_queue(&message).await;
//! assert!(outcome.is_ready());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod dispatch;
pub mod errors;
pub mod events;
pub mod pipeline;
pub mod ports;
pub mod registry;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{DispatchConfig, PipelineConfig, WatchdogConfig};
    pub use crate::core::{
        CreatorId, CreatorPipelineState, PipelineRun, PipelineStatus, RunDescriptor, RunId,
        RunStatus, RunTrigger,
    };
    pub use crate::dispatch::{
        LaunchRequest, LaunchTicket, LocalStartQueue, PipelineLauncher, StartMessage, StartQueue,
        WatchdogOutcome,
    };
    pub use crate::errors::{DispatchError, PipelineError};
    pub use crate::events::{set_alert_sink, Alert, AlertSink, TracingAlertSink};
    pub use crate::pipeline::{PipelineStage, RunContext, RunOutcome, StageRunner};
    pub use crate::ports::{
        ContentSource, ContentStore, Enrichment, InMemoryContentStore, PipelinePorts,
        ReadyNotifier,
    };
    pub use crate::registry::{InMemoryRegistryStore, PipelineRegistry, RegistryStore};
    pub use crate::stages::{standard_pipeline, standard_stages};
}
