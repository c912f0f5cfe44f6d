//! Error taxonomy for launch, dispatch, and stage execution.
//!
//! The taxonomy separates control-flow outcomes that are expected in normal
//! operation (a run losing its ownership pointer, a creator with too little
//! content) from genuine failures, so callers can branch on them without
//! string matching.

use crate::core::{CreatorId, RunId};
use thiserror::Error;

/// The main error type for pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The run lost the ownership pointer to a newer run.
    ///
    /// This is a clean exit, not a failure: the losing run must stop
    /// writing and mark itself superseded.
    #[error("{0}")]
    Superseded(#[from] SupersededRun),

    /// The creator had too little usable content to build a knowledge base.
    #[error("{0}")]
    InsufficientContent(#[from] InsufficientContent),

    /// The content source (listing or caption fetch) failed.
    #[error("{0}")]
    Source(#[from] SourceError),

    /// An enrichment call failed and no fallback absorbed it.
    #[error("{0}")]
    Enrichment(#[from] EnrichmentError),

    /// A registry or content store operation failed.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Start-message delivery failed on every transport.
    #[error("{0}")]
    Dispatch(#[from] DispatchError),

    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An uncategorized internal error.
    #[error("internal error: {0}")]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    /// Returns true for the supersession control-flow exit.
    #[must_use]
    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded(_))
    }

    /// Returns true for the insufficient-content business exit.
    #[must_use]
    pub fn is_insufficient_content(&self) -> bool {
        matches!(self, Self::InsufficientContent(_))
    }
}

/// Raised when a run's ownership check finds the pointer moved.
#[derive(Debug, Clone, Error)]
#[error(
    "run {run_id} for creator {creator_id} was superseded (pointer now {})",
    current_owner.as_ref().map_or("released", RunId::as_str)
)]
pub struct SupersededRun {
    /// Creator whose pipeline the run was executing.
    pub creator_id: CreatorId,
    /// The run that lost ownership.
    pub run_id: RunId,
    /// What the pointer held at check time, if anything.
    pub current_owner: Option<RunId>,
}

impl SupersededRun {
    /// Creates a supersession exit for a run whose pointer check failed.
    #[must_use]
    pub fn new(creator_id: CreatorId, run_id: RunId) -> Self {
        Self {
            creator_id,
            run_id,
            current_owner: None,
        }
    }

    /// Records the run that holds the pointer now.
    #[must_use]
    pub fn with_current_owner(mut self, owner: RunId) -> Self {
        self.current_owner = Some(owner);
        self
    }
}

/// Raised when a creator has fewer usable transcripts than the pipeline needs.
#[derive(Debug, Clone, Error)]
#[error("creator {creator_id} has {found} usable transcripts, {required} required")]
pub struct InsufficientContent {
    /// Creator that was being ingested.
    pub creator_id: CreatorId,
    /// Usable transcripts found.
    pub found: usize,
    /// Minimum the pipeline requires.
    pub required: usize,
}

impl InsufficientContent {
    /// Creates an insufficient-content exit.
    #[must_use]
    pub fn new(creator_id: CreatorId, found: usize, required: usize) -> Self {
        Self {
            creator_id,
            found,
            required,
        }
    }
}

/// A content source operation failed.
#[derive(Debug, Clone, Error)]
#[error("content source {operation} failed: {message}")]
pub struct SourceError {
    /// Which source call failed, e.g. `list_content` or `fetch_captions`.
    pub operation: String,
    /// Underlying failure message.
    pub message: String,
    /// Whether retrying the same call may succeed.
    pub retryable: bool,
}

impl SourceError {
    /// Creates a non-retryable source error.
    #[must_use]
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
            retryable: false,
        }
    }

    /// Marks the error as retryable.
    #[must_use]
    pub fn with_retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

/// An enrichment task failed.
#[derive(Debug, Clone, Error)]
#[error("enrichment task {task} failed: {message}")]
pub struct EnrichmentError {
    /// Which task failed, e.g. `cluster_labels` or `voice_profile`.
    pub task: String,
    /// Underlying failure message.
    pub message: String,
}

impl EnrichmentError {
    /// Creates an enrichment error.
    #[must_use]
    pub fn new(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            message: message.into(),
        }
    }
}

/// A registry or content store operation failed.
#[derive(Debug, Clone, Error)]
#[error("store {operation} on {entity} failed: {message}")]
pub struct StoreError {
    /// Which operation failed, e.g. `insert` or `compare_and_swap`.
    pub operation: String,
    /// Which entity it targeted, e.g. `pipeline_runs`.
    pub entity: String,
    /// Underlying failure message.
    pub message: String,
}

impl StoreError {
    /// Creates a store error.
    #[must_use]
    pub fn new(
        operation: impl Into<String>,
        entity: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            entity: entity.into(),
            message: message.into(),
        }
    }
}

/// Start-message delivery errors.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// The queue transport rejected or dropped the send.
    #[error("queue send failed for event {event_id}: {message}")]
    Queue {
        /// Deterministic event id of the send.
        event_id: String,
        /// Underlying failure message.
        message: String,
    },

    /// Every fallback ingress endpoint failed.
    #[error("ingress delivery failed for event {event_id} after {endpoints_tried} endpoint(s): {message}")]
    Ingress {
        /// Deterministic event id of the send.
        event_id: String,
        /// Endpoints attempted before giving up.
        endpoints_tried: usize,
        /// Last failure message.
        message: String,
    },

    /// Both the queue and every ingress endpoint failed.
    #[error("no transport delivered event {event_id} (queue: {queue}; ingress: {ingress})")]
    AllTransportsFailed {
        /// Deterministic event id of the send.
        event_id: String,
        /// Queue failure message.
        queue: String,
        /// Ingress failure message.
        ingress: String,
    },
}

impl DispatchError {
    /// Creates a queue transport error.
    #[must_use]
    pub fn queue(event_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Queue {
            event_id: event_id.into(),
            message: message.into(),
        }
    }

    /// Creates an ingress transport error.
    #[must_use]
    pub fn ingress(
        event_id: impl Into<String>,
        endpoints_tried: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::Ingress {
            event_id: event_id.into(),
            endpoints_tried,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_superseded_display() {
        let err = SupersededRun::new(CreatorId::new("c1"), RunId::new("r1"))
            .with_current_owner(RunId::new("r2"));
        assert_eq!(
            err.to_string(),
            "run r1 for creator c1 was superseded (pointer now r2)"
        );

        let released = SupersededRun::new(CreatorId::new("c1"), RunId::new("r1"));
        assert!(released.to_string().contains("pointer now released"));
    }

    #[test]
    fn test_error_classification() {
        let superseded: PipelineError =
            SupersededRun::new(CreatorId::new("c1"), RunId::new("r1")).into();
        assert!(superseded.is_superseded());
        assert!(!superseded.is_insufficient_content());

        let thin: PipelineError = InsufficientContent::new(CreatorId::new("c1"), 2, 5).into();
        assert!(thin.is_insufficient_content());
    }

    #[test]
    fn test_insufficient_content_display() {
        let err = InsufficientContent::new(CreatorId::new("c1"), 3, 5);
        assert_eq!(err.to_string(), "creator c1 has 3 usable transcripts, 5 required");
    }

    #[test]
    fn test_source_error_retryable() {
        let err = SourceError::new("list_content", "timeout").with_retryable();
        assert!(err.retryable);
        assert!(err.to_string().contains("list_content"));
    }

    #[test]
    fn test_dispatch_error_display() {
        let err = DispatchError::AllTransportsFailed {
            event_id: "evt:1".to_string(),
            queue: "broker down".to_string(),
            ingress: "503".to_string(),
        };
        assert!(err.to_string().contains("evt:1"));
        assert!(err.to_string().contains("broker down"));
    }
}
