//! Per-creator pipeline state: the ownership pointer and coarse status.

use crate::core::identity::{CreatorId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse pipeline progress for a creator, advanced stage by stage.
///
/// The three terminal statuses are absorbing for a given run; only a new
/// run (which resets to [`PipelineStatus::Pending`]) leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// A run has been launched but no stage has started.
    Pending,
    /// Content listing is being paged in from the source.
    Scraping,
    /// Transcripts are being fetched and normalized.
    Transcribing,
    /// Transcripts are being chunked and embedded.
    Indexing,
    /// Chunks are being grouped into topic clusters.
    Clustering,
    /// Voice profile extraction is in progress.
    Extracting,
    /// The creator's knowledge base is built and usable.
    Ready,
    /// The creator had too little usable content to proceed.
    InsufficientContent,
    /// The run stopped on an error.
    Error,
}

impl Default for PipelineStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Scraping => write!(f, "scraping"),
            Self::Transcribing => write!(f, "transcribing"),
            Self::Indexing => write!(f, "indexing"),
            Self::Clustering => write!(f, "clustering"),
            Self::Extracting => write!(f, "extracting"),
            Self::Ready => write!(f, "ready"),
            Self::InsufficientContent => write!(f, "insufficient_content"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl PipelineStatus {
    /// Returns true if the status ends a run (success or not).
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::InsufficientContent | Self::Error)
    }

    /// Returns true if a stage is actively working under this status.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            Self::Scraping | Self::Transcribing | Self::Indexing | Self::Clustering | Self::Extracting
        )
    }

    /// The stage statuses in execution order, pending first.
    #[must_use]
    pub fn sequence() -> &'static [Self] {
        &[
            Self::Pending,
            Self::Scraping,
            Self::Transcribing,
            Self::Indexing,
            Self::Clustering,
            Self::Extracting,
            Self::Ready,
        ]
    }

    /// Whether the model allows moving from `self` to `next`.
    ///
    /// This is a modelling aid for tests and debug assertions; at runtime
    /// the ownership pointer, not transition checking, serializes writers.
    #[must_use]
    pub fn can_transition(&self, next: Self) -> bool {
        if next == Self::Pending {
            // A new run may reset any state, including terminals.
            return true;
        }
        if next == Self::Error {
            return !self.is_terminal();
        }
        if next == Self::InsufficientContent {
            return matches!(self, Self::Transcribing);
        }
        let sequence = Self::sequence();
        let from = sequence.iter().position(|status| status == self);
        let to = sequence.iter().position(|status| *status == next);
        matches!((from, to), (Some(from), Some(to)) if to == from + 1)
    }
}

/// The single source of truth for which run owns a creator's pipeline.
///
/// All runner writes are conditioned on `pipeline_run_id` still pointing at
/// the writer's run; swapping the pointer is how a newer run supersedes an
/// older one without locks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatorPipelineState {
    /// Creator this state belongs to.
    pub creator_id: CreatorId,
    /// The run currently allowed to write, if any.
    pub pipeline_run_id: Option<RunId>,
    /// Coarse progress of the owning run.
    pub status: PipelineStatus,
    /// Last time any field changed.
    pub updated_at: DateTime<Utc>,
    /// Last time the creator reached [`PipelineStatus::Ready`].
    pub last_ready_at: Option<DateTime<Utc>>,
    /// Message of the most recent error terminal, if any.
    pub last_error: Option<String>,
}

impl CreatorPipelineState {
    /// Creates a fresh state with no owning run.
    #[must_use]
    pub fn new(creator_id: CreatorId) -> Self {
        Self {
            creator_id,
            pipeline_run_id: None,
            status: PipelineStatus::Pending,
            updated_at: Utc::now(),
            last_ready_at: None,
            last_error: None,
        }
    }

    /// Returns true if `run_id` currently holds the ownership pointer.
    #[must_use]
    pub fn owns(&self, run_id: &RunId) -> bool {
        self.pipeline_run_id.as_ref() == Some(run_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(PipelineStatus::Scraping.to_string(), "scraping");
        assert_eq!(
            PipelineStatus::InsufficientContent.to_string(),
            "insufficient_content"
        );
    }

    #[test]
    fn test_terminal_and_running() {
        assert!(PipelineStatus::Ready.is_terminal());
        assert!(PipelineStatus::Error.is_terminal());
        assert!(!PipelineStatus::Pending.is_terminal());
        assert!(PipelineStatus::Indexing.is_running());
        assert!(!PipelineStatus::Pending.is_running());
        assert!(!PipelineStatus::Ready.is_running());
    }

    #[test]
    fn test_forward_transitions() {
        let sequence = PipelineStatus::sequence();
        for pair in sequence.windows(2) {
            assert!(pair[0].can_transition(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(!PipelineStatus::Scraping.can_transition(PipelineStatus::Indexing));
        assert!(!PipelineStatus::Ready.can_transition(PipelineStatus::Scraping));
    }

    #[test]
    fn test_exceptional_transitions() {
        assert!(PipelineStatus::Transcribing.can_transition(PipelineStatus::InsufficientContent));
        assert!(!PipelineStatus::Scraping.can_transition(PipelineStatus::InsufficientContent));
        assert!(PipelineStatus::Extracting.can_transition(PipelineStatus::Error));
        assert!(!PipelineStatus::Ready.can_transition(PipelineStatus::Error));
        // Any state may be reset by a fresh launch.
        assert!(PipelineStatus::Error.can_transition(PipelineStatus::Pending));
        assert!(PipelineStatus::Clustering.can_transition(PipelineStatus::Pending));
    }

    #[test]
    fn test_state_ownership_check() {
        let mut state = CreatorPipelineState::new(CreatorId::new("c1"));
        let run = RunId::new("r1");
        assert!(!state.owns(&run));
        state.pipeline_run_id = Some(run.clone());
        assert!(state.owns(&run));
        assert!(!state.owns(&RunId::new("r2")));
    }
}
