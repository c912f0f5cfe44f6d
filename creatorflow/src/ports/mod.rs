//! Injected capabilities for stages: source, enrichment, storage, and
//! notification.
//!
//! Stages never talk to a platform API or a model directly; they receive
//! these ports and the run context, which is what makes every stage
//! testable with scripted collaborators.

mod content_store;
mod enrichment;
mod notify;
mod source;

pub use content_store::{ContentStore, InMemoryContentStore};
pub use enrichment::{fallback, Enrichment};
#[cfg(test)]
pub use notify::MockReadyNotifier;
pub use notify::{LoggingNotifier, NoOpNotifier, ReadyNotifier};
pub use source::{ContentPage, ContentSource};

use std::sync::Arc;

/// The capability bundle handed to every stage.
#[derive(Clone)]
pub struct PipelinePorts {
    /// Platform the creator's content lives on.
    pub source: Arc<dyn ContentSource>,
    /// Model-backed enrichment; stages fall back to deterministic local
    /// output when this is absent or failing.
    pub enrichment: Option<Arc<dyn Enrichment>>,
    /// Where stage outputs are persisted.
    pub content: Arc<dyn ContentStore>,
    /// Hook fired when a creator reaches ready.
    pub notifier: Arc<dyn ReadyNotifier>,
}

impl std::fmt::Debug for PipelinePorts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelinePorts")
            .field("has_enrichment", &self.enrichment.is_some())
            .finish()
    }
}

impl PipelinePorts {
    /// Creates ports with no enrichment and a no-op notifier.
    pub fn new(source: Arc<dyn ContentSource>, content: Arc<dyn ContentStore>) -> Self {
        Self {
            source,
            enrichment: None,
            content,
            notifier: Arc::new(NoOpNotifier),
        }
    }

    /// Sets the enrichment port.
    #[must_use]
    pub fn with_enrichment(mut self, enrichment: Arc<dyn Enrichment>) -> Self {
        self.enrichment = Some(enrichment);
        self
    }

    /// Sets the ready notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn ReadyNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Returns true if an enrichment port is configured.
    #[must_use]
    pub fn has_enrichment(&self) -> bool {
        self.enrichment.is_some()
    }
}
