//! The seven-stage ingestion sequence.
//!
//! Each stage reads what earlier stages persisted and writes its own
//! outputs, so a re-run converges instead of duplicating: items upsert by
//! id, transcripts keep the longer text, chunks and clusters replace
//! wholesale, and the draft product creates at most once per creator.

mod autodraft;
mod cluster;
mod extract;
mod index;
mod ready;
mod scrape;
mod transcribe;

pub use autodraft::AutoDraftStage;
pub use cluster::ClusterStage;
pub use extract::ExtractStage;
pub use index::IndexStage;
pub use ready::MarkReadyStage;
pub use scrape::ScrapeStage;
pub use transcribe::TranscribeStage;

use crate::pipeline::{PipelineStage, StageRunner};
use std::sync::Arc;

/// The production stage sequence in execution order.
#[must_use]
pub fn standard_stages() -> Vec<Arc<dyn PipelineStage>> {
    vec![
        Arc::new(ScrapeStage),
        Arc::new(TranscribeStage),
        Arc::new(IndexStage),
        Arc::new(ClusterStage),
        Arc::new(ExtractStage),
        Arc::new(AutoDraftStage),
        Arc::new(MarkReadyStage),
    ]
}

/// A runner over the production sequence.
#[must_use]
pub fn standard_pipeline() -> StageRunner {
    StageRunner::new(standard_stages())
}
