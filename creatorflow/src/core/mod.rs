//! Core domain types: identifiers, run records, creator state, and content.

mod content;
mod identity;
mod run;
mod state;

pub use content::{
    ContentChunk, ContentItem, DraftProduct, TopicCluster, Transcript, TranscriptSource,
    VoiceProfile,
};
pub use identity::{CreatorId, RunId, FALLBACK_RUN_PREFIX};
pub use run::{PipelineRun, RunDescriptor, RunMetrics, RunStatus, RunTrigger};
pub use state::{CreatorPipelineState, PipelineStatus};
