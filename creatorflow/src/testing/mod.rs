//! Test support shared by this crate's tests and downstream integrations.

mod fixtures;

pub use fixtures::{
    caption_about, init_test_tracing, sample_item, PipelineHarness, ScriptedEnrichment,
    ScriptedSource,
};
