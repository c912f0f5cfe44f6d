//! Run execution: stage sequencing, paging policy, batching, and retry.

mod batch;
mod continuation;
mod retry;
mod runner;

#[cfg(test)]
mod runner_tests;

pub use batch::run_batched;
pub use continuation::{ContinuationPolicy, StopReason};
pub use retry::{with_retry, BackoffStrategy, JitterStrategy, RetryConfig};
pub use runner::{PipelineStage, RunContext, RunOutcome, StageRunner};
