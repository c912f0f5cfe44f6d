//! Index stage: chunk transcripts and embed the chunks.

use crate::core::{ContentChunk, PipelineStatus};
use crate::errors::PipelineError;
use crate::pipeline::{run_batched, PipelineStage, RunContext};
use crate::ports::ContentStore;
use async_trait::async_trait;
use std::time::Duration;

/// Cuts each transcript into chunks near the target size, embeds every
/// chunk, and replaces the item's chunk set in one write. Replacing per
/// item keeps re-runs idempotent whatever an earlier run left behind.
pub struct IndexStage;

#[async_trait]
impl PipelineStage for IndexStage {
    fn name(&self) -> &'static str {
        "index"
    }

    fn entry_status(&self) -> PipelineStatus {
        PipelineStatus::Indexing
    }

    async fn execute(&self, ctx: &RunContext) -> Result<(), PipelineError> {
        let config = ctx.config().index.clone();
        let content = ctx.ports().content.clone();
        let creator = ctx.creator_id().clone();

        let transcripts = content.transcripts_for_creator(&creator).await?;
        ctx.ensure_active().await?;

        let target = config.chunk_target_chars.max(1);
        let dim = config.embedding_dim.max(1);

        let chunk_sets = run_batched(
            transcripts,
            config.batch_size,
            Duration::from_millis(config.batch_delay_ms),
            |transcript| async move {
                let pieces = chunk_text(&transcript.text, target);
                let mut chunks = Vec::with_capacity(pieces.len());
                for (ordinal, text) in pieces.into_iter().enumerate() {
                    let mut chunk = ContentChunk::new(
                        transcript.item_id.clone(),
                        transcript.creator_id.clone(),
                        u32::try_from(ordinal).unwrap_or(u32::MAX),
                        text,
                    );
                    chunk.embedding = embed(&chunk.text, dim);
                    chunks.push(chunk);
                }
                (transcript.item_id, chunks)
            },
        )
        .await;

        let mut total = 0usize;
        for (item_id, chunks) in chunk_sets {
            ctx.ensure_active().await?;
            total += chunks.len();
            content.replace_chunks(&creator, &item_id, chunks).await?;
        }

        ctx.record_progress("chunks_indexed", total).await;
        tracing::info!(creator_id = %creator, chunks = total, dim, "index finished");
        Ok(())
    }
}

/// Splits text into chunks near `target` characters, breaking only at
/// sentence ends. A single sentence longer than the target becomes its
/// own oversized chunk rather than being cut mid-thought.
fn chunk_text(text: &str, target: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for sentence in text.split_inclusive(['.', '!', '?']) {
        if !current.is_empty() && current.len() + sentence.len() > target {
            let done = std::mem::take(&mut current);
            let done = done.trim();
            if !done.is_empty() {
                chunks.push(done.to_string());
            }
        }
        current.push_str(sentence);
    }
    let last = current.trim();
    if !last.is_empty() {
        chunks.push(last.to_string());
    }
    chunks
}

/// Hashed bag-of-words embedding, L2-normalized.
///
/// Purely lexical and fully deterministic: the same text always lands on
/// the same vector, with no model in the loop.
fn embed(text: &str, dim: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dim];
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if word.len() < 2 {
            continue;
        }
        let slot = (fnv1a(word.to_lowercase().as_bytes()) % dim as u64) as usize;
        vector[slot] += 1.0;
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}
