//! Transcribe stage: fetch captions in batches and normalize them.

use crate::core::{ContentItem, PipelineStatus, Transcript, TranscriptSource};
use crate::errors::{InsufficientContent, PipelineError, SourceError};
use crate::pipeline::{run_batched, with_retry, PipelineStage, RetryConfig, RunContext};
use crate::ports::{ContentSource, ContentStore};
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;

/// Fetches caption text for every scraped item, normalizes it, and stores
/// it as a transcript. When captions are missing or too short the item's
/// description (then title) stands in, so a caption-poor catalog can still
/// reach the transcript floor; failed fetches are skipped per item. The
/// stage only exits early when the creator ends up below the floor.
pub struct TranscribeStage;

#[async_trait]
impl PipelineStage for TranscribeStage {
    fn name(&self) -> &'static str {
        "transcribe"
    }

    fn entry_status(&self) -> PipelineStatus {
        PipelineStatus::Transcribing
    }

    async fn execute(&self, ctx: &RunContext) -> Result<(), PipelineError> {
        let config = ctx.config().transcribe.clone();
        let source = ctx.ports().source.clone();
        let content = ctx.ports().content.clone();
        let creator = ctx.creator_id().clone();

        let cues = Regex::new(r"\[[^\]]*\]").map_err(anyhow::Error::from)?;
        let tags = Regex::new(r"<[^>]+>").map_err(anyhow::Error::from)?;
        let spaces = Regex::new(r"\s+").map_err(anyhow::Error::from)?;

        // Every item gets an attempt; the listing's caption flag is a hint,
        // not a promise, and a longer caption can only improve what the
        // store already holds.
        let items = content.items_for_creator(&creator).await?;
        ctx.ensure_active().await?;

        let retry = RetryConfig::new().with_max_attempts(config.fetch_attempts);
        let timeout = Duration::from_millis(config.fetch_timeout_ms);

        let outcomes = run_batched(
            items,
            config.batch_size,
            Duration::from_millis(config.batch_delay_ms),
            |item| {
                let source = Arc::clone(&source);
                let creator = creator.clone();
                let retry = retry.clone();
                let item_id = item.item_id.clone();
                async move {
                    let result = with_retry(&retry, "fetch_captions", || {
                        let source = Arc::clone(&source);
                        let creator = creator.clone();
                        let item_id = item_id.clone();
                        async move {
                            match tokio::time::timeout(
                                timeout,
                                source.fetch_captions(&creator, &item_id),
                            )
                            .await
                            {
                                Ok(result) => result,
                                Err(_) => Err(SourceError::new("fetch_captions", "timed out")
                                    .with_retryable()),
                            }
                        }
                    })
                    .await;
                    (item, result)
                }
            },
        )
        .await;

        ctx.ensure_active().await?;

        let mut stored = 0usize;
        let mut fallbacks = 0usize;
        let mut missing = 0usize;
        let mut too_short = 0usize;
        let mut failed = 0usize;
        for (item, result) in outcomes {
            let caption = match result {
                Ok(caption) => caption,
                Err(error) => {
                    tracing::warn!(
                        creator_id = %creator,
                        item_id = %item.item_id,
                        %error,
                        "caption fetch failed, skipping item"
                    );
                    failed += 1;
                    continue;
                }
            };

            let normalized = match caption {
                Some(raw) => {
                    let text = normalize_caption(&raw, &cues, &tags, &spaces);
                    if text.len() >= config.min_caption_len {
                        Some(text)
                    } else {
                        too_short += 1;
                        None
                    }
                }
                None => {
                    missing += 1;
                    None
                }
            };

            let (text, source) = match normalized {
                Some(text) => (text, TranscriptSource::Captions),
                None => match fallback_text(&item, &spaces, config.min_caption_len) {
                    Some(substitute) => substitute,
                    None => continue,
                },
            };

            content
                .upsert_transcript(
                    Transcript::new(item.item_id, creator.clone(), text).with_source(source),
                )
                .await?;
            match source {
                TranscriptSource::Captions => stored += 1,
                TranscriptSource::Description | TranscriptSource::Title => fallbacks += 1,
            }
        }

        ctx.record_progress("transcripts_stored", stored).await;
        ctx.record_progress("caption_fallbacks", fallbacks).await;
        ctx.record_progress("captions_missing", missing).await;
        ctx.record_progress("captions_too_short", too_short).await;
        ctx.record_progress("caption_fetch_failures", failed).await;

        let total = content.transcripts_for_creator(&creator).await?.len();
        if total < config.min_transcripts {
            return Err(
                InsufficientContent::new(creator, total, config.min_transcripts).into(),
            );
        }

        ctx.record_progress("transcripts_total", total).await;
        tracing::info!(
            creator_id = %creator,
            stored,
            fallbacks,
            missing,
            failed,
            total,
            "transcribe finished"
        );
        Ok(())
    }
}

/// Strips cue markers like `[Music]`, markup tags, and runs of whitespace.
fn normalize_caption(raw: &str, cues: &Regex, tags: &Regex, spaces: &Regex) -> String {
    let text = cues.replace_all(raw, " ");
    let text = tags.replace_all(&text, " ");
    let text = spaces.replace_all(&text, " ");
    text.trim().to_string()
}

/// Substitute text for an item whose captions are unusable: the description
/// when it clears the caption floor, the title otherwise. Returns `None`
/// when neither does.
fn fallback_text(
    item: &ContentItem,
    spaces: &Regex,
    min_len: usize,
) -> Option<(String, TranscriptSource)> {
    if let Some(description) = &item.description {
        let text = spaces.replace_all(description.trim(), " ").to_string();
        if text.len() >= min_len {
            return Some((text, TranscriptSource::Description));
        }
    }
    let title = spaces.replace_all(item.title.trim(), " ").to_string();
    if title.len() >= min_len {
        return Some((title, TranscriptSource::Title));
    }
    None
}
