//! Extract stage: distill the creator's voice from their strongest items.

use crate::core::{CreatorId, PipelineStatus, Transcript, VoiceProfile};
use crate::errors::PipelineError;
use crate::pipeline::{PipelineStage, RunContext};
use crate::ports::{fallback, ContentStore, Enrichment};
use async_trait::async_trait;
use std::collections::HashMap;

/// Samples the highest-engagement items that have transcripts and asks
/// enrichment for a voice profile; an unusable or failed answer falls
/// back to the keyword-assembled profile so the stage always saves one.
pub struct ExtractStage;

#[async_trait]
impl PipelineStage for ExtractStage {
    fn name(&self) -> &'static str {
        "extract"
    }

    fn entry_status(&self) -> PipelineStatus {
        PipelineStatus::Extracting
    }

    async fn execute(&self, ctx: &RunContext) -> Result<(), PipelineError> {
        let config = ctx.config().extract.clone();
        let content = ctx.ports().content.clone();
        let creator = ctx.creator_id().clone();

        let mut items = content.items_for_creator(&creator).await?;
        let transcripts = content.transcripts_for_creator(&creator).await?;
        ctx.ensure_active().await?;

        items.sort_by(|a, b| {
            b.engagement()
                .cmp(&a.engagement())
                .then_with(|| a.item_id.cmp(&b.item_id))
        });
        let by_id: HashMap<&str, &Transcript> = transcripts
            .iter()
            .map(|transcript| (transcript.item_id.as_str(), transcript))
            .collect();
        let selected: Vec<Transcript> = items
            .iter()
            .filter_map(|item| by_id.get(item.item_id.as_str()).map(|t| (*t).clone()))
            .take(config.top_items.max(1))
            .collect();
        // Transcripts always trace back to catalog items, so an empty
        // selection means no transcripts at all; keep the guard anyway.
        let sample = if selected.is_empty() { transcripts } else { selected };

        let (profile, via) = match ctx.ports().enrichment.as_ref() {
            Some(enrichment) => match enrichment.extract_voice(&creator, &sample).await {
                Ok(profile) if profile_usable(&profile, &creator) => (profile, "model"),
                Ok(_) => {
                    tracing::warn!(
                        creator_id = %creator,
                        "model voice profile unusable, using keyword fallback"
                    );
                    (fallback::default_voice_profile(&creator, &sample), "fallback")
                }
                Err(error) => {
                    tracing::warn!(
                        creator_id = %creator,
                        %error,
                        "voice extraction failed, using keyword fallback"
                    );
                    (fallback::default_voice_profile(&creator, &sample), "fallback")
                }
            },
            None => (fallback::default_voice_profile(&creator, &sample), "fallback"),
        };

        ctx.ensure_active().await?;
        content.save_voice_profile(profile).await?;

        ctx.record_progress("voice_source", via).await;
        ctx.record_progress("voice_sample_items", sample.len()).await;
        tracing::info!(
            creator_id = %creator,
            sampled = sample.len(),
            via,
            "extract finished"
        );
        Ok(())
    }
}

/// A model profile is usable when it names the right creator and carries
/// a non-blank summary and tone.
fn profile_usable(profile: &VoiceProfile, creator: &CreatorId) -> bool {
    profile.creator_id == *creator
        && !profile.summary.trim().is_empty()
        && !profile.tone.trim().is_empty()
}
