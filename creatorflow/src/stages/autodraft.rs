//! Auto-draft stage: seed a product draft from the strongest topics.

use crate::core::{DraftProduct, PipelineStatus};
use crate::errors::PipelineError;
use crate::pipeline::{PipelineStage, RunContext};
use crate::ports::ContentStore;
use async_trait::async_trait;
use chrono::Utc;

/// Assembles a draft product outline from the largest topic clusters and
/// creates it at most once per creator. An existing draft is never
/// touched; creators edit drafts, and a re-run must not clobber that.
pub struct AutoDraftStage;

#[async_trait]
impl PipelineStage for AutoDraftStage {
    fn name(&self) -> &'static str {
        "autodraft"
    }

    // Drafting shares the extracting status; creators see one working
    // phase between clustering and ready.
    fn entry_status(&self) -> PipelineStatus {
        PipelineStatus::Extracting
    }

    async fn execute(&self, ctx: &RunContext) -> Result<(), PipelineError> {
        let config = ctx.config().autodraft.clone();
        let content = ctx.ports().content.clone();
        let creator = ctx.creator_id().clone();

        let mut clusters = content.clusters_for_creator(&creator).await?;
        let voice = content.voice_profile(&creator).await?;
        ctx.ensure_active().await?;

        clusters.sort_by(|a, b| b.size().cmp(&a.size()).then_with(|| a.label.cmp(&b.label)));
        let outline: Vec<String> = clusters
            .iter()
            .take(config.max_outline_sections.max(1))
            .map(|cluster| cluster.label.clone())
            .collect();

        let title = match (
            voice.as_ref().and_then(|profile| profile.themes.first()),
            clusters.first(),
        ) {
            (Some(theme), _) => format!("{theme} essentials"),
            (None, Some(top)) => format!("{} essentials", top.label),
            (None, None) => "Creator essentials".to_string(),
        };

        let product = DraftProduct {
            product_id: format!("draft:{creator}"),
            creator_id: creator.clone(),
            title,
            outline,
            created_by_run: ctx.run_id().clone(),
            created_at: Utc::now(),
        };
        let created = content.create_product_if_absent(product).await?;

        ctx.record_progress("draft_created", created).await;
        if created {
            tracing::info!(creator_id = %creator, run_id = %ctx.run_id(), "draft product created");
        } else {
            tracing::debug!(creator_id = %creator, "draft product already exists, left untouched");
        }
        Ok(())
    }
}
