//! Scrape stage: page the creator's catalog into the content store.

use crate::core::PipelineStatus;
use crate::errors::PipelineError;
use crate::pipeline::{ContinuationPolicy, PipelineStage, RunContext};
use crate::ports::{ContentSource, ContentStore};
use async_trait::async_trait;

/// Pages the creator's content listing until a stop rule trips, upserting
/// every page as it lands. Items upsert by id, so replayed and superseded
/// runs converge on one catalog row per item.
pub struct ScrapeStage;

#[async_trait]
impl PipelineStage for ScrapeStage {
    fn name(&self) -> &'static str {
        "scrape"
    }

    fn entry_status(&self) -> PipelineStatus {
        PipelineStatus::Scraping
    }

    async fn execute(&self, ctx: &RunContext) -> Result<(), PipelineError> {
        let config = ctx.config().scrape.clone();
        let source = ctx.ports().source.clone();
        let content = ctx.ports().content.clone();

        let mut policy = ContinuationPolicy::new(config.clone());
        let mut cursor: Option<String> = None;

        let stop = loop {
            ctx.ensure_active().await?;

            let page = source
                .list_content(ctx.creator_id(), cursor.as_deref(), config.page_size)
                .await?;
            let new_items = content.upsert_items(&page.items).await?;

            let stop = policy.observe_page(&page, new_items, cursor.as_deref());
            ctx.record_progress("items_discovered", policy.items_collected())
                .await;
            if let Some(reason) = stop {
                break reason;
            }
            cursor.clone_from(&page.next_cursor);
        };

        ctx.record_progress("pages_fetched", policy.pages_fetched()).await;
        ctx.record_progress("scrape_stop_reason", stop.to_string()).await;
        tracing::info!(
            creator_id = %ctx.creator_id(),
            pages = policy.pages_fetched(),
            items = policy.items_collected(),
            %stop,
            "scrape finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PipelineConfig, ScrapeConfig};
    use crate::core::{CreatorId, RunDescriptor, RunId};
    use crate::ports::ContentPage;
    use crate::testing::{sample_item, PipelineHarness};

    fn owned_context(harness: &PipelineHarness) -> crate::pipeline::RunContext {
        harness.context(RunDescriptor::new(RunId::new("r1"), CreatorId::new("c1")))
    }

    async fn begin(harness: &PipelineHarness) {
        harness
            .begin_owned(&RunDescriptor::new(RunId::new("r1"), CreatorId::new("c1")))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_pages_until_source_exhausted() {
        let harness = PipelineHarness::new();
        begin(&harness).await;
        let creator = CreatorId::new("c1");

        harness.source.push_page(ContentPage::more(
            vec![sample_item(&creator, "v1", 100), sample_item(&creator, "v2", 50)],
            "c-2",
        ));
        harness
            .source
            .push_page(ContentPage::last(vec![sample_item(&creator, "v3", 10)]));

        let ctx = owned_context(&harness);
        ScrapeStage.execute(&ctx).await.unwrap();

        assert_eq!(harness.source.list_calls(), 2);
        assert_eq!(harness.content.item_count(&creator), 3);

        let metrics = ctx.metrics_snapshot();
        assert_eq!(metrics.get("pages_fetched"), Some(&serde_json::Value::from(2)));
        assert_eq!(
            metrics.get("scrape_stop_reason"),
            Some(&serde_json::Value::from("source_exhausted"))
        );
    }

    #[tokio::test]
    async fn test_duplicate_items_do_not_double_store() {
        let harness = PipelineHarness::new();
        begin(&harness).await;
        let creator = CreatorId::new("c1");

        harness.source.push_page(ContentPage::more(
            vec![sample_item(&creator, "v1", 100)],
            "c-2",
        ));
        // The same item again on the final page.
        harness
            .source
            .push_page(ContentPage::last(vec![sample_item(&creator, "v1", 100)]));

        let ctx = owned_context(&harness);
        ScrapeStage.execute(&ctx).await.unwrap();

        assert_eq!(harness.content.item_count(&creator), 1);
        let metrics = ctx.metrics_snapshot();
        assert_eq!(metrics.get("items_discovered"), Some(&serde_json::Value::from(1)));
    }

    #[tokio::test]
    async fn test_item_cap_stops_paging() {
        let harness = PipelineHarness::new().with_config(
            PipelineConfig::default()
                .with_scrape(ScrapeConfig::default().with_max_items(2)),
        );
        begin(&harness).await;
        let creator = CreatorId::new("c1");

        harness.source.push_page(ContentPage::more(
            vec![sample_item(&creator, "v1", 1), sample_item(&creator, "v2", 1)],
            "c-2",
        ));
        harness
            .source
            .push_page(ContentPage::more(vec![sample_item(&creator, "v3", 1)], "c-3"));

        let ctx = owned_context(&harness);
        ScrapeStage.execute(&ctx).await.unwrap();

        // The second page was never requested.
        assert_eq!(harness.source.list_calls(), 1);
        assert_eq!(
            ctx.metrics_snapshot().get("scrape_stop_reason"),
            Some(&serde_json::Value::from("item_cap"))
        );
    }

    #[tokio::test]
    async fn test_listing_failure_propagates() {
        let harness = PipelineHarness::new();
        begin(&harness).await;

        harness
            .source
            .push_list_error(crate::errors::SourceError::new("list_content", "rate limited"));

        let ctx = owned_context(&harness);
        let error = ScrapeStage.execute(&ctx).await.unwrap_err();
        assert!(error.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_superseded_creator_stops_scrape() {
        let harness = PipelineHarness::new();
        begin(&harness).await;

        // A competing launch takes the pointer before the loop starts.
        harness
            .registry
            .take_ownership(&CreatorId::new("c1"), &RunId::new("r2"))
            .await
            .unwrap();

        let ctx = owned_context(&harness);
        let error = ScrapeStage.execute(&ctx).await.unwrap_err();
        assert!(error.is_superseded());
        assert_eq!(harness.source.list_calls(), 0);
    }
}
