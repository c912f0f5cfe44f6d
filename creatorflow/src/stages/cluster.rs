//! Cluster stage: group chunks into labeled topics.

use crate::core::{ContentChunk, PipelineStatus, TopicCluster};
use crate::errors::PipelineError;
use crate::pipeline::{PipelineStage, RunContext};
use crate::ports::{fallback, ContentStore, Enrichment};
use async_trait::async_trait;
use std::collections::HashSet;

/// Asks enrichment to cluster the creator's chunks and validates the
/// answer before trusting it; anything unusable falls back to keyword
/// clustering so the stage always produces a cluster set.
pub struct ClusterStage;

#[async_trait]
impl PipelineStage for ClusterStage {
    fn name(&self) -> &'static str {
        "cluster"
    }

    fn entry_status(&self) -> PipelineStatus {
        PipelineStatus::Clustering
    }

    async fn execute(&self, ctx: &RunContext) -> Result<(), PipelineError> {
        let config = ctx.config().cluster.clone();
        let content = ctx.ports().content.clone();
        let creator = ctx.creator_id().clone();

        let chunks = content.chunks_for_creator(&creator).await?;
        ctx.ensure_active().await?;

        if chunks.is_empty() {
            content.replace_clusters(&creator, Vec::new()).await?;
            ctx.record_progress("clusters_written", 0).await;
            return Ok(());
        }

        let max = config.max_clusters;
        let (clusters, via) = match ctx.ports().enrichment.as_ref() {
            Some(enrichment) => match enrichment.cluster_topics(&creator, &chunks, max).await {
                Ok(proposed) if clusters_usable(&proposed, &chunks, max) => (proposed, "model"),
                Ok(_) => {
                    tracing::warn!(
                        creator_id = %creator,
                        "model clusters unusable, using keyword fallback"
                    );
                    (fallback::keyword_clusters(&creator, &chunks, max), "fallback")
                }
                Err(error) => {
                    tracing::warn!(
                        creator_id = %creator,
                        %error,
                        "clustering call failed, using keyword fallback"
                    );
                    (fallback::keyword_clusters(&creator, &chunks, max), "fallback")
                }
            },
            None => (fallback::keyword_clusters(&creator, &chunks, max), "fallback"),
        };

        ctx.ensure_active().await?;
        let count = clusters.len();
        content.replace_clusters(&creator, clusters).await?;

        ctx.record_progress("clusters_written", count).await;
        ctx.record_progress("cluster_source", via).await;
        tracing::info!(creator_id = %creator, clusters = count, via, "cluster finished");
        Ok(())
    }
}

/// A model answer is usable when it stays within the cluster budget,
/// labels every cluster, and references only chunks that exist.
fn clusters_usable(clusters: &[TopicCluster], chunks: &[ContentChunk], max: usize) -> bool {
    if clusters.is_empty() || clusters.len() > max {
        return false;
    }
    let known: HashSet<&str> = chunks.iter().map(|chunk| chunk.chunk_id.as_str()).collect();
    clusters.iter().all(|cluster| {
        !cluster.label.trim().is_empty()
            && !cluster.chunk_ids.is_empty()
            && cluster
                .chunk_ids
                .iter()
                .all(|id| known.contains(id.as_str()))
    })
}
