//! Configuration for dispatch, the watchdog, and every pipeline stage.
//!
//! All operational constants live here so deployments can tune them without
//! code changes; the defaults are the values the pipeline ships with.

use crate::errors::PipelineError;
use serde::{Deserialize, Serialize};

/// Start-message delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Fallback ingress endpoints, tried in order when the queue fails.
    pub ingress_endpoints: Vec<String>,
    /// Delivery attempts per ingress endpoint.
    pub attempts_per_endpoint: usize,
    /// Base delay between ingress retries in milliseconds (linear backoff).
    pub retry_base_delay_ms: u64,
    /// Per-request timeout for ingress calls in milliseconds.
    pub request_timeout_ms: u64,
    /// Polls of the queue's delivery records before verification gives up.
    pub verify_attempts: usize,
    /// Delay between verification polls in milliseconds.
    pub verify_interval_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            ingress_endpoints: Vec::new(),
            attempts_per_endpoint: 2,
            retry_base_delay_ms: 250,
            request_timeout_ms: 10_000,
            verify_attempts: 3,
            verify_interval_ms: 2_000,
        }
    }
}

impl DispatchConfig {
    /// Creates the default dispatch config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the ordered fallback ingress endpoints.
    #[must_use]
    pub fn with_ingress_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.ingress_endpoints = endpoints;
        self
    }

    /// Sets delivery attempts per ingress endpoint.
    #[must_use]
    pub fn with_attempts_per_endpoint(mut self, attempts: usize) -> Self {
        self.attempts_per_endpoint = attempts;
        self
    }

    /// Sets the base ingress retry delay.
    #[must_use]
    pub fn with_retry_base_delay_ms(mut self, delay: u64) -> Self {
        self.retry_base_delay_ms = delay;
        self
    }

    /// Sets the per-request ingress timeout.
    #[must_use]
    pub fn with_request_timeout_ms(mut self, timeout: u64) -> Self {
        self.request_timeout_ms = timeout;
        self
    }

    /// Sets how many times delivery verification polls.
    #[must_use]
    pub fn with_verify_attempts(mut self, attempts: usize) -> Self {
        self.verify_attempts = attempts;
        self
    }

    /// Sets the delay between verification polls.
    #[must_use]
    pub fn with_verify_interval_ms(mut self, interval: u64) -> Self {
        self.verify_interval_ms = interval;
        self
    }
}

/// Dispatch watchdog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// How long the watchdog sleeps before checking whether the run started,
    /// in milliseconds. Long enough for normal queue latency plus one
    /// consumer retry cycle.
    pub grace_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self { grace_ms: 45_000 }
    }
}

impl WatchdogConfig {
    /// Creates the default watchdog config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the grace window.
    #[must_use]
    pub fn with_grace_ms(mut self, grace: u64) -> Self {
        self.grace_ms = grace;
        self
    }
}

/// Scrape stage settings: how much content listing to pull and when to stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Items requested per listing page.
    pub page_size: u32,
    /// Hard cap on pages fetched in one run.
    pub max_pages: u32,
    /// Hard cap on items collected in one run.
    pub max_items: usize,
    /// Wall-clock budget for the whole scrape in milliseconds.
    pub time_budget_ms: u64,
    /// Consecutive pages yielding no new items before the scrape stops.
    pub max_stale_pages: u32,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            max_pages: 20,
            max_items: 500,
            time_budget_ms: 120_000,
            max_stale_pages: 2,
        }
    }
}

impl ScrapeConfig {
    /// Creates the default scrape config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the listing page size.
    #[must_use]
    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    /// Sets the page cap.
    #[must_use]
    pub fn with_max_pages(mut self, pages: u32) -> Self {
        self.max_pages = pages;
        self
    }

    /// Sets the item cap.
    #[must_use]
    pub fn with_max_items(mut self, items: usize) -> Self {
        self.max_items = items;
        self
    }

    /// Sets the scrape time budget.
    #[must_use]
    pub fn with_time_budget_ms(mut self, budget: u64) -> Self {
        self.time_budget_ms = budget;
        self
    }

    /// Sets the diminishing-returns threshold.
    #[must_use]
    pub fn with_max_stale_pages(mut self, pages: u32) -> Self {
        self.max_stale_pages = pages;
        self
    }
}

/// Transcribe stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscribeConfig {
    /// Items transcribed concurrently per batch.
    pub batch_size: usize,
    /// Pause between batches in milliseconds, to stay under source rate limits.
    pub batch_delay_ms: u64,
    /// Attempts per caption fetch.
    pub fetch_attempts: usize,
    /// Per-fetch timeout in milliseconds.
    pub fetch_timeout_ms: u64,
    /// Minimum normalized transcript length in characters to count as usable.
    pub min_caption_len: usize,
    /// Minimum usable transcripts for the pipeline to continue.
    pub min_transcripts: usize,
}

impl Default for TranscribeConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            batch_delay_ms: 500,
            fetch_attempts: 2,
            fetch_timeout_ms: 15_000,
            min_caption_len: 40,
            min_transcripts: 5,
        }
    }
}

impl TranscribeConfig {
    /// Creates the default transcribe config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the concurrent batch size.
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the inter-batch pause.
    #[must_use]
    pub fn with_batch_delay_ms(mut self, delay: u64) -> Self {
        self.batch_delay_ms = delay;
        self
    }

    /// Sets attempts per caption fetch.
    #[must_use]
    pub fn with_fetch_attempts(mut self, attempts: usize) -> Self {
        self.fetch_attempts = attempts;
        self
    }

    /// Sets the per-fetch timeout.
    #[must_use]
    pub fn with_fetch_timeout_ms(mut self, timeout: u64) -> Self {
        self.fetch_timeout_ms = timeout;
        self
    }

    /// Sets the minimum usable transcript length.
    #[must_use]
    pub fn with_min_caption_len(mut self, len: usize) -> Self {
        self.min_caption_len = len;
        self
    }

    /// Sets the minimum transcript count to continue.
    #[must_use]
    pub fn with_min_transcripts(mut self, count: usize) -> Self {
        self.min_transcripts = count;
        self
    }
}

/// Index stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Transcripts chunked and embedded concurrently per batch.
    pub batch_size: usize,
    /// Pause between batches in milliseconds.
    pub batch_delay_ms: u64,
    /// Target chunk length in characters; chunks break at sentence ends
    /// near this size.
    pub chunk_target_chars: usize,
    /// Embedding vector dimension.
    pub embedding_dim: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            batch_size: 8,
            batch_delay_ms: 250,
            chunk_target_chars: 800,
            embedding_dim: 64,
        }
    }
}

impl IndexConfig {
    /// Creates the default index config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the concurrent batch size.
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the inter-batch pause.
    #[must_use]
    pub fn with_batch_delay_ms(mut self, delay: u64) -> Self {
        self.batch_delay_ms = delay;
        self
    }

    /// Sets the target chunk size.
    #[must_use]
    pub fn with_chunk_target_chars(mut self, chars: usize) -> Self {
        self.chunk_target_chars = chars;
        self
    }

    /// Sets the embedding dimension.
    #[must_use]
    pub fn with_embedding_dim(mut self, dim: usize) -> Self {
        self.embedding_dim = dim;
        self
    }
}

/// Cluster stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Upper bound on topic clusters per creator.
    pub max_clusters: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self { max_clusters: 8 }
    }
}

impl ClusterConfig {
    /// Creates the default cluster config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cluster cap.
    #[must_use]
    pub fn with_max_clusters(mut self, clusters: usize) -> Self {
        self.max_clusters = clusters;
        self
    }
}

/// Extract stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// How many items, ranked by engagement, feed the voice profile.
    pub top_items: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self { top_items: 20 }
    }
}

impl ExtractConfig {
    /// Creates the default extract config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many top items feed extraction.
    #[must_use]
    pub fn with_top_items(mut self, items: usize) -> Self {
        self.top_items = items;
        self
    }
}

/// Auto-draft stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutodraftConfig {
    /// Maximum outline sections seeded from topic clusters.
    pub max_outline_sections: usize,
}

impl Default for AutodraftConfig {
    fn default() -> Self {
        Self {
            max_outline_sections: 5,
        }
    }
}

impl AutodraftConfig {
    /// Creates the default auto-draft config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the outline section cap.
    #[must_use]
    pub fn with_max_outline_sections(mut self, sections: usize) -> Self {
        self.max_outline_sections = sections;
        self
    }
}

/// Everything the pipeline and its dispatch layer can be tuned with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Start-message delivery settings.
    pub dispatch: DispatchConfig,
    /// Watchdog settings.
    pub watchdog: WatchdogConfig,
    /// Scrape stage settings.
    pub scrape: ScrapeConfig,
    /// Transcribe stage settings.
    pub transcribe: TranscribeConfig,
    /// Index stage settings.
    pub index: IndexConfig,
    /// Cluster stage settings.
    pub cluster: ClusterConfig,
    /// Extract stage settings.
    pub extract: ExtractConfig,
    /// Auto-draft stage settings.
    pub autodraft: AutodraftConfig,
}

impl PipelineConfig {
    /// Creates the default pipeline config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the dispatch settings.
    #[must_use]
    pub fn with_dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Replaces the watchdog settings.
    #[must_use]
    pub fn with_watchdog(mut self, watchdog: WatchdogConfig) -> Self {
        self.watchdog = watchdog;
        self
    }

    /// Replaces the scrape settings.
    #[must_use]
    pub fn with_scrape(mut self, scrape: ScrapeConfig) -> Self {
        self.scrape = scrape;
        self
    }

    /// Replaces the transcribe settings.
    #[must_use]
    pub fn with_transcribe(mut self, transcribe: TranscribeConfig) -> Self {
        self.transcribe = transcribe;
        self
    }

    /// Replaces the index settings.
    #[must_use]
    pub fn with_index(mut self, index: IndexConfig) -> Self {
        self.index = index;
        self
    }

    /// Replaces the cluster settings.
    #[must_use]
    pub fn with_cluster(mut self, cluster: ClusterConfig) -> Self {
        self.cluster = cluster;
        self
    }

    /// Replaces the extract settings.
    #[must_use]
    pub fn with_extract(mut self, extract: ExtractConfig) -> Self {
        self.extract = extract;
        self
    }

    /// Replaces the auto-draft settings.
    #[must_use]
    pub fn with_autodraft(mut self, autodraft: AutodraftConfig) -> Self {
        self.autodraft = autodraft;
        self
    }

    /// Rejects configurations that would stall or never stop the pipeline.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.dispatch.attempts_per_endpoint == 0 {
            return Err(PipelineError::Config(
                "dispatch.attempts_per_endpoint must be at least 1".to_string(),
            ));
        }
        if self.scrape.page_size == 0 {
            return Err(PipelineError::Config("scrape.page_size must be at least 1".to_string()));
        }
        if self.scrape.max_pages == 0 || self.scrape.max_items == 0 {
            return Err(PipelineError::Config(
                "scrape caps must allow at least one page and one item".to_string(),
            ));
        }
        if self.scrape.max_stale_pages == 0 {
            return Err(PipelineError::Config(
                "scrape.max_stale_pages must be at least 1".to_string(),
            ));
        }
        if self.transcribe.batch_size == 0 || self.index.batch_size == 0 {
            return Err(PipelineError::Config("batch sizes must be at least 1".to_string()));
        }
        if self.transcribe.fetch_attempts == 0 {
            return Err(PipelineError::Config(
                "transcribe.fetch_attempts must be at least 1".to_string(),
            ));
        }
        if self.transcribe.min_transcripts == 0 {
            return Err(PipelineError::Config(
                "transcribe.min_transcripts must be at least 1".to_string(),
            ));
        }
        if self.index.chunk_target_chars == 0 {
            return Err(PipelineError::Config(
                "index.chunk_target_chars must be at least 1".to_string(),
            ));
        }
        if self.index.embedding_dim == 0 {
            return Err(PipelineError::Config("index.embedding_dim must be at least 1".to_string()));
        }
        if self.cluster.max_clusters == 0 {
            return Err(PipelineError::Config(
                "cluster.max_clusters must be at least 1".to_string(),
            ));
        }
        if self.extract.top_items == 0 {
            return Err(PipelineError::Config("extract.top_items must be at least 1".to_string()));
        }
        if self.autodraft.max_outline_sections == 0 {
            return Err(PipelineError::Config(
                "autodraft.max_outline_sections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = PipelineConfig::new()
            .with_watchdog(WatchdogConfig::new().with_grace_ms(100))
            .with_scrape(ScrapeConfig::new().with_max_pages(3).with_max_items(10))
            .with_transcribe(TranscribeConfig::new().with_min_transcripts(2));

        assert_eq!(config.watchdog.grace_ms, 100);
        assert_eq!(config.scrape.max_pages, 3);
        assert_eq!(config.transcribe.min_transcripts, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_caps() {
        let config = PipelineConfig::new().with_scrape(ScrapeConfig::new().with_max_pages(0));
        assert!(config.validate().is_err());

        let config = PipelineConfig::new()
            .with_transcribe(TranscribeConfig::new().with_min_transcripts(0));
        assert!(config.validate().is_err());

        let config = PipelineConfig::new().with_index(IndexConfig::new().with_embedding_dim(0));
        assert!(config.validate().is_err());
    }
}
