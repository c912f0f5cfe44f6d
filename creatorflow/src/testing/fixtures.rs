//! Scripted collaborators and a bundled harness for pipeline tests.
//!
//! The scripted source and enrichment run from pre-loaded scripts, so
//! races, outages, and thin catalogs are reproducible without a network.

use crate::config::PipelineConfig;
use crate::core::{
    ContentChunk, ContentItem, CreatorId, PipelineRun, RunDescriptor, TopicCluster, Transcript,
    VoiceProfile,
};
use crate::errors::{EnrichmentError, PipelineError, SourceError};
use crate::pipeline::RunContext;
use crate::ports::{
    ContentPage, ContentSource, Enrichment, InMemoryContentStore, PipelinePorts,
};
use crate::registry::{InMemoryRegistryStore, PipelineRegistry};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Installs a test subscriber for tracing output. Safe to call from every
/// test; only the first call wins.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

/// A content source that serves pre-loaded pages and captions.
///
/// Pages are served in push order, one per `list_content` call, whatever
/// the cursor; an exhausted script serves empty final pages. Captions are
/// looked up by item id, and items without a script have no captions.
#[derive(Default)]
pub struct ScriptedSource {
    pages: Mutex<VecDeque<Result<ContentPage, SourceError>>>,
    captions: Mutex<HashMap<String, Result<Option<String>, SourceError>>>,
    list_calls: AtomicUsize,
    caption_calls: AtomicUsize,
}

impl ScriptedSource {
    /// Creates a source with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a page for the next unserved `list_content` call.
    pub fn push_page(&self, page: ContentPage) {
        self.pages.lock().push_back(Ok(page));
    }

    /// Queues a listing failure.
    pub fn push_list_error(&self, error: SourceError) {
        self.pages.lock().push_back(Err(error));
    }

    /// Scripts caption text for an item.
    pub fn script_caption(&self, item_id: impl Into<String>, text: impl Into<String>) {
        self.captions
            .lock()
            .insert(item_id.into(), Ok(Some(text.into())));
    }

    /// Scripts a caption fetch failure for an item.
    pub fn script_caption_error(&self, item_id: impl Into<String>, error: SourceError) {
        self.captions.lock().insert(item_id.into(), Err(error));
    }

    /// Listing calls served so far.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Caption fetches served so far.
    #[must_use]
    pub fn caption_calls(&self) -> usize {
        self.caption_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for ScriptedSource {
    async fn list_content(
        &self,
        _creator_id: &CreatorId,
        _cursor: Option<&str>,
        _page_size: u32,
    ) -> Result<ContentPage, SourceError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.pages
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(ContentPage::last(Vec::new())))
    }

    async fn fetch_captions(
        &self,
        _creator_id: &CreatorId,
        item_id: &str,
    ) -> Result<Option<String>, SourceError> {
        self.caption_calls.fetch_add(1, Ordering::SeqCst);
        match self.captions.lock().get(item_id) {
            Some(result) => result.clone(),
            None => Ok(None),
        }
    }
}

/// An enrichment service that serves scripted answers.
///
/// Unscripted calls fail, which is exactly what drives the stages onto
/// their deterministic fallbacks.
#[derive(Default)]
pub struct ScriptedEnrichment {
    clusters: Mutex<Option<Result<Vec<TopicCluster>, EnrichmentError>>>,
    voice: Mutex<Option<Result<VoiceProfile, EnrichmentError>>>,
    cluster_calls: AtomicUsize,
    voice_calls: AtomicUsize,
}

impl ScriptedEnrichment {
    /// Creates an enrichment service where every call fails.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the cluster answer served on every call.
    pub fn script_clusters(&self, clusters: Vec<TopicCluster>) {
        *self.clusters.lock() = Some(Ok(clusters));
    }

    /// Scripts a clustering failure.
    pub fn fail_clusters(&self, message: impl Into<String>) {
        *self.clusters.lock() = Some(Err(EnrichmentError::new("cluster_topics", message)));
    }

    /// Scripts the voice profile served on every call.
    pub fn script_voice(&self, profile: VoiceProfile) {
        *self.voice.lock() = Some(Ok(profile));
    }

    /// Scripts a voice extraction failure.
    pub fn fail_voice(&self, message: impl Into<String>) {
        *self.voice.lock() = Some(Err(EnrichmentError::new("extract_voice", message)));
    }

    /// Clustering calls served so far.
    #[must_use]
    pub fn cluster_calls(&self) -> usize {
        self.cluster_calls.load(Ordering::SeqCst)
    }

    /// Voice extraction calls served so far.
    #[must_use]
    pub fn voice_calls(&self) -> usize {
        self.voice_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Enrichment for ScriptedEnrichment {
    async fn cluster_topics(
        &self,
        _creator_id: &CreatorId,
        _chunks: &[ContentChunk],
        _max_clusters: usize,
    ) -> Result<Vec<TopicCluster>, EnrichmentError> {
        self.cluster_calls.fetch_add(1, Ordering::SeqCst);
        match self.clusters.lock().as_ref() {
            Some(result) => result.clone(),
            None => Err(EnrichmentError::new("cluster_topics", "not scripted")),
        }
    }

    async fn extract_voice(
        &self,
        _creator_id: &CreatorId,
        _transcripts: &[Transcript],
    ) -> Result<VoiceProfile, EnrichmentError> {
        self.voice_calls.fetch_add(1, Ordering::SeqCst);
        match self.voice.lock().as_ref() {
            Some(result) => result.clone(),
            None => Err(EnrichmentError::new("extract_voice", "not scripted")),
        }
    }
}

/// Everything a pipeline test needs, wired over in-memory stores.
pub struct PipelineHarness {
    /// Registry store, exposed for direct row assertions.
    pub store: Arc<InMemoryRegistryStore>,
    /// Registry operations over the store.
    pub registry: PipelineRegistry,
    /// Content store, exposed for output assertions.
    pub content: Arc<InMemoryContentStore>,
    /// Scripted content source.
    pub source: Arc<ScriptedSource>,
    /// Scripted enrichment service.
    pub enrichment: Arc<ScriptedEnrichment>,
    /// Pipeline config; production defaults with zeroed batch delays.
    pub config: PipelineConfig,
}

impl PipelineHarness {
    /// Creates a harness with fresh stores and an empty script.
    #[must_use]
    pub fn new() -> Self {
        let store = Arc::new(InMemoryRegistryStore::new());
        let registry = PipelineRegistry::new(store.clone());
        let config = PipelineConfig::default()
            .with_transcribe(
                crate::config::TranscribeConfig::default().with_batch_delay_ms(0),
            )
            .with_index(crate::config::IndexConfig::default().with_batch_delay_ms(0));
        Self {
            store,
            registry,
            content: Arc::new(InMemoryContentStore::new()),
            source: Arc::new(ScriptedSource::new()),
            enrichment: Arc::new(ScriptedEnrichment::new()),
            config,
        }
    }

    /// Replaces the config.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// The collaborator bundle with enrichment attached.
    #[must_use]
    pub fn ports(&self) -> PipelinePorts {
        PipelinePorts::new(self.source.clone(), self.content.clone())
            .with_enrichment(self.enrichment.clone())
    }

    /// The collaborator bundle without enrichment.
    #[must_use]
    pub fn ports_without_enrichment(&self) -> PipelinePorts {
        PipelinePorts::new(self.source.clone(), self.content.clone())
    }

    /// Builds a run context for a descriptor.
    #[must_use]
    pub fn context(&self, descriptor: RunDescriptor) -> RunContext {
        RunContext::new(
            descriptor,
            self.registry.clone(),
            self.ports(),
            self.config.clone(),
        )
    }

    /// Begins a run record and takes the ownership pointer for it, the way
    /// a launch does.
    pub async fn begin_owned(
        &self,
        descriptor: &RunDescriptor,
    ) -> Result<PipelineRun, PipelineError> {
        let run = self.registry.begin_run(descriptor.clone()).await?;
        self.registry
            .take_ownership(&descriptor.creator_id, &descriptor.run_id)
            .await?;
        Ok(run)
    }
}

impl Default for PipelineHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// A content item with engagement stats, for catalog scripts.
#[must_use]
pub fn sample_item(creator_id: &CreatorId, item_id: &str, views: i64) -> ContentItem {
    ContentItem::new(item_id, creator_id.clone(), format!("Video {item_id}"))
        .with_view_count(views)
        .with_captions()
}

/// Caption text over the default length floor, themed around one topic so
/// keyword fallbacks have something to find.
#[must_use]
pub fn caption_about(topic: &str) -> String {
    format!(
        "Welcome back everyone. Today we are digging into {topic} properly. \
         My {topic} routine took years to settle. Start small with {topic}, \
         keep notes, and compare weeks. The part of {topic} nobody mentions \
         is recovery, and that is where most progress hides."
    )
}
