//! Records produced and consumed by the pipeline stages.
//!
//! Stages communicate through the content store rather than through return
//! values, so each stage can be retried independently; these are the rows
//! they exchange.

use crate::core::identity::{CreatorId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One piece of source content discovered by the scrape stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Source-assigned id, stable across scrapes.
    pub item_id: String,
    /// Creator the item belongs to.
    pub creator_id: CreatorId,
    /// Item title.
    pub title: String,
    /// Creator-written description, when the source exposes one.
    pub description: Option<String>,
    /// Public URL, when the source exposes one.
    pub url: Option<String>,
    /// Publication timestamp, when known.
    pub published_at: Option<DateTime<Utc>>,
    /// Runtime in seconds, when known.
    pub duration_secs: Option<u32>,
    /// View count at scrape time.
    pub view_count: Option<i64>,
    /// Like count at scrape time.
    pub like_count: Option<i64>,
    /// Comment count at scrape time.
    pub comment_count: Option<i64>,
    /// Whether the source reports captions for this item.
    #[serde(default)]
    pub has_captions: bool,
}

impl ContentItem {
    /// Creates an item with only identity and title set.
    pub fn new(item_id: impl Into<String>, creator_id: CreatorId, title: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            creator_id,
            title: title.into(),
            description: None,
            url: None,
            published_at: None,
            duration_secs: None,
            view_count: None,
            like_count: None,
            comment_count: None,
            has_captions: false,
        }
    }

    /// Sets the view count.
    #[must_use]
    pub fn with_view_count(mut self, views: i64) -> Self {
        self.view_count = Some(views);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Marks the item as having captions available.
    #[must_use]
    pub fn with_captions(mut self) -> Self {
        self.has_captions = true;
        self
    }

    /// Weighted engagement score used to rank items.
    ///
    /// Comments and likes cost the audience more than a view, so they are
    /// weighted up; absent counters score zero.
    #[must_use]
    pub fn engagement(&self) -> i64 {
        self.view_count.unwrap_or(0)
            + 5 * self.like_count.unwrap_or(0)
            + 10 * self.comment_count.unwrap_or(0)
    }
}

/// Where a transcript's text came from.
///
/// Captions are the primary source; description and title are the
/// substitutes used when captions are missing or too short to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptSource {
    /// Fetched caption track.
    Captions,
    /// The item's description text.
    Description,
    /// The item's title.
    Title,
}

/// Normalized transcript text for one content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// Item the transcript belongs to.
    pub item_id: String,
    /// Creator the item belongs to.
    pub creator_id: CreatorId,
    /// Cleaned transcript text.
    pub text: String,
    /// Where the text came from.
    pub source: TranscriptSource,
    /// BCP-47 language tag, when the source reports one.
    pub language: Option<String>,
    /// When the transcript was fetched.
    pub fetched_at: DateTime<Utc>,
}

impl Transcript {
    /// Creates a caption-sourced transcript stamped with the current time.
    pub fn new(item_id: impl Into<String>, creator_id: CreatorId, text: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            creator_id,
            text: text.into(),
            source: TranscriptSource::Captions,
            language: None,
            fetched_at: Utc::now(),
        }
    }

    /// Sets the text source.
    #[must_use]
    pub fn with_source(mut self, source: TranscriptSource) -> Self {
        self.source = source;
        self
    }
}

/// A fixed-size slice of a transcript with its embedding vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentChunk {
    /// Chunk id, derived from the item id and ordinal.
    pub chunk_id: String,
    /// Item the chunk was cut from.
    pub item_id: String,
    /// Creator the item belongs to.
    pub creator_id: CreatorId,
    /// Position of the chunk within its transcript, zero-based.
    pub ordinal: u32,
    /// Chunk text.
    pub text: String,
    /// L2-normalized embedding of the chunk text.
    #[serde(default)]
    pub embedding: Vec<f32>,
}

impl ContentChunk {
    /// Creates a chunk and derives its id from the item id and ordinal.
    pub fn new(
        item_id: impl Into<String>,
        creator_id: CreatorId,
        ordinal: u32,
        text: impl Into<String>,
    ) -> Self {
        let item_id = item_id.into();
        Self {
            chunk_id: format!("{item_id}#{ordinal}"),
            item_id,
            creator_id,
            ordinal,
            text: text.into(),
            embedding: Vec::new(),
        }
    }
}

/// A named group of related chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicCluster {
    /// Cluster id, unique per creator.
    pub cluster_id: String,
    /// Creator the cluster belongs to.
    pub creator_id: CreatorId,
    /// Human-readable topic label.
    pub label: String,
    /// Keywords that characterize the cluster.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Chunks assigned to the cluster.
    #[serde(default)]
    pub chunk_ids: Vec<String>,
}

impl TopicCluster {
    /// Number of chunks in the cluster.
    #[must_use]
    pub fn size(&self) -> usize {
        self.chunk_ids.len()
    }
}

/// How a creator writes and speaks, distilled from their top content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    /// Creator the profile describes.
    pub creator_id: CreatorId,
    /// One-paragraph summary of the creator's voice.
    pub summary: String,
    /// Overall tone, e.g. "conversational" or "authoritative".
    pub tone: String,
    /// Recurring themes across the sampled content.
    #[serde(default)]
    pub themes: Vec<String>,
    /// Verbatim phrases that typify the voice.
    #[serde(default)]
    pub sample_phrases: Vec<String>,
    /// Items the profile was distilled from.
    #[serde(default)]
    pub source_item_ids: Vec<String>,
    /// When the profile was extracted.
    pub extracted_at: DateTime<Utc>,
}

/// An auto-drafted product seeded from the creator's strongest topics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftProduct {
    /// Product id, unique per creator.
    pub product_id: String,
    /// Creator the draft belongs to.
    pub creator_id: CreatorId,
    /// Working title.
    pub title: String,
    /// Outline section headings, one per seeded topic.
    #[serde(default)]
    pub outline: Vec<String>,
    /// Run that created the draft.
    pub created_by_run: RunId,
    /// When the draft was created.
    pub created_at: DateTime<Utc>,
}
