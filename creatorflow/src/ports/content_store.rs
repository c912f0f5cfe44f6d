//! Content store protocol: where stages read and write their records.
//!
//! Stage idempotency lives in these write semantics: item upserts ignore
//! duplicates, transcript upserts keep the longer text, chunk and cluster
//! writes replace wholesale, and the draft product is create-if-absent.

use crate::core::{
    ContentChunk, ContentItem, CreatorId, DraftProduct, TopicCluster, Transcript, VoiceProfile,
};
use crate::errors::StoreError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Protocol for the pipeline's content storage backend.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Inserts items, ignoring ones already present under the same id.
    /// Returns how many were newly inserted.
    async fn upsert_items(&self, items: &[ContentItem]) -> Result<usize, StoreError>;

    /// All items for a creator, in item-id order.
    async fn items_for_creator(&self, creator_id: &CreatorId)
        -> Result<Vec<ContentItem>, StoreError>;

    /// Inserts a transcript, or replaces the stored one when the new text
    /// is longer. Re-fetching can only improve a transcript.
    async fn upsert_transcript(&self, transcript: Transcript) -> Result<(), StoreError>;

    /// All transcripts for a creator, in item-id order.
    async fn transcripts_for_creator(
        &self,
        creator_id: &CreatorId,
    ) -> Result<Vec<Transcript>, StoreError>;

    /// Replaces all chunks for one item in a single write.
    async fn replace_chunks(
        &self,
        creator_id: &CreatorId,
        item_id: &str,
        chunks: Vec<ContentChunk>,
    ) -> Result<(), StoreError>;

    /// All chunks for a creator, ordered by item id then ordinal.
    async fn chunks_for_creator(
        &self,
        creator_id: &CreatorId,
    ) -> Result<Vec<ContentChunk>, StoreError>;

    /// Replaces the creator's whole cluster set in a single write.
    async fn replace_clusters(
        &self,
        creator_id: &CreatorId,
        clusters: Vec<TopicCluster>,
    ) -> Result<(), StoreError>;

    /// The creator's current clusters.
    async fn clusters_for_creator(
        &self,
        creator_id: &CreatorId,
    ) -> Result<Vec<TopicCluster>, StoreError>;

    /// Saves the voice profile, replacing any previous one.
    async fn save_voice_profile(&self, profile: VoiceProfile) -> Result<(), StoreError>;

    /// The creator's current voice profile, if extracted.
    async fn voice_profile(&self, creator_id: &CreatorId)
        -> Result<Option<VoiceProfile>, StoreError>;

    /// Creates the draft product unless the creator already has one.
    /// Returns whether this call created it.
    async fn create_product_if_absent(&self, product: DraftProduct) -> Result<bool, StoreError>;

    /// The creator's draft product, if created.
    async fn product_for_creator(
        &self,
        creator_id: &CreatorId,
    ) -> Result<Option<DraftProduct>, StoreError>;
}

#[derive(Debug, Default)]
struct Shelves {
    items: HashMap<CreatorId, HashMap<String, ContentItem>>,
    transcripts: HashMap<CreatorId, HashMap<String, Transcript>>,
    chunks: HashMap<CreatorId, HashMap<String, Vec<ContentChunk>>>,
    clusters: HashMap<CreatorId, Vec<TopicCluster>>,
    profiles: HashMap<CreatorId, VoiceProfile>,
    products: HashMap<CreatorId, DraftProduct>,
}

/// In-memory content store.
#[derive(Debug, Default)]
pub struct InMemoryContentStore {
    shelves: Arc<Mutex<Shelves>>,
}

impl InMemoryContentStore {
    /// Creates a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of items stored for a creator.
    #[must_use]
    pub fn item_count(&self, creator_id: &CreatorId) -> usize {
        self.shelves
            .lock()
            .items
            .get(creator_id)
            .map_or(0, HashMap::len)
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn upsert_items(&self, items: &[ContentItem]) -> Result<usize, StoreError> {
        let mut shelves = self.shelves.lock();
        let mut inserted = 0;
        for item in items {
            let shelf = shelves.items.entry(item.creator_id.clone()).or_default();
            if !shelf.contains_key(&item.item_id) {
                shelf.insert(item.item_id.clone(), item.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn items_for_creator(
        &self,
        creator_id: &CreatorId,
    ) -> Result<Vec<ContentItem>, StoreError> {
        let shelves = self.shelves.lock();
        let mut items: Vec<ContentItem> = shelves
            .items
            .get(creator_id)
            .map(|shelf| shelf.values().cloned().collect())
            .unwrap_or_default();
        items.sort_by(|a, b| a.item_id.cmp(&b.item_id));
        Ok(items)
    }

    async fn upsert_transcript(&self, transcript: Transcript) -> Result<(), StoreError> {
        let mut shelves = self.shelves.lock();
        let shelf = shelves
            .transcripts
            .entry(transcript.creator_id.clone())
            .or_default();
        match shelf.get(&transcript.item_id) {
            Some(existing) if existing.text.len() >= transcript.text.len() => {}
            _ => {
                shelf.insert(transcript.item_id.clone(), transcript);
            }
        }
        Ok(())
    }

    async fn transcripts_for_creator(
        &self,
        creator_id: &CreatorId,
    ) -> Result<Vec<Transcript>, StoreError> {
        let shelves = self.shelves.lock();
        let mut transcripts: Vec<Transcript> = shelves
            .transcripts
            .get(creator_id)
            .map(|shelf| shelf.values().cloned().collect())
            .unwrap_or_default();
        transcripts.sort_by(|a, b| a.item_id.cmp(&b.item_id));
        Ok(transcripts)
    }

    async fn replace_chunks(
        &self,
        creator_id: &CreatorId,
        item_id: &str,
        chunks: Vec<ContentChunk>,
    ) -> Result<(), StoreError> {
        let mut shelves = self.shelves.lock();
        shelves
            .chunks
            .entry(creator_id.clone())
            .or_default()
            .insert(item_id.to_string(), chunks);
        Ok(())
    }

    async fn chunks_for_creator(
        &self,
        creator_id: &CreatorId,
    ) -> Result<Vec<ContentChunk>, StoreError> {
        let shelves = self.shelves.lock();
        let mut chunks: Vec<ContentChunk> = shelves
            .chunks
            .get(creator_id)
            .map(|shelf| shelf.values().flatten().cloned().collect())
            .unwrap_or_default();
        chunks.sort_by(|a, b| a.item_id.cmp(&b.item_id).then(a.ordinal.cmp(&b.ordinal)));
        Ok(chunks)
    }

    async fn replace_clusters(
        &self,
        creator_id: &CreatorId,
        clusters: Vec<TopicCluster>,
    ) -> Result<(), StoreError> {
        self.shelves.lock().clusters.insert(creator_id.clone(), clusters);
        Ok(())
    }

    async fn clusters_for_creator(
        &self,
        creator_id: &CreatorId,
    ) -> Result<Vec<TopicCluster>, StoreError> {
        Ok(self
            .shelves
            .lock()
            .clusters
            .get(creator_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_voice_profile(&self, profile: VoiceProfile) -> Result<(), StoreError> {
        self.shelves
            .lock()
            .profiles
            .insert(profile.creator_id.clone(), profile);
        Ok(())
    }

    async fn voice_profile(
        &self,
        creator_id: &CreatorId,
    ) -> Result<Option<VoiceProfile>, StoreError> {
        Ok(self.shelves.lock().profiles.get(creator_id).cloned())
    }

    async fn create_product_if_absent(&self, product: DraftProduct) -> Result<bool, StoreError> {
        let mut shelves = self.shelves.lock();
        if shelves.products.contains_key(&product.creator_id) {
            return Ok(false);
        }
        shelves.products.insert(product.creator_id.clone(), product);
        Ok(true)
    }

    async fn product_for_creator(
        &self,
        creator_id: &CreatorId,
    ) -> Result<Option<DraftProduct>, StoreError> {
        Ok(self.shelves.lock().products.get(creator_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RunId;
    use chrono::Utc;

    fn item(id: &str) -> ContentItem {
        ContentItem::new(id, CreatorId::new("c1"), format!("title {id}"))
    }

    #[tokio::test]
    async fn test_upsert_items_ignores_duplicates() {
        let store = InMemoryContentStore::new();
        let creator = CreatorId::new("c1");

        let inserted = store.upsert_items(&[item("v1"), item("v2")]).await.unwrap();
        assert_eq!(inserted, 2);

        let inserted = store.upsert_items(&[item("v2"), item("v3")]).await.unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(store.item_count(&creator), 3);
    }

    #[tokio::test]
    async fn test_transcript_upsert_keeps_longer_text() {
        let store = InMemoryContentStore::new();
        let creator = CreatorId::new("c1");

        store
            .upsert_transcript(Transcript::new("v1", creator.clone(), "short"))
            .await
            .unwrap();
        store
            .upsert_transcript(Transcript::new("v1", creator.clone(), "a longer transcript"))
            .await
            .unwrap();
        store
            .upsert_transcript(Transcript::new("v1", creator.clone(), "tiny"))
            .await
            .unwrap();

        let transcripts = store.transcripts_for_creator(&creator).await.unwrap();
        assert_eq!(transcripts.len(), 1);
        assert_eq!(transcripts[0].text, "a longer transcript");
    }

    #[tokio::test]
    async fn test_replace_chunks_is_wholesale() {
        let store = InMemoryContentStore::new();
        let creator = CreatorId::new("c1");

        let old = vec![
            ContentChunk::new("v1", creator.clone(), 0, "old a"),
            ContentChunk::new("v1", creator.clone(), 1, "old b"),
        ];
        store.replace_chunks(&creator, "v1", old).await.unwrap();

        let new = vec![ContentChunk::new("v1", creator.clone(), 0, "new")];
        store.replace_chunks(&creator, "v1", new).await.unwrap();

        let chunks = store.chunks_for_creator(&creator).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "new");
    }

    #[tokio::test]
    async fn test_product_create_if_absent() {
        let store = InMemoryContentStore::new();
        let creator = CreatorId::new("c1");
        let product = DraftProduct {
            product_id: "p1".to_string(),
            creator_id: creator.clone(),
            title: "First product".to_string(),
            outline: vec!["Topic".to_string()],
            created_by_run: RunId::new("r1"),
            created_at: Utc::now(),
        };

        assert!(store.create_product_if_absent(product.clone()).await.unwrap());

        let mut second = product;
        second.product_id = "p2".to_string();
        assert!(!store.create_product_if_absent(second).await.unwrap());

        let stored = store.product_for_creator(&creator).await.unwrap().unwrap();
        assert_eq!(stored.product_id, "p1");
    }
}
