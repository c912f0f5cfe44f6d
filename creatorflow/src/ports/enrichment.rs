//! AI enrichment protocol and its deterministic fallbacks.
//!
//! Enrichment is advisory: every call has a local fallback, so a creator
//! can reach ready with no model access at all, just with blander labels.

use crate::core::{ContentChunk, CreatorId, TopicCluster, Transcript, VoiceProfile};
use crate::errors::EnrichmentError;
use async_trait::async_trait;

/// Protocol for model-backed enrichment calls.
#[async_trait]
pub trait Enrichment: Send + Sync {
    /// Groups chunks into at most `max_clusters` labeled topic clusters.
    async fn cluster_topics(
        &self,
        creator_id: &CreatorId,
        chunks: &[ContentChunk],
        max_clusters: usize,
    ) -> Result<Vec<TopicCluster>, EnrichmentError>;

    /// Distills a voice profile from the creator's strongest transcripts.
    async fn extract_voice(
        &self,
        creator_id: &CreatorId,
        transcripts: &[Transcript],
    ) -> Result<VoiceProfile, EnrichmentError>;
}

/// Deterministic stand-ins used when enrichment is unavailable or returns
/// unusable output.
pub mod fallback {
    use super::{ContentChunk, CreatorId, TopicCluster, Transcript, VoiceProfile};
    use chrono::Utc;
    use std::collections::HashMap;

    const STOPWORDS: &[&str] = &[
        "this", "that", "with", "have", "from", "your", "about", "what", "when", "they", "will",
        "just", "like", "them", "then", "than", "there", "here", "because", "really", "going",
        "know", "want", "make", "time", "more", "some", "very", "into", "over", "only", "also",
        "been", "were", "their", "would", "could", "should", "while", "where", "which", "these",
        "those", "every", "still", "after", "before", "first", "thing", "things", "people",
        "video", "today",
    ];

    fn keyword_counts<'a>(texts: impl Iterator<Item = &'a str>) -> Vec<(String, usize)> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for text in texts {
            for word in text.split(|c: char| !c.is_alphanumeric()) {
                let word = word.to_lowercase();
                if word.len() < 4 || STOPWORDS.contains(&word.as_str()) {
                    continue;
                }
                *counts.entry(word).or_insert(0) += 1;
            }
        }
        let mut ranked: Vec<_> = counts.into_iter().collect();
        // Ties break alphabetically so the output is stable across runs.
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }

    fn capitalize(word: &str) -> String {
        let mut chars = word.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    }

    fn first_sentence(text: &str) -> Option<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        let end = trimmed
            .find(['.', '!', '?'])
            .map_or(trimmed.len(), |index| index + 1);
        Some(trimmed[..end].trim().chars().take(120).collect())
    }

    /// Keyword-frequency clustering: the most frequent content words seed
    /// the clusters, and chunks that match no seed land in a general
    /// bucket so every chunk is assigned somewhere.
    #[must_use]
    pub fn keyword_clusters(
        creator_id: &CreatorId,
        chunks: &[ContentChunk],
        max_clusters: usize,
    ) -> Vec<TopicCluster> {
        if chunks.is_empty() || max_clusters == 0 {
            return Vec::new();
        }

        let seed_count = max_clusters.saturating_sub(1).max(1);
        let seeds: Vec<String> = keyword_counts(chunks.iter().map(|chunk| chunk.text.as_str()))
            .into_iter()
            .take(seed_count)
            .map(|(word, _)| word)
            .collect();

        let mut buckets: Vec<Vec<String>> = vec![Vec::new(); seeds.len() + 1];
        for chunk in chunks {
            let lower = chunk.text.to_lowercase();
            match seeds.iter().position(|seed| lower.contains(seed.as_str())) {
                Some(index) => buckets[index].push(chunk.chunk_id.clone()),
                None => {
                    let last = buckets.len() - 1;
                    buckets[last].push(chunk.chunk_id.clone());
                }
            }
        }

        let mut clusters = Vec::new();
        for (index, seed) in seeds.iter().enumerate() {
            if buckets[index].is_empty() {
                continue;
            }
            clusters.push(TopicCluster {
                cluster_id: format!("topic-{seed}"),
                creator_id: creator_id.clone(),
                label: capitalize(seed),
                keywords: vec![seed.clone()],
                chunk_ids: std::mem::take(&mut buckets[index]),
            });
        }
        if let Some(general) = buckets.last_mut() {
            if !general.is_empty() {
                clusters.push(TopicCluster {
                    cluster_id: "topic-general".to_string(),
                    creator_id: creator_id.clone(),
                    label: "General".to_string(),
                    keywords: Vec::new(),
                    chunk_ids: std::mem::take(general),
                });
            }
        }
        clusters
    }

    /// A plain profile assembled from transcript keywords, used when voice
    /// extraction is unavailable.
    #[must_use]
    pub fn default_voice_profile(
        creator_id: &CreatorId,
        transcripts: &[Transcript],
    ) -> VoiceProfile {
        let themes = keyword_counts(transcripts.iter().map(|t| t.text.as_str()))
            .into_iter()
            .take(3)
            .map(|(word, _)| capitalize(&word))
            .collect();
        let sample_phrases = transcripts
            .iter()
            .take(3)
            .filter_map(|t| first_sentence(&t.text))
            .collect();

        VoiceProfile {
            creator_id: creator_id.clone(),
            summary: "Working profile assembled from transcript keywords; rerun extraction \
                      with enrichment available to refine it."
                .to_string(),
            tone: "conversational".to_string(),
            themes,
            sample_phrases,
            source_item_ids: transcripts.iter().map(|t| t.item_id.clone()).collect(),
            extracted_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fallback;
    use crate::core::{ContentChunk, CreatorId, Transcript};

    fn chunk(id: u32, text: &str) -> ContentChunk {
        ContentChunk::new("item", CreatorId::new("c1"), id, text)
    }

    #[test]
    fn test_keyword_clusters_are_deterministic() {
        let chunks = vec![
            chunk(0, "growing sourdough starter takes patience and flour"),
            chunk(1, "sourdough hydration ratios explained for beginners"),
            chunk(2, "kettlebell training plan building strength weekly"),
            chunk(3, "strength progressions with kettlebell swings"),
        ];
        let creator = CreatorId::new("c1");

        let first = fallback::keyword_clusters(&creator, &chunks, 4);
        let second = fallback::keyword_clusters(&creator, &chunks, 4);
        assert_eq!(first, second);
        assert!(!first.is_empty());

        let assigned: usize = first.iter().map(super::TopicCluster::size).sum();
        assert_eq!(assigned, chunks.len());
    }

    #[test]
    fn test_keyword_clusters_empty_input() {
        let creator = CreatorId::new("c1");
        assert!(fallback::keyword_clusters(&creator, &[], 4).is_empty());
    }

    #[test]
    fn test_default_voice_profile_samples_transcripts() {
        let creator = CreatorId::new("c1");
        let transcripts = vec![
            Transcript::new("v1", creator.clone(), "Welcome back everyone! Fermentation is magic."),
            Transcript::new("v2", creator.clone(), "Fermentation basics again. Start simple."),
        ];

        let profile = fallback::default_voice_profile(&creator, &transcripts);
        assert_eq!(profile.tone, "conversational");
        assert_eq!(profile.source_item_ids, vec!["v1", "v2"]);
        assert!(!profile.sample_phrases.is_empty());
        assert!(profile.themes.iter().any(|theme| theme == "Fermentation"));
    }
}
