//! Per-client color learning: persisted mappings and similarity groups.

use std::collections::HashMap;
use std::sync::Arc;

use ahash::AHashMap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::color::groups::{group_name, perceptual_group_of};
use crate::color::normalizer::ColorNormalizer;
use crate::error::Result;

/// A learned mapping for one (client, raw color) pair.
///
/// Created on first encounter; its usage count grows on every subsequent
/// one. Mappings are never deleted automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorMapping {
    /// Owning client (tenant); grouping never crosses clients.
    pub client_id: Uuid,
    /// The color exactly as the catalog spelled it.
    pub raw_color: String,
    /// Canonical form, when normalization succeeded.
    pub normalized_color: Option<String>,
    /// Similarity group this color belongs to within the client.
    pub similarity_group: Option<String>,
    /// Number of times this raw color has been encountered.
    pub usage_count: u64,
    /// Normalization confidence, when the semantic fallback reported one.
    pub confidence: Option<f32>,
    /// First encounter.
    pub created_at: DateTime<Utc>,
    /// Most recent encounter.
    pub last_used_at: DateTime<Utc>,
}

/// Persistence port for learned color mappings.
#[async_trait]
pub trait ColorMappingStore: Send + Sync {
    /// Look up the mapping for a client's raw color.
    async fn find(&self, client_id: Uuid, raw_color: &str) -> Result<Option<ColorMapping>>;

    /// Insert or replace a mapping.
    async fn save(&self, mapping: ColorMapping) -> Result<()>;

    /// Record one more encounter of an existing mapping.
    async fn touch(&self, client_id: Uuid, raw_color: &str) -> Result<()>;

    /// All mappings of one client.
    async fn client_mappings(&self, client_id: Uuid) -> Result<Vec<ColorMapping>>;
}

/// In-memory mapping store behind a `parking_lot` lock.
#[derive(Debug, Default)]
pub struct InMemoryColorMappingStore {
    entries: RwLock<AHashMap<(Uuid, String), ColorMapping>>,
}

impl InMemoryColorMappingStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ColorMappingStore for InMemoryColorMappingStore {
    async fn find(&self, client_id: Uuid, raw_color: &str) -> Result<Option<ColorMapping>> {
        Ok(self
            .entries
            .read()
            .get(&(client_id, raw_color.to_string()))
            .cloned())
    }

    async fn save(&self, mapping: ColorMapping) -> Result<()> {
        self.entries
            .write()
            .insert((mapping.client_id, mapping.raw_color.clone()), mapping);
        Ok(())
    }

    async fn touch(&self, client_id: Uuid, raw_color: &str) -> Result<()> {
        if let Some(mapping) = self
            .entries
            .write()
            .get_mut(&(client_id, raw_color.to_string()))
        {
            mapping.usage_count += 1;
            mapping.last_used_at = Utc::now();
        }
        Ok(())
    }

    async fn client_mappings(&self, client_id: Uuid) -> Result<Vec<ColorMapping>> {
        let mut mappings: Vec<ColorMapping> = self
            .entries
            .read()
            .values()
            .filter(|mapping| mapping.client_id == client_id)
            .cloned()
            .collect();
        mappings.sort_by(|a, b| a.raw_color.cmp(&b.raw_color));
        Ok(mappings)
    }
}

/// Outcome of processing one raw color for a client.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedColor {
    /// The raw color, trimmed.
    pub raw_color: String,
    /// Canonical form, when known.
    pub normalized_color: Option<String>,
    /// Similarity group the color ended up in.
    pub similarity_group: Option<String>,
    /// Whether this encounter created the mapping.
    pub is_new: bool,
    /// Normalization confidence, when available.
    pub confidence: Option<f32>,
}

/// Learns each client's color vocabulary as it is encountered.
///
/// Group assignment order: hardcoded perceptual groups, then the client's
/// existing learned groups by similarity, then the color seeds its own
/// group. Two clients can therefore hold the same raw string in different
/// groups when their catalogs' semantics diverge.
pub struct ColorLearningService {
    store: Arc<dyn ColorMappingStore>,
    normalizer: Arc<ColorNormalizer>,
}

impl ColorLearningService {
    /// Create a learning service over a store and normalizer.
    pub fn new(store: Arc<dyn ColorMappingStore>, normalizer: Arc<ColorNormalizer>) -> Self {
        Self { store, normalizer }
    }

    /// Process one raw color: fetch the existing mapping or learn a new one.
    ///
    /// Returns `None` for blank input. Every call on an existing mapping
    /// increments its usage count.
    pub async fn process_color(
        &self,
        client_id: Uuid,
        raw_color: &str,
    ) -> Result<Option<ProcessedColor>> {
        let clean_color = raw_color.trim();
        if clean_color.is_empty() {
            return Ok(None);
        }

        if let Some(existing) = self.store.find(client_id, clean_color).await? {
            debug!(
                client = %client_id,
                color = clean_color,
                group = existing.similarity_group.as_deref().unwrap_or("-"),
                usage = existing.usage_count,
                "known color"
            );
            self.store.touch(client_id, clean_color).await?;

            return Ok(Some(ProcessedColor {
                raw_color: clean_color.to_string(),
                normalized_color: existing.normalized_color,
                similarity_group: existing.similarity_group,
                is_new: false,
                confidence: existing.confidence,
            }));
        }

        let normalized = self.normalizer.normalize(clean_color).await;
        let similarity_group = self
            .find_similarity_group(client_id, normalized.as_deref())
            .await?;

        let now = Utc::now();
        let mapping = ColorMapping {
            client_id,
            raw_color: clean_color.to_string(),
            normalized_color: normalized.clone(),
            similarity_group: similarity_group.clone(),
            usage_count: 1,
            confidence: None,
            created_at: now,
            last_used_at: now,
        };
        self.store.save(mapping).await?;

        info!(
            client = %client_id,
            color = clean_color,
            normalized = normalized.as_deref().unwrap_or("-"),
            group = similarity_group.as_deref().unwrap_or("-"),
            "learned color"
        );

        Ok(Some(ProcessedColor {
            raw_color: clean_color.to_string(),
            normalized_color: normalized,
            similarity_group,
            is_new: true,
            confidence: None,
        }))
    }

    /// All raw colors of a client that should match a detected color.
    ///
    /// Resolves the detected color's group and returns every raw spelling
    /// the client has used in that group; falls back to the detected color
    /// itself when nothing is grouped yet.
    pub async fn similar_raw_colors_for_search(
        &self,
        client_id: Uuid,
        detected_color: &str,
    ) -> Result<Vec<String>> {
        let normalized = self.normalizer.normalize(detected_color).await;
        let group = self
            .find_similarity_group(client_id, normalized.as_deref())
            .await?;

        let Some(group) = group else {
            return Ok(vec![detected_color.to_string()]);
        };

        let raw_colors: Vec<String> = self
            .store
            .client_mappings(client_id)
            .await?
            .into_iter()
            .filter(|mapping| mapping.similarity_group.as_deref() == Some(group.as_str()))
            .map(|mapping| mapping.raw_color)
            .collect();

        if raw_colors.is_empty() {
            Ok(vec![detected_color.to_string()])
        } else {
            debug!(
                color = detected_color,
                group = %group,
                matches = raw_colors.len(),
                "expanded color for search"
            );
            Ok(raw_colors)
        }
    }

    /// Manually move raw colors into one similarity group.
    ///
    /// Returns how many mappings were updated.
    pub async fn merge_into_group(
        &self,
        client_id: Uuid,
        raw_colors: &[String],
        group: &str,
    ) -> Result<usize> {
        let mut updated = 0;
        for raw_color in raw_colors {
            if let Some(mut mapping) = self.store.find(client_id, raw_color).await? {
                mapping.similarity_group = Some(group.to_string());
                self.store.save(mapping).await?;
                updated += 1;
            }
        }

        info!(client = %client_id, group, updated, "merged colors into group");
        Ok(updated)
    }

    /// Resolve the similarity group for a normalized color.
    async fn find_similarity_group(
        &self,
        client_id: Uuid,
        normalized_color: Option<&str>,
    ) -> Result<Option<String>> {
        let Some(normalized) = normalized_color else {
            return Ok(None);
        };

        // 1. Hardcoded perceptual groups
        if let Some(group) = perceptual_group_of(normalized) {
            return Ok(Some(group_name(group)));
        }

        // 2. The client's learned groups, by similarity
        let mappings = self.store.client_mappings(client_id).await?;
        let mut groups: HashMap<&str, Vec<&ColorMapping>> = HashMap::new();
        for mapping in &mappings {
            if let Some(group) = mapping.similarity_group.as_deref() {
                groups.entry(group).or_default().push(mapping);
            }
        }

        for (group, members) in groups {
            for member in members {
                let Some(member_color) = member.normalized_color.as_deref() else {
                    continue;
                };
                if self.normalizer.are_similar(normalized, member_color).await {
                    debug!(color = normalized, group, "assigned to existing group");
                    return Ok(Some(group.to_string()));
                }
            }
        }

        // 3. The color seeds its own group
        debug!(color = normalized, "seeds its own group");
        Ok(Some(normalized.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> ColorLearningService {
        ColorLearningService::new(
            Arc::new(InMemoryColorMappingStore::new()),
            Arc::new(ColorNormalizer::new()),
        )
    }

    #[tokio::test]
    async fn test_process_color_blank_is_none() {
        let service = service();
        assert_eq!(
            service.process_color(Uuid::new_v4(), "  ").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_process_color_learns_then_reuses() {
        let service = service();
        let client_id = Uuid::new_v4();

        let first = service
            .process_color(client_id, "Azul marino")
            .await
            .unwrap()
            .unwrap();
        assert!(first.is_new);
        assert_eq!(first.normalized_color.as_deref(), Some("AZUL"));
        // AZUL belongs to the hardcoded {AZUL, TURQUESA} group
        assert_eq!(first.similarity_group.as_deref(), Some("AZUL"));

        let second = service
            .process_color(client_id, "Azul marino")
            .await
            .unwrap()
            .unwrap();
        assert!(!second.is_new);
        assert_eq!(second.similarity_group.as_deref(), Some("AZUL"));
    }

    #[tokio::test]
    async fn test_usage_count_increments_per_encounter() {
        let service = service();
        let client_id = Uuid::new_v4();

        service.process_color(client_id, "Jean").await.unwrap();
        service.process_color(client_id, "Jean").await.unwrap();
        service.process_color(client_id, "Jean").await.unwrap();

        let mapping = service
            .store
            .find(client_id, "Jean")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(mapping.usage_count, 3);
    }

    #[tokio::test]
    async fn test_unknown_color_seeds_its_own_group() {
        let service = service();
        let client_id = Uuid::new_v4();

        // VERDE is canonical but belongs to no hardcoded group
        let processed = service
            .process_color(client_id, "verde")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(processed.similarity_group.as_deref(), Some("VERDE"));
    }

    #[tokio::test]
    async fn test_grouping_is_scoped_per_client() {
        let service = service();
        let client_a = Uuid::new_v4();
        let client_b = Uuid::new_v4();

        service.process_color(client_a, "verde").await.unwrap();
        service
            .merge_into_group(client_a, &["verde".to_string()], "BOSQUE")
            .await
            .unwrap();

        let processed_b = service
            .process_color(client_b, "verde")
            .await
            .unwrap()
            .unwrap();

        let mapping_a = service.store.find(client_a, "verde").await.unwrap().unwrap();
        assert_eq!(mapping_a.similarity_group.as_deref(), Some("BOSQUE"));
        assert_eq!(processed_b.similarity_group.as_deref(), Some("VERDE"));
    }

    #[tokio::test]
    async fn test_similar_raw_colors_for_search() {
        let service = service();
        let client_id = Uuid::new_v4();

        service.process_color(client_id, "beige claro").await.unwrap();
        service.process_color(client_id, "marron chocolate").await.unwrap();

        // both land in the hardcoded BEIGE group
        let mut raw = service
            .similar_raw_colors_for_search(client_id, "beige")
            .await
            .unwrap();
        raw.sort();
        assert_eq!(raw, vec!["beige claro", "marron chocolate"]);
    }

    #[tokio::test]
    async fn test_similar_raw_colors_falls_back_to_detected() {
        let service = service();
        let raw = service
            .similar_raw_colors_for_search(Uuid::new_v4(), "coral")
            .await
            .unwrap();
        assert_eq!(raw, vec!["coral"]);
    }
}
