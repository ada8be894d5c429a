//! Per-category centroid cache.
//!
//! A category's centroid, the normalized mean of its completed image
//! embeddings, lets a query be matched against the whole category in
//! O(1) instead of against every member image. Centroids are recomputed
//! lazily when stale, or proactively after a processing batch.

use std::sync::Arc;

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::category::Category;
use crate::catalog::repository::CatalogRepository;
use crate::error::{Result, VisuraError};
use crate::vector::{EmbeddingVector, cosine_similarity, mean_of};

/// One stored category centroid.
///
/// Never partially written: a recompute either fully replaces the record
/// or leaves the previous one intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCentroid {
    /// Normalized mean of the member image embeddings.
    pub vector: EmbeddingVector,
    /// How many completed images were folded in.
    pub image_count: usize,
    /// When the centroid was last recomputed.
    pub updated_at: DateTime<Utc>,
}

/// One category match from a centroid shortlist.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryMatch {
    /// Matched category.
    pub category_id: Uuid,
    /// Cosine similarity between the query and the centroid.
    pub similarity: f32,
}

/// Cache of per-category centroids over the catalog repository.
///
/// Centroid computation reads a potentially-changing set of image rows
/// without transactional isolation; a centroid may briefly reflect a stale
/// image set, which self-corrects on the next [`get`](Self::get).
pub struct CentroidCache {
    repo: Arc<dyn CatalogRepository>,
    entries: RwLock<AHashMap<Uuid, CategoryCentroid>>,
}

impl CentroidCache {
    /// Create an empty cache over a repository.
    pub fn new(repo: Arc<dyn CatalogRepository>) -> Self {
        Self {
            repo,
            entries: RwLock::new(AHashMap::new()),
        }
    }

    /// The centroid for a category, recomputing when absent or stale.
    ///
    /// Staleness: the stored fold count is compared against the current
    /// count of completed images; any mismatch forces a recompute. Returns
    /// `None` only when the category has zero completed embeddings.
    ///
    /// A recompute failure is logged and the prior centroid, when one
    /// exists, keeps serving.
    pub async fn get(&self, category_id: Uuid) -> Result<Option<EmbeddingVector>> {
        let stored = self.entries.read().get(&category_id).cloned();

        let embeddings = match self.completed_embeddings(category_id).await {
            Ok(embeddings) => embeddings,
            Err(err) => {
                return match stored {
                    Some(centroid) => {
                        warn!(
                            category = %category_id,
                            error = %err,
                            "centroid refresh failed, serving previous centroid"
                        );
                        Ok(Some(centroid.vector))
                    }
                    None => Err(VisuraError::centroid(format!(
                        "cannot compute centroid for {category_id}: {err}"
                    ))),
                };
            }
        };

        if let Some(centroid) = &stored {
            if centroid.image_count == embeddings.len() {
                return Ok(Some(centroid.vector.clone()));
            }
            debug!(
                category = %category_id,
                stored = centroid.image_count,
                current = embeddings.len(),
                "centroid stale, recomputing"
            );
        }

        Ok(self.store_computed(category_id, &embeddings))
    }

    /// Proactively recompute the centroids of every category a processing
    /// batch touched, so the next search hits warm entries.
    ///
    /// Returns how many categories now hold a centroid. Per-category
    /// failures are logged and skipped.
    pub async fn refresh_batch(&self, category_ids: &[Uuid]) -> usize {
        let mut refreshed = 0;
        for &category_id in category_ids {
            match self.completed_embeddings(category_id).await {
                Ok(embeddings) => {
                    if self.store_computed(category_id, &embeddings).is_some() {
                        refreshed += 1;
                    }
                }
                Err(err) => {
                    warn!(
                        category = %category_id,
                        error = %err,
                        "batch centroid refresh failed for category"
                    );
                }
            }
        }

        info!(
            requested = category_ids.len(),
            refreshed, "batch centroid refresh complete"
        );
        refreshed
    }

    /// Drop a cached centroid so the next `get` recomputes it.
    pub fn invalidate(&self, category_id: Uuid) {
        self.entries.write().remove(&category_id);
    }

    /// Shortlist candidate categories for a query embedding.
    ///
    /// Compares the query against every active category's centroid. The
    /// best match must clear `confidence_floor` for anything to be
    /// returned; runner-up categories within `margin` of the winner are
    /// included so callers search both rather than guessing.
    pub async fn shortlist(
        &self,
        query: &EmbeddingVector,
        categories: &[Category],
        confidence_floor: f32,
        margin: f32,
    ) -> Result<Vec<CategoryMatch>> {
        let mut matches = Vec::new();

        for category in categories.iter().filter(|c| c.is_active) {
            let Some(centroid) = self.get(category.id).await? else {
                debug!(category = %category.id, "no centroid, skipping in shortlist");
                continue;
            };
            let similarity = cosine_similarity(query, &centroid)?;
            matches.push(CategoryMatch {
                category_id: category.id,
                similarity,
            });
        }

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let Some(best) = matches.first() else {
            return Ok(Vec::new());
        };

        if best.similarity < confidence_floor {
            debug!(
                best = best.similarity,
                floor = confidence_floor,
                "no category cleared the confidence floor"
            );
            return Ok(Vec::new());
        }

        let cutoff = best.similarity - margin;
        matches.retain(|m| m.similarity >= cutoff);
        Ok(matches)
    }

    /// All completed embeddings currently in the category.
    async fn completed_embeddings(&self, category_id: Uuid) -> Result<Vec<EmbeddingVector>> {
        let images = self.repo.images_for_category(category_id).await?;
        Ok(images
            .iter()
            .filter_map(|image| image.completed_embedding().cloned())
            .collect())
    }

    /// Compute and store a centroid; `None` when there is nothing to fold.
    fn store_computed(
        &self,
        category_id: Uuid,
        embeddings: &[EmbeddingVector],
    ) -> Option<EmbeddingVector> {
        let Some(vector) = mean_of(embeddings) else {
            // zero completed images: drop any stale record
            self.entries.write().remove(&category_id);
            return None;
        };

        let centroid = CategoryCentroid {
            vector: vector.clone(),
            image_count: embeddings.len(),
            updated_at: Utc::now(),
        };

        debug!(
            category = %category_id,
            images = centroid.image_count,
            "centroid updated"
        );
        self.entries.write().insert(category_id, centroid);
        Some(vector)
    }
}

impl std::fmt::Debug for CentroidCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CentroidCache")
            .field("entries", &self.entries.read().len())
            .finish()
    }
}
