//! Catalog search orchestration.
//!
//! Ties the pieces together for one query: embed it once, shortlist
//! candidate categories through their centroids, score the candidates'
//! image embeddings brute-force, and hand the scored list to the
//! three-layer optimizer. Missing pieces degrade rather than failing a
//! servable query: a catalog without centroids is scanned whole, and a
//! missing weight config falls back to the balanced preset.

use std::collections::HashMap;
use std::sync::Arc;

use ahash::AHashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::image::CatalogImage;
use crate::catalog::product::Product;
use crate::catalog::repository::{BlobResolver, CatalogRepository};
use crate::centroid::CentroidCache;
use crate::config::RuntimeConfig;
use crate::embedding::context::EmbeddingContext;
use crate::embedding::generator::ContextualEmbeddingGenerator;
use crate::error::Result;
use crate::ranking::{RankedResult, RawSearchResult, SearchOptimizer, WeightConfig};
use crate::vector::EmbeddingVector;
use crate::vector::similarity::batch_cosine_similarity;

/// Per-query options.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Cap on returned results; falls back to the configured default.
    pub limit: Option<usize>,
    /// Minimum visual similarity; falls back to the configured floor.
    pub similarity_floor: Option<f32>,
    /// Attributes detected on the query image (color, brand, etc.).
    pub detected_attributes: HashMap<String, String>,
}

/// End-to-end visual search over one client's catalog.
pub struct CatalogSearchEngine {
    repo: Arc<dyn CatalogRepository>,
    blobs: Arc<dyn BlobResolver>,
    generator: Arc<ContextualEmbeddingGenerator>,
    centroids: Arc<CentroidCache>,
    config: Arc<RuntimeConfig>,
}

impl CatalogSearchEngine {
    /// Assemble an engine from its parts.
    pub fn new(
        repo: Arc<dyn CatalogRepository>,
        blobs: Arc<dyn BlobResolver>,
        generator: Arc<ContextualEmbeddingGenerator>,
        centroids: Arc<CentroidCache>,
        config: Arc<RuntimeConfig>,
    ) -> Self {
        Self {
            repo,
            blobs,
            generator,
            centroids,
            config,
        }
    }

    /// Search by query image.
    pub async fn search_by_image(
        &self,
        client_id: Uuid,
        image: &[u8],
        options: &SearchOptions,
    ) -> Result<Vec<RankedResult>> {
        let (query_embedding, metadata) = self.generator.generate(image, None).await?;
        debug!(method = %metadata.method, "query image embedded");
        self.run_search(client_id, query_embedding, options).await
    }

    /// Search by free-text query.
    pub async fn search_by_text(
        &self,
        client_id: Uuid,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<RankedResult>> {
        let (query_embedding, _) = self.generator.generate_for_text(query).await?;
        self.run_search(client_id, query_embedding, options).await
    }

    /// Fetch a catalog image's bytes and embed them with context.
    ///
    /// Drives the per-image half of batch processing. Network and decode
    /// failures propagate without retry; the collaborator decides whether
    /// to mark the image failed or skip it.
    pub async fn embed_catalog_image(
        &self,
        image: &CatalogImage,
        context: Option<&EmbeddingContext>,
    ) -> Result<(EmbeddingVector, crate::embedding::EmbeddingMetadata)> {
        let bytes = self.blobs.fetch_bytes(&image.url).await?;
        self.generator.generate(&bytes, context).await
    }

    async fn run_search(
        &self,
        client_id: Uuid,
        query_embedding: EmbeddingVector,
        options: &SearchOptions,
    ) -> Result<Vec<RankedResult>> {
        let snapshot = self.config.snapshot();
        let limit = options.limit.unwrap_or(snapshot.max_results);
        let floor = options.similarity_floor.unwrap_or(snapshot.similarity_floor);

        let categories = self.repo.categories_for_client(client_id).await?;
        if categories.is_empty() {
            warn!(client = %client_id, "no categories, empty result");
            return Ok(Vec::new());
        }

        // Shortlist through centroids; an inconclusive shortlist degrades
        // to scanning every active category.
        let shortlisted = self
            .centroids
            .shortlist(
                &query_embedding,
                &categories,
                snapshot.shortlist_confidence,
                snapshot.shortlist_margin,
            )
            .await?;

        let category_ids: Vec<Uuid> = if shortlisted.is_empty() {
            debug!(client = %client_id, "shortlist inconclusive, scanning all active categories");
            categories
                .iter()
                .filter(|category| category.is_active)
                .map(|category| category.id)
                .collect()
        } else {
            debug!(
                client = %client_id,
                candidates = shortlisted.len(),
                best = shortlisted[0].similarity,
                "categories shortlisted"
            );
            shortlisted.iter().map(|m| m.category_id).collect()
        };

        let products = self.repo.products_in_categories(&category_ids).await?;
        if products.is_empty() {
            return Ok(Vec::new());
        }

        // Representative embedding per product: its primary completed
        // image, else the first completed one.
        let mut product_embeddings: AHashMap<Uuid, (bool, EmbeddingVector)> = AHashMap::new();
        for &category_id in &category_ids {
            for image in self.repo.images_for_category(category_id).await? {
                let Some(embedding) = image.completed_embedding() else {
                    continue;
                };
                match product_embeddings.get(&image.product_id) {
                    Some((true, _)) => {}
                    Some((false, _)) if !image.is_primary => {}
                    _ => {
                        product_embeddings
                            .insert(image.product_id, (image.is_primary, embedding.clone()));
                    }
                }
            }
        }

        // Brute-force cosine over every candidate, batched.
        let candidates: Vec<(Product, EmbeddingVector)> = products
            .into_iter()
            .filter_map(|product| {
                product_embeddings
                    .get(&product.id)
                    .map(|(_, embedding)| (product, embedding.clone()))
            })
            .collect();
        let embeddings: Vec<EmbeddingVector> = candidates
            .iter()
            .map(|(_, embedding)| embedding.clone())
            .collect();
        let scores = batch_cosine_similarity(&query_embedding, &embeddings)?;

        let raw_results: Vec<RawSearchResult> = candidates
            .into_iter()
            .zip(scores)
            .filter(|(_, similarity)| *similarity >= floor)
            .map(|((product, _), similarity)| RawSearchResult::new(product, similarity))
            .collect();

        info!(
            client = %client_id,
            candidates = raw_results.len(),
            floor,
            "visual scoring complete"
        );

        // A client without a stored weight config still gets ranked
        // results, just with the balanced preset.
        let weight_config = match self.repo.weight_config(client_id).await {
            Ok(config) => config,
            Err(err) => {
                warn!(client = %client_id, error = %err, "weight config unavailable, using balanced preset");
                WeightConfig::default()
            }
        };

        let optimizer = SearchOptimizer::new(weight_config)?;
        let mut ranked = optimizer.rank(raw_results, &options.detected_attributes);
        ranked.truncate(limit);
        Ok(ranked)
    }
}

impl std::fmt::Debug for CatalogSearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogSearchEngine").finish()
    }
}
