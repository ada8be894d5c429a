//! Contextual embedding generation through the shared inference model.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{EmbeddingCache, content_key};
use crate::embedding::context::{EmbeddingContext, contextual_prompts};
use crate::error::Result;
use crate::model::lifecycle::ModelLifecycleManager;
use crate::vector::{EmbeddingVector, mean_pairwise_similarity, weighted_mean};

/// Fusion weight of the baseline image embedding.
const BASE_WEIGHT: f32 = 1.5;

/// Fusion weight of each contextual embedding.
const CONTEXTUAL_WEIGHT: f32 = 1.0;

/// Contextual weight boost applied for high-confidence categories.
const HIGH_CONFIDENCE_BOOST: f32 = 1.2;

/// Category confidence threshold above which the boost kicks in.
const HIGH_CONFIDENCE_THRESHOLD: f32 = 0.8;

/// Image/text mix of one contextual embedding.
const JOINT_IMAGE_WEIGHT: f32 = 0.75;
const JOINT_TEXT_WEIGHT: f32 = 0.25;

/// How a fused embedding came to be.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingMetadata {
    /// Generation method: `contextual_fusion`, `simple` or `text`.
    pub method: String,
    /// The prompts that produced contextual embeddings, in order.
    pub prompts_used: Vec<String>,
    /// How many embeddings were fused (1 = baseline only).
    pub num_fused: usize,
    /// Mean pairwise cosine similarity across the fused set.
    pub confidence: f32,
}

/// Produces one normalized embedding for an image (or text) plus optional
/// business context.
///
/// The model is borrowed per call through the [`ModelLifecycleManager`];
/// inference runs outside the manager's lock, so concurrent generations
/// proceed in parallel on an already-loaded model.
pub struct ContextualEmbeddingGenerator {
    models: Arc<ModelLifecycleManager>,
    cache: Option<Arc<dyn EmbeddingCache>>,
}

impl ContextualEmbeddingGenerator {
    /// Generator without an embedding cache.
    pub fn new(models: Arc<ModelLifecycleManager>) -> Self {
        Self {
            models,
            cache: None,
        }
    }

    /// Generator with a content-addressed embedding cache.
    pub fn with_cache(models: Arc<ModelLifecycleManager>, cache: Arc<dyn EmbeddingCache>) -> Self {
        Self {
            models,
            cache: Some(cache),
        }
    }

    /// Embed an image, fusing in contextual prompts when context is given.
    ///
    /// Without context (or without a category in it) the result is the
    /// baseline image embedding with confidence 1.0. A prompt whose
    /// embedding fails is logged and skipped; only an undecodable image or
    /// a failing baseline is fatal to the call.
    pub async fn generate(
        &self,
        image: &[u8],
        context: Option<&EmbeddingContext>,
    ) -> Result<(EmbeddingVector, EmbeddingMetadata)> {
        let prompts = context.map(contextual_prompts).unwrap_or_default();

        let cache_key = content_key(image, &prompts);
        if let Some(cached) = self.cache_get(&cache_key).await {
            debug!(key = %cache_key, "embedding cache hit");
            let metadata = EmbeddingMetadata {
                method: "cached".to_string(),
                prompts_used: prompts,
                num_fused: 1,
                confidence: 1.0,
            };
            return Ok((cached, metadata));
        }

        let model = self.models.acquire().await?;

        let base = model.embed_image(image)?;

        let mut fused_set = vec![base.clone()];
        let mut prompts_used = Vec::new();

        for prompt in &prompts {
            match model.embed_text(prompt) {
                Ok(text_embedding) => {
                    match joint_embedding(&base, &text_embedding) {
                        Ok(joint) => {
                            fused_set.push(joint);
                            prompts_used.push(prompt.clone());
                        }
                        Err(err) => {
                            warn!(prompt = %prompt, error = %err, "skipping contextual prompt");
                        }
                    }
                }
                Err(err) => {
                    warn!(prompt = %prompt, error = %err, "skipping contextual prompt");
                }
            }
        }

        let confidence_threshold = context.and_then(|c| c.confidence_threshold);
        let final_embedding = fuse(&fused_set, confidence_threshold)?;

        let metadata = EmbeddingMetadata {
            method: if fused_set.len() > 1 {
                "contextual_fusion".to_string()
            } else {
                "simple".to_string()
            },
            prompts_used,
            num_fused: fused_set.len(),
            confidence: mean_pairwise_similarity(&fused_set),
        };

        debug!(
            method = %metadata.method,
            num_fused = metadata.num_fused,
            confidence = metadata.confidence,
            "embedding generated"
        );

        self.cache_put(&cache_key, &final_embedding).await;

        Ok((final_embedding, metadata))
    }

    /// Embed raw query text for text-to-catalog search.
    pub async fn generate_for_text(
        &self,
        text: &str,
    ) -> Result<(EmbeddingVector, EmbeddingMetadata)> {
        let model = self.models.acquire().await?;
        let embedding = model.embed_text(text)?.normalized();

        Ok((
            embedding,
            EmbeddingMetadata {
                method: "text".to_string(),
                prompts_used: Vec::new(),
                num_fused: 1,
                confidence: 1.0,
            },
        ))
    }

    async fn cache_get(&self, key: &str) -> Option<EmbeddingVector> {
        let cache = self.cache.as_ref()?;
        match cache.get(key).await {
            Ok(hit) => hit,
            Err(err) => {
                warn!(error = %err, "embedding cache read failed, recomputing");
                None
            }
        }
    }

    async fn cache_put(&self, key: &str, embedding: &EmbeddingVector) {
        if let Some(cache) = &self.cache {
            if let Err(err) = cache.put(key, embedding).await {
                warn!(error = %err, "embedding cache write failed");
            }
        }
    }
}

impl std::fmt::Debug for ContextualEmbeddingGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextualEmbeddingGenerator")
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

/// Mix one prompt's text embedding with the image embedding.
fn joint_embedding(
    image: &EmbeddingVector,
    text: &EmbeddingVector,
) -> Result<EmbeddingVector> {
    weighted_mean(
        &[image.clone(), text.clone()],
        &[JOINT_IMAGE_WEIGHT, JOINT_TEXT_WEIGHT],
    )
}

/// Fuse the baseline and contextual embeddings with adaptive weights.
///
/// The baseline carries [`BASE_WEIGHT`]; contextual members carry
/// [`CONTEXTUAL_WEIGHT`], boosted by 20% when the category's confidence
/// threshold exceeds [`HIGH_CONFIDENCE_THRESHOLD`]. The fused vector is
/// re-normalized to unit length.
fn fuse(
    embeddings: &[EmbeddingVector],
    confidence_threshold: Option<f32>,
) -> Result<EmbeddingVector> {
    if embeddings.len() == 1 {
        return Ok(embeddings[0].normalized());
    }

    let mut weights = vec![BASE_WEIGHT];
    let contextual_weight =
        if confidence_threshold.is_some_and(|t| t > HIGH_CONFIDENCE_THRESHOLD) {
            CONTEXTUAL_WEIGHT * HIGH_CONFIDENCE_BOOST
        } else {
            CONTEXTUAL_WEIGHT
        };
    weights.extend(std::iter::repeat_n(contextual_weight, embeddings.len() - 1));

    let mut fused = weighted_mean(embeddings, &weights)?;
    fused.normalize();
    Ok(fused)
}
