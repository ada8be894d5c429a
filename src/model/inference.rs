//! Inference model abstractions.
//!
//! The lifecycle manager and embedding generator are written against these
//! traits so the heavy candle-backed implementation stays behind the
//! `embeddings-multimodal` feature and tests can substitute deterministic
//! models.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::vector::EmbeddingVector;

/// A loaded vision-language model plus its pre-processing pipeline.
///
/// Implementations embed images and text into one shared vector space and
/// return L2-normalized vectors. Inference is CPU/GPU-bound and blocking
/// from the caller's point of view; implementations must be safe to call
/// concurrently from many tasks, since callers run inference outside the
/// lifecycle manager's lock.
pub trait VisionLanguageModel: Send + Sync + Debug {
    /// The identifier this model was loaded from.
    fn model_id(&self) -> &str;

    /// Dimensionality of the shared embedding space.
    fn dimension(&self) -> usize;

    /// Embed raw image bytes.
    ///
    /// # Errors
    ///
    /// Returns [`VisuraError::Decode`](crate::error::VisuraError) when the
    /// bytes do not decode to a raster image, and
    /// [`VisuraError::EmbeddingGeneration`](crate::error::VisuraError) when
    /// inference itself fails.
    fn embed_image(&self, bytes: &[u8]) -> Result<EmbeddingVector>;

    /// Embed a text snippet.
    fn embed_text(&self, text: &str) -> Result<EmbeddingVector>;
}

/// Loads a model by identifier.
///
/// Loading downloads weights on first use and is expensive (tens of
/// seconds); the lifecycle manager makes sure it happens at most once per
/// configured model.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Load and initialize the model behind `model_id`.
    ///
    /// # Errors
    ///
    /// Returns [`VisuraError::ModelLoad`](crate::error::VisuraError) when
    /// download or initialization fails. A failed load leaves nothing
    /// behind; the next attempt starts from scratch.
    async fn load(&self, model_id: &str) -> Result<Arc<dyn VisionLanguageModel>>;
}
