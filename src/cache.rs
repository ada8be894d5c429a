//! Key-value cache port for generated embeddings.
//!
//! The deployment supplies the real cache (Redis or similar) behind
//! [`EmbeddingCache`]; [`MokaEmbeddingCache`] is the in-process default.
//! Cache failures degrade to recomputation and never fail a request.

use std::time::Duration;

use async_trait::async_trait;
use moka::sync::Cache;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::vector::EmbeddingVector;

/// Default capacity of the in-process embedding cache.
const DEFAULT_CAPACITY: u64 = 10_000;

/// Default time-to-live of cached embeddings (24 hours).
const DEFAULT_TTL: Duration = Duration::from_secs(86_400);

/// Key-value cache of embeddings, keyed by content hash.
#[async_trait]
pub trait EmbeddingCache: Send + Sync {
    /// Fetch a cached embedding.
    async fn get(&self, key: &str) -> Result<Option<EmbeddingVector>>;

    /// Store an embedding.
    async fn put(&self, key: &str, embedding: &EmbeddingVector) -> Result<()>;
}

/// Content-addressed cache key over image bytes and the prompts in play.
///
/// The prompts participate because the same image embeds differently under
/// different contextual prompts.
pub fn content_key(bytes: &[u8], prompts: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    for prompt in prompts {
        hasher.update([0u8]);
        hasher.update(prompt.as_bytes());
    }
    format!("emb:{}", hex::encode(hasher.finalize()))
}

/// In-process embedding cache backed by moka.
#[derive(Clone)]
pub struct MokaEmbeddingCache {
    cache: Cache<String, EmbeddingVector>,
}

impl MokaEmbeddingCache {
    /// Cache with default capacity and TTL.
    pub fn new() -> Self {
        Self::with_config(DEFAULT_CAPACITY, DEFAULT_TTL)
    }

    /// Cache with explicit capacity and TTL.
    pub fn with_config(capacity: u64, time_to_live: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(time_to_live)
            .build();
        Self { cache }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.cache.run_pending_tasks();
        self.cache.entry_count() as usize
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MokaEmbeddingCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MokaEmbeddingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaEmbeddingCache")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

#[async_trait]
impl EmbeddingCache for MokaEmbeddingCache {
    async fn get(&self, key: &str) -> Result<Option<EmbeddingVector>> {
        Ok(self.cache.get(key))
    }

    async fn put(&self, key: &str, embedding: &EmbeddingVector) -> Result<()> {
        self.cache.insert(key.to_string(), embedding.clone());
        Ok(())
    }
}
