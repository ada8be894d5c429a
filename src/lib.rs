//! # Visura
//!
//! A visual similarity ranking engine for multi-tenant product catalogs.
//!
//! Visura ranks catalog items by visual and semantic similarity to a query
//! image or text. It is a library: a thin serving layer owns HTTP,
//! authentication and storage, and drives these components.
//!
//! ## Components
//!
//! - [`model`]: shared inference-model lifecycle with idle eviction
//! - [`embedding`]: contextual embedding generation and fusion
//! - [`centroid`]: per-category centroid cache for O(1) category matching
//! - [`ranking`]: three-layer weighted result ranking
//! - [`color`]: free-text color normalization and per-client learning
//! - [`engine`]: end-to-end search orchestration over the above
//!
//! ## Example
//!
//! ```
//! use visura::ranking::{SearchOptimizer, WeightConfig};
//!
//! let optimizer = SearchOptimizer::new(WeightConfig::new(0.6, 0.3, 0.1)?)?;
//! let ranked = optimizer.rank(Vec::new(), &Default::default());
//! assert!(ranked.is_empty());
//! # Ok::<(), visura::error::VisuraError>(())
//! ```

pub mod cache;
pub mod catalog;
pub mod centroid;
pub mod color;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod model;
pub mod ranking;
pub mod vector;

pub use cache::{EmbeddingCache, MokaEmbeddingCache};
pub use catalog::{
    AttributeValue, BlobResolver, CatalogImage, CatalogRepository, Category, Product,
    ProcessingState,
};
pub use centroid::{CategoryCentroid, CategoryMatch, CentroidCache};
pub use color::{ColorLearningService, ColorNormalizer};
pub use config::{EngineConfig, RuntimeConfig};
pub use embedding::{ContextualEmbeddingGenerator, EmbeddingContext, EmbeddingMetadata};
pub use engine::{CatalogSearchEngine, SearchOptions};
pub use error::{Result, VisuraError};
pub use model::{ModelLifecycleManager, ModelLoader, VisionLanguageModel};
pub use ranking::{RankedResult, RawSearchResult, SearchOptimizer, WeightConfig};
pub use vector::{EMBEDDING_DIM, EmbeddingVector};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
