//! Embedding vector primitives shared by every component.

pub mod embedding;
pub mod similarity;

pub use embedding::{EMBEDDING_DIM, EmbeddingVector, UNIT_NORM_TOLERANCE};
pub use similarity::{cosine_similarity, mean_of, mean_pairwise_similarity, weighted_mean};
