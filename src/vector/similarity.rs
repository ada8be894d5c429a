//! Similarity and aggregation math over embedding vectors.
//!
//! Catalog search compares a query against every candidate within the
//! shortlisted categories (brute force), so the batch path uses rayon once
//! the candidate set is large enough to amortize the fork.

use rayon::prelude::*;

use crate::error::{Result, VisuraError};
use crate::vector::embedding::EmbeddingVector;

/// Candidate count below which batch scoring stays sequential.
const PARALLEL_BATCH_THRESHOLD: usize = 100;

/// Calculate cosine similarity between two vectors.
///
/// Returns a value in [-1, 1]; zero vectors yield 0.0.
pub fn cosine_similarity(a: &EmbeddingVector, b: &EmbeddingVector) -> Result<f32> {
    if a.dimension() != b.dimension() {
        return Err(VisuraError::InvalidOperation(format!(
            "Vector dimensions must match for similarity: {} vs {}",
            a.dimension(),
            b.dimension()
        )));
    }

    let dot: f32 = a.data.iter().zip(b.data.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.norm();
    let norm_b = b.norm();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    Ok(dot / (norm_a * norm_b))
}

/// Score a query against many candidates, in parallel for large batches.
///
/// Returns one similarity per candidate, in input order.
pub fn batch_cosine_similarity(
    query: &EmbeddingVector,
    candidates: &[EmbeddingVector],
) -> Result<Vec<f32>> {
    if candidates.len() < PARALLEL_BATCH_THRESHOLD {
        return candidates
            .iter()
            .map(|candidate| cosine_similarity(query, candidate))
            .collect();
    }

    candidates
        .par_iter()
        .map(|candidate| cosine_similarity(query, candidate))
        .collect()
}

/// Arithmetic mean of a set of vectors, re-normalized to unit length.
///
/// Inputs are normalized individually before averaging, so one unusually
/// long vector cannot dominate the aggregate. Returns `None` for an empty
/// input set.
pub fn mean_of(vectors: &[EmbeddingVector]) -> Option<EmbeddingVector> {
    let first = vectors.first()?;
    let dimension = first.dimension();

    let mut accumulator = vec![0.0f32; dimension];
    for vector in vectors {
        let normalized = vector.normalized();
        for (slot, value) in accumulator.iter_mut().zip(normalized.data.iter()) {
            *slot += value;
        }
    }

    let count = vectors.len() as f32;
    for slot in &mut accumulator {
        *slot /= count;
    }

    let mut mean = EmbeddingVector::new(accumulator);
    mean.normalize();
    Some(mean)
}

/// Weighted mean of a set of vectors.
///
/// Weights are normalized to sum to 1.0 before averaging; the result is not
/// re-normalized here, so callers control when the final unit-length pass
/// happens.
pub fn weighted_mean(vectors: &[EmbeddingVector], weights: &[f32]) -> Result<EmbeddingVector> {
    if vectors.is_empty() {
        return Err(VisuraError::invalid_argument(
            "weighted_mean requires at least one vector",
        ));
    }
    if vectors.len() != weights.len() {
        return Err(VisuraError::invalid_argument(format!(
            "weighted_mean got {} vectors but {} weights",
            vectors.len(),
            weights.len()
        )));
    }

    let total: f32 = weights.iter().sum();
    if total <= 0.0 {
        return Err(VisuraError::invalid_argument(
            "weighted_mean requires a positive weight total",
        ));
    }

    let dimension = vectors[0].dimension();
    let mut accumulator = vec![0.0f32; dimension];
    for (vector, weight) in vectors.iter().zip(weights.iter()) {
        vector.validate_dimension(dimension)?;
        let scaled = weight / total;
        for (slot, value) in accumulator.iter_mut().zip(vector.data.iter()) {
            *slot += value * scaled;
        }
    }

    Ok(EmbeddingVector::new(accumulator))
}

/// Mean pairwise cosine similarity across a set of vectors.
///
/// Used as the confidence score of a fused embedding: tightly clustered
/// member embeddings mean the context agreed with the image. Returns 1.0
/// for fewer than two vectors.
pub fn mean_pairwise_similarity(vectors: &[EmbeddingVector]) -> f32 {
    if vectors.len() < 2 {
        return 1.0;
    }

    let normalized: Vec<EmbeddingVector> = vectors.iter().map(|v| v.normalized()).collect();

    let mut total = 0.0f32;
    let mut pairs = 0usize;
    for i in 0..normalized.len() {
        for j in (i + 1)..normalized.len() {
            if let Ok(similarity) = cosine_similarity(&normalized[i], &normalized[j]) {
                total += similarity;
                pairs += 1;
            }
        }
    }

    if pairs == 0 { 1.0 } else { total / pairs as f32 }
}
