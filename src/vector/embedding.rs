//! Core embedding vector data structure.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VisuraError};

/// Dimensionality of the shared text/image embedding space.
pub const EMBEDDING_DIM: usize = 512;

/// Tolerance for the unit-norm invariant of stored embeddings.
pub const UNIT_NORM_TOLERANCE: f32 = 1e-4;

/// A dense embedding vector in the shared similarity space.
///
/// Produced by the inference model for images and text, and derived for
/// category centroids. Stored vectors are L2-normalized: `norm() == 1.0`
/// within [`UNIT_NORM_TOLERANCE`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingVector {
    /// The vector dimensions as floating point values.
    pub data: Vec<f32>,
}

impl EmbeddingVector {
    /// Create a new vector with the given dimensions.
    pub fn new(data: Vec<f32>) -> Self {
        Self { data }
    }

    /// Get the dimensionality of this vector.
    pub fn dimension(&self) -> usize {
        self.data.len()
    }

    /// Calculate the L2 norm (magnitude) of this vector.
    pub fn norm(&self) -> f32 {
        self.data.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    /// Normalize this vector to unit length.
    ///
    /// Zero vectors are left untouched.
    pub fn normalize(&mut self) {
        let norm = self.norm();
        if norm > 0.0 {
            for value in &mut self.data {
                *value /= norm;
            }
        }
    }

    /// Get a normalized copy of this vector.
    pub fn normalized(&self) -> Self {
        let mut normalized = self.clone();
        normalized.normalize();
        normalized
    }

    /// Check whether this vector satisfies the storage invariant.
    pub fn is_unit_norm(&self) -> bool {
        (self.norm() - 1.0).abs() <= UNIT_NORM_TOLERANCE
    }

    /// Validate that this vector has the expected dimension.
    pub fn validate_dimension(&self, expected_dim: usize) -> Result<()> {
        if self.data.len() != expected_dim {
            return Err(VisuraError::InvalidOperation(format!(
                "Vector dimension mismatch: expected {}, got {}",
                expected_dim,
                self.data.len()
            )));
        }
        Ok(())
    }

    /// Check if this vector contains any NaN or infinite values.
    pub fn is_valid(&self) -> bool {
        self.data.iter().all(|x| x.is_finite())
    }

    /// Normalize multiple vectors in parallel.
    pub fn normalize_batch_parallel(vectors: &mut [EmbeddingVector]) {
        if vectors.len() > 10 {
            vectors.par_iter_mut().for_each(|vector| vector.normalize());
        } else {
            for vector in vectors {
                vector.normalize();
            }
        }
    }
}

impl From<Vec<f32>> for EmbeddingVector {
    fn from(data: Vec<f32>) -> Self {
        Self::new(data)
    }
}
