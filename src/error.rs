//! Error types for the Visura library.
//!
//! All fallible operations return [`Result`], whose error side is the
//! [`VisuraError`] enum. Errors are not retried anywhere inside this crate;
//! retry policy belongs to the batch-processing collaborator that drives it.
//!
//! # Examples
//!
//! ```
//! use visura::error::{Result, VisuraError};
//!
//! fn example_operation() -> Result<()> {
//!     Err(VisuraError::invalid_argument("Invalid input"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use anyhow;
use thiserror::Error;

/// The main error type for Visura operations.
///
/// Fatality scope varies by variant: a [`VisuraError::ModelLoad`] is fatal to
/// the triggering call but leaves the lifecycle manager ready for the next
/// attempt, an [`VisuraError::EmbeddingGeneration`] fails a single image, and
/// an [`VisuraError::InvalidWeightConfig`] is fatal at construction and must
/// be fixed by the configuration owner.
#[derive(Error, Debug)]
pub enum VisuraError {
    /// I/O errors (file operations, blob fetches, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The inference model could not be loaded or initialized.
    #[error("Model load error: {0}")]
    ModelLoad(String),

    /// Embedding generation failed for one input.
    #[error("Embedding generation error: {0}")]
    EmbeddingGeneration(String),

    /// Ranking weights violate the construction invariants.
    #[error("Invalid weight config: {0}")]
    InvalidWeightConfig(String),

    /// A category centroid could not be recomputed.
    #[error("Centroid computation error: {0}")]
    CentroidComputation(String),

    /// An image payload could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A network-facing collaborator failed.
    #[error("Network error: {0}")]
    Network(String),

    /// Configuration-related errors
    #[error("Config error: {0}")]
    Config(String),

    /// Repository or store lookups that found nothing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid operation
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with VisuraError.
pub type Result<T> = std::result::Result<T, VisuraError>;

impl VisuraError {
    /// Create a new model load error.
    pub fn model_load<S: Into<String>>(msg: S) -> Self {
        VisuraError::ModelLoad(msg.into())
    }

    /// Create a new embedding generation error.
    pub fn embedding<S: Into<String>>(msg: S) -> Self {
        VisuraError::EmbeddingGeneration(msg.into())
    }

    /// Create a new invalid weight config error.
    pub fn invalid_weight_config<S: Into<String>>(msg: S) -> Self {
        VisuraError::InvalidWeightConfig(msg.into())
    }

    /// Create a new centroid computation error.
    pub fn centroid<S: Into<String>>(msg: S) -> Self {
        VisuraError::CentroidComputation(msg.into())
    }

    /// Create a new decode error.
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        VisuraError::Decode(msg.into())
    }

    /// Create a new network error.
    pub fn network<S: Into<String>>(msg: S) -> Self {
        VisuraError::Network(msg.into())
    }

    /// Create a new config error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        VisuraError::Config(msg.into())
    }

    /// Create a new not found error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        VisuraError::NotFound(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        VisuraError::InvalidOperation(format!("Invalid argument: {}", msg.into()))
    }

    /// Create a new internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        VisuraError::Other(format!("Internal error: {}", msg.into()))
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        VisuraError::Other(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = VisuraError::model_load("weights download failed");
        assert_eq!(
            error.to_string(),
            "Model load error: weights download failed"
        );

        let error = VisuraError::invalid_weight_config("weights sum to 2.0");
        assert_eq!(
            error.to_string(),
            "Invalid weight config: weights sum to 2.0"
        );

        let error = VisuraError::centroid("no completed images");
        assert_eq!(
            error.to_string(),
            "Centroid computation error: no completed images"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let visura_error = VisuraError::from(io_error);

        match visura_error {
            VisuraError::Io(_) => {} // Expected
            _ => panic!("Expected IO error variant"),
        }
    }
}
