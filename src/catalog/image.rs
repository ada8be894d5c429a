//! Catalog image model and its processing lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::vector::EmbeddingVector;

/// Embedding-processing state of a catalog image.
///
/// This is the single canonical state for an image. The upstream store
/// historically carried both an `is_processed` flag and an `upload_status`
/// string that could drift apart; [`ProcessingState::from_legacy`] folds
/// both into this enum, with the flag winning when they disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    /// Uploaded, not yet picked up by the batch processor.
    #[default]
    Pending,
    /// Currently being embedded.
    Processing,
    /// Embedding generated and stored.
    Completed,
    /// Embedding generation failed; see the image's error message.
    Failed,
}

impl ProcessingState {
    /// Map the legacy `(is_processed, upload_status)` pair onto the enum.
    pub fn from_legacy(is_processed: bool, upload_status: &str) -> Self {
        if is_processed {
            return ProcessingState::Completed;
        }
        match upload_status {
            "completed" => ProcessingState::Completed,
            "processing" => ProcessingState::Processing,
            "failed" => ProcessingState::Failed,
            _ => ProcessingState::Pending,
        }
    }

    /// Whether this state carries a usable embedding.
    pub fn is_completed(&self) -> bool {
        matches!(self, ProcessingState::Completed)
    }

    /// String form matching the upstream status column.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingState::Pending => "pending",
            ProcessingState::Processing => "processing",
            ProcessingState::Completed => "completed",
            ProcessingState::Failed => "failed",
        }
    }
}

/// An image belonging to exactly one product.
///
/// Created on upload; its embedding is populated by the batch-processing
/// collaborator. The ranking core reads images but never mutates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogImage {
    /// Image identifier.
    pub id: Uuid,
    /// Owning product.
    pub product_id: Uuid,
    /// Blob-store URL for the raw bytes.
    pub url: String,
    /// Embedding, present once processing completed.
    pub embedding: Option<EmbeddingVector>,
    /// Processing lifecycle state.
    pub state: ProcessingState,
    /// Failure detail when `state == Failed`.
    pub error_message: Option<String>,
    /// Whether this is the product's primary image.
    pub is_primary: bool,
    /// Upload timestamp.
    pub created_at: DateTime<Utc>,
}

impl CatalogImage {
    /// Create a freshly uploaded image in `Pending` state.
    pub fn new(product_id: Uuid, url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id,
            url: url.into(),
            embedding: None,
            state: ProcessingState::Pending,
            error_message: None,
            is_primary: false,
            created_at: Utc::now(),
        }
    }

    /// The embedding, if processing completed and stored one.
    pub fn completed_embedding(&self) -> Option<&EmbeddingVector> {
        if self.state.is_completed() {
            self.embedding.as_ref()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_legacy_flag_wins() {
        // is_processed set while upload_status lagged behind
        assert_eq!(
            ProcessingState::from_legacy(true, "pending"),
            ProcessingState::Completed
        );
    }

    #[test]
    fn test_from_legacy_status_mapping() {
        assert_eq!(
            ProcessingState::from_legacy(false, "processing"),
            ProcessingState::Processing
        );
        assert_eq!(
            ProcessingState::from_legacy(false, "failed"),
            ProcessingState::Failed
        );
        assert_eq!(
            ProcessingState::from_legacy(false, "anything-else"),
            ProcessingState::Pending
        );
    }

    #[test]
    fn test_as_str_round_trips_through_from_legacy() {
        for state in [
            ProcessingState::Pending,
            ProcessingState::Processing,
            ProcessingState::Completed,
            ProcessingState::Failed,
        ] {
            assert_eq!(ProcessingState::from_legacy(false, state.as_str()), state);
        }
    }

    #[test]
    fn test_completed_embedding_requires_completed_state() {
        let mut image = CatalogImage::new(Uuid::new_v4(), "https://cdn/img.jpg");
        image.embedding = Some(EmbeddingVector::new(vec![1.0, 0.0]));

        assert!(image.completed_embedding().is_none());

        image.state = ProcessingState::Completed;
        assert!(image.completed_embedding().is_some());
    }
}
