//! Contextual embedding generation.
//!
//! Fuses a baseline image embedding with context-conditioned variants so
//! that a white shirt photographed for a medical-wear catalog and one for a
//! fashion catalog land in measurably different neighborhoods.

pub mod context;
pub mod generator;

pub use context::{EmbeddingContext, contextual_prompts};
pub use generator::{ContextualEmbeddingGenerator, EmbeddingMetadata};
