//! Inference model ownership: loading, sharing and idle eviction.
//!
//! The vision-language model is the only process-wide mutable shared state
//! in this crate. [`ModelLifecycleManager`] owns it explicitly: lifetime
//! and thread-safety live in its type, not in module globals.

#[cfg(feature = "embeddings-multimodal")]
pub mod clip;
pub mod inference;
pub mod lifecycle;

#[cfg(feature = "embeddings-multimodal")]
pub use clip::{CandleClipLoader, CandleClipModel};
pub use inference::{ModelLoader, VisionLanguageModel};
pub use lifecycle::ModelLifecycleManager;
