//! Color normalization: canonical vocabulary, perceptual grouping and
//! per-client learned mappings.
//!
//! Free-text color labels arrive in every spelling a merchant can invent
//! ("Azul marino", "jean", "beige claro"). [`ColorNormalizer`] maps them to
//! a small canonical vocabulary with a hardcoded fast path and a cached
//! semantic fallback; [`ColorLearningService`] persists what each client's
//! catalog taught us.

pub mod groups;
pub mod learning;
pub mod normalizer;

pub use groups::{SIMILAR_COLOR_GROUPS, normalize_gender, shared_perceptual_group};
pub use learning::{
    ColorLearningService, ColorMapping, ColorMappingStore, InMemoryColorMappingStore,
    ProcessedColor,
};
pub use normalizer::{ColorNormalizer, DEFAULT_SIMILARITY_THRESHOLD, SemanticNormalizer};
