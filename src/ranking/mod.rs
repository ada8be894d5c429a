//! Three-layer weighted ranking over candidate products.
//!
//! The [`SearchOptimizer`] combines visual similarity, structured-attribute
//! matching and business signals into one ordering, weighted per client by
//! a validated [`WeightConfig`].

pub mod config;
pub mod optimizer;

pub use config::{AttributeWeight, WEIGHT_SUM_TOLERANCE, WeightConfig, WeightPreset};
pub use optimizer::{RankedResult, RawSearchResult, ScoreBreakdown, SearchOptimizer};
