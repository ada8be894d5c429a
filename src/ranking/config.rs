//! Per-client ranking weight configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VisuraError};

/// Allowed deviation of the three layer weights from summing to 1.0.
pub const WEIGHT_SUM_TOLERANCE: f32 = 0.01;

/// Configuration of one metadata attribute's contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeWeight {
    /// Whether this attribute participates in the metadata score.
    pub enabled: bool,
    /// Relative weight within the metadata layer.
    pub weight: f32,
}

impl AttributeWeight {
    /// Enabled attribute with the given weight.
    pub fn enabled(weight: f32) -> Self {
        Self {
            enabled: true,
            weight,
        }
    }

    /// Disabled attribute (kept around so the admin side can re-enable it).
    pub fn disabled(weight: f32) -> Self {
        Self {
            enabled: false,
            weight,
        }
    }
}

/// Named weight presets for quick per-client setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightPreset {
    /// Prioritize visual similarity (0.8 / 0.1 / 0.1).
    Visual,
    /// Prioritize attribute exactness (0.3 / 0.6 / 0.1).
    Metadata,
    /// Balanced configuration (0.6 / 0.3 / 0.1).
    Balanced,
}

impl WeightPreset {
    fn weights(self) -> (f32, f32, f32) {
        match self {
            WeightPreset::Visual => (0.8, 0.1, 0.1),
            WeightPreset::Metadata => (0.3, 0.6, 0.1),
            WeightPreset::Balanced => (0.6, 0.3, 0.1),
        }
    }
}

/// Default weight for a metadata attribute without explicit configuration.
fn default_attribute_weight(key: &str) -> f32 {
    match key {
        "color" | "brand" => 1.0,
        "pattern" => 0.8,
        "material" => 0.7,
        "style" => 0.6,
        _ => 0.5,
    }
}

/// Per-client weights for the three ranking layers.
///
/// Invariant: each top-level weight lies in [0, 1] and the three sum to
/// 1.0 within [`WEIGHT_SUM_TOLERANCE`]. Enforced at construction and on
/// every update; invalid configurations are rejected, never clamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightConfig {
    /// Weight of the visual similarity layer.
    pub visual_weight: f32,
    /// Weight of the attribute-matching layer.
    pub metadata_weight: f32,
    /// Weight of the business-signal layer.
    pub business_weight: f32,
    /// Per-attribute metadata configuration, keyed by lowercase name.
    #[serde(default)]
    pub metadata_attributes: HashMap<String, AttributeWeight>,
}

impl WeightConfig {
    /// Create a validated configuration.
    pub fn new(visual_weight: f32, metadata_weight: f32, business_weight: f32) -> Result<Self> {
        let config = Self {
            visual_weight,
            metadata_weight,
            business_weight,
            metadata_attributes: HashMap::new(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Create a configuration from a preset.
    pub fn preset(preset: WeightPreset) -> Self {
        let (visual, metadata, business) = preset.weights();
        Self {
            visual_weight: visual,
            metadata_weight: metadata,
            business_weight: business,
            metadata_attributes: HashMap::new(),
        }
    }

    /// Attach per-attribute metadata configuration.
    pub fn with_metadata_attributes(
        mut self,
        attributes: HashMap<String, AttributeWeight>,
    ) -> Self {
        self.metadata_attributes = attributes
            .into_iter()
            .map(|(key, value)| (key.to_lowercase(), value))
            .collect();
        self
    }

    /// Check the construction invariants.
    pub fn validate(&self) -> Result<()> {
        for (name, weight) in [
            ("visual_weight", self.visual_weight),
            ("metadata_weight", self.metadata_weight),
            ("business_weight", self.business_weight),
        ] {
            if !(0.0..=1.0).contains(&weight) || !weight.is_finite() {
                return Err(VisuraError::invalid_weight_config(format!(
                    "{name} must be within [0, 1], got {weight}"
                )));
            }
        }

        let total = self.visual_weight + self.metadata_weight + self.business_weight;
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(VisuraError::invalid_weight_config(format!(
                "weights must sum to 1.0 (got {total}): visual={}, metadata={}, business={}",
                self.visual_weight, self.metadata_weight, self.business_weight
            )));
        }

        for (key, attribute) in &self.metadata_attributes {
            if !(0.0..=1.0).contains(&attribute.weight) || !attribute.weight.is_finite() {
                return Err(VisuraError::invalid_weight_config(format!(
                    "attribute '{key}' weight must be within [0, 1], got {}",
                    attribute.weight
                )));
            }
        }

        Ok(())
    }

    /// Replace the three layer weights, rejecting invalid combinations.
    ///
    /// On error the existing configuration is left untouched.
    pub fn update_weights(
        &mut self,
        visual_weight: f32,
        metadata_weight: f32,
        business_weight: f32,
    ) -> Result<()> {
        let candidate = Self {
            visual_weight,
            metadata_weight,
            business_weight,
            metadata_attributes: self.metadata_attributes.clone(),
        };
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }

    /// Effective weight for a detected metadata attribute.
    ///
    /// Returns `None` for attributes explicitly disabled; otherwise the
    /// configured weight, falling back to the built-in default table.
    pub fn attribute_weight(&self, key: &str) -> Option<f32> {
        let key = key.to_lowercase();
        match self.metadata_attributes.get(&key) {
            Some(attribute) if !attribute.enabled => None,
            Some(attribute) => Some(attribute.weight),
            None => Some(default_attribute_weight(&key)),
        }
    }

    /// Names of all explicitly enabled attributes.
    pub fn enabled_attributes(&self) -> Vec<&str> {
        self.metadata_attributes
            .iter()
            .filter(|(_, attribute)| attribute.enabled)
            .map(|(key, _)| key.as_str())
            .collect()
    }
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self::preset(WeightPreset::Balanced)
    }
}
