//! Category model and prompt rendering.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default detection confidence threshold for a category.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.75;

/// How many alternative terms feed into a generated prompt.
const MAX_ALTERNATIVE_TERMS: usize = 3;

/// A product category within one client's catalog.
///
/// Categories carry two names: the display name shown to shoppers and an
/// English name used when rendering prompts, because the inference model
/// was trained predominantly on English captions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    /// Category identifier.
    pub id: Uuid,
    /// Owning client (tenant).
    pub client_id: Uuid,
    /// Display name in the catalog's language.
    pub name: String,
    /// English name used in prompt text.
    pub name_en: String,
    /// Comma-separated alternative terms for prompt enrichment.
    #[serde(default)]
    pub alternative_terms: Option<String>,
    /// Hand-tuned prompt text; overrides the generated one when present.
    #[serde(default)]
    pub prompt: Option<String>,
    /// Free-text description of key visual features.
    #[serde(default)]
    pub visual_features: Option<String>,
    /// Minimum similarity for this category to win a detection.
    pub confidence_threshold: f32,
    /// Whether the category participates in search.
    pub is_active: bool,
}

impl Category {
    /// Create an active category with the default confidence threshold.
    pub fn new(client_id: Uuid, name: impl Into<String>, name_en: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            name: name.into(),
            name_en: name_en.into(),
            alternative_terms: None,
            prompt: None,
            visual_features: None,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            is_active: true,
        }
    }

    /// The prompt text for this category.
    ///
    /// Prefers the hand-tuned prompt; otherwise renders one from the
    /// English name, up to three alternative terms and the visual features:
    /// `"a photo of {terms}"` or `"a photo of {terms} showing {features}"`.
    pub fn build_prompt(&self) -> String {
        if let Some(prompt) = &self.prompt {
            let prompt = prompt.trim();
            if !prompt.is_empty() {
                return prompt.to_string();
            }
        }

        let mut terms = vec![self.name_en.as_str()];
        if let Some(alternatives) = &self.alternative_terms {
            terms.extend(
                alternatives
                    .split(',')
                    .map(str::trim)
                    .filter(|term| !term.is_empty())
                    .take(MAX_ALTERNATIVE_TERMS),
            );
        }

        // Long prompts dilute the category signal; keep the two main terms.
        let main_terms = terms
            .iter()
            .take(2)
            .copied()
            .collect::<Vec<_>>()
            .join(", ");

        match &self.visual_features {
            Some(features) if !features.trim().is_empty() => {
                let features = features.replace(',', " and");
                format!("a photo of {main_terms} showing {features}")
            }
            _ => format!("a photo of {main_terms}"),
        }
    }
}
