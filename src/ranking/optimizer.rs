//! Search result optimizer: the three-layer ranking engine.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::product::Product;
use crate::color::groups::normalize_gender;
use crate::error::Result;
use crate::ranking::config::WeightConfig;

/// Business-layer factor weights.
const STOCK_WEIGHT: f32 = 0.4;
const FEATURED_WEIGHT: f32 = 0.3;
const DISCOUNT_WEIGHT: f32 = 0.3;

/// One candidate entering the ranking: a product plus its raw visual score.
#[derive(Debug, Clone)]
pub struct RawSearchResult {
    /// The candidate product.
    pub product: Product,
    /// Visual similarity score in [0, 1].
    pub visual_score: f32,
}

impl RawSearchResult {
    /// Create a raw result.
    pub fn new(product: Product, visual_score: f32) -> Self {
        Self {
            product,
            visual_score,
        }
    }
}

/// Weighted contribution of each layer to one final score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// `visual_score * visual_weight`
    pub visual_contribution: f32,
    /// `metadata_score * metadata_weight`
    pub metadata_contribution: f32,
    /// `business_score * business_weight`
    pub business_contribution: f32,
    /// Weight applied to the visual layer.
    pub visual_weight: f32,
    /// Weight applied to the metadata layer.
    pub metadata_weight: f32,
    /// Weight applied to the business layer.
    pub business_weight: f32,
}

/// A ranked search result carrying every component score.
#[derive(Debug, Clone)]
pub struct RankedResult {
    /// Product identifier.
    pub product_id: Uuid,
    /// The product, for attribute access by the caller.
    pub product: Product,
    /// Visual similarity score in [0, 1].
    pub visual_score: f32,
    /// Attribute-matching score in [0, 1].
    pub metadata_score: f32,
    /// Business-signal score in [0, 1].
    pub business_score: f32,
    /// Final weighted score in [0, 1].
    pub final_score: f32,
    /// Per-layer contributions for inspection and debugging.
    pub breakdown: ScoreBreakdown,
}

/// Three-layer search result optimizer.
///
/// Layers:
/// 1. Visual: similarity scores computed upstream from embeddings.
/// 2. Metadata: matching of detected attributes (color, brand, pattern, etc.).
/// 3. Business: commercial signals (stock, featured, discounts).
///
/// # Example
///
/// ```
/// use visura::ranking::{SearchOptimizer, WeightConfig};
///
/// let optimizer = SearchOptimizer::new(WeightConfig::new(0.6, 0.3, 0.1)?)?;
/// let ranked = optimizer.rank(Vec::new(), &Default::default());
/// assert!(ranked.is_empty());
/// # Ok::<(), visura::error::VisuraError>(())
/// ```
#[derive(Debug, Clone)]
pub struct SearchOptimizer {
    config: WeightConfig,
}

impl SearchOptimizer {
    /// Create an optimizer from a weight configuration.
    ///
    /// Validation happens once here, not per call; weights that do not sum
    /// to 1.0 (±0.01) are rejected with
    /// [`VisuraError::InvalidWeightConfig`](crate::error::VisuraError).
    pub fn new(config: WeightConfig) -> Result<Self> {
        config.validate()?;
        debug!(
            visual = config.visual_weight,
            metadata = config.metadata_weight,
            business = config.business_weight,
            "search optimizer initialized"
        );
        Ok(Self { config })
    }

    /// The weight configuration backing this optimizer.
    pub fn config(&self) -> &WeightConfig {
        &self.config
    }

    /// Score how well the product's stored attributes match the detected ones.
    ///
    /// Every detected attribute the product has a value for contributes its
    /// configured weight to the "possible" sum, and additionally to the
    /// "matched" sum when the values agree (case-insensitive, trimmed;
    /// colors are gender-normalized on both sides first). The score is
    /// `matched / possible`, or 0.0 when nothing is comparable.
    pub fn metadata_score(
        &self,
        product: &Product,
        detected_attributes: &HashMap<String, String>,
    ) -> f32 {
        if detected_attributes.is_empty() {
            return 0.0;
        }

        let mut matched = 0.0f32;
        let mut possible = 0.0f32;
        let mut matches: Vec<&str> = Vec::new();

        for (key, detected_value) in detected_attributes {
            let Some(weight) = self.config.attribute_weight(key) else {
                continue; // attribute disabled for this client
            };
            let Some(product_value) = product.attribute(key) else {
                continue; // product has no value for this key
            };

            let is_color = key.eq_ignore_ascii_case("color");
            let detected_normalized = normalize_attribute_value(detected_value, is_color);
            let is_match = product_value
                .values()
                .any(|value| normalize_attribute_value(value, is_color) == detected_normalized);

            if is_match {
                matched += weight;
                matches.push(key.as_str());
            }
            possible += weight;
        }

        let score = if possible > 0.0 {
            (matched / possible).min(1.0)
        } else {
            0.0
        };

        debug!(
            product = %product.id,
            score,
            matched = matches.len(),
            detected = detected_attributes.len(),
            "metadata score"
        );

        score
    }

    /// Score the product's commercial signals.
    ///
    /// Stock is always evaluated; featured and discount only when the
    /// product model exposes those fields, so a catalog without either
    /// concept is not penalized. The result is normalized by the weights
    /// actually evaluated.
    pub fn business_score(&self, product: &Product) -> f32 {
        let mut score = 0.0f32;
        let mut max_possible = STOCK_WEIGHT;

        if product.in_stock() {
            score += STOCK_WEIGHT;
        }

        if let Some(featured) = product.featured {
            max_possible += FEATURED_WEIGHT;
            if featured {
                score += FEATURED_WEIGHT;
            }
        }

        if let Some(discount) = product.discount {
            max_possible += DISCOUNT_WEIGHT;
            if discount > 0.0 {
                score += DISCOUNT_WEIGHT;
            }
        }

        (score / max_possible).min(1.0)
    }

    /// Rank raw results by the weighted combination of all three layers.
    ///
    /// `final = visual * w_v + metadata * w_m + business * w_b`, capped at
    /// 1.0, sorted descending. The sort is stable, so ties keep their input
    /// order. An empty input yields an empty output, never an error.
    pub fn rank(
        &self,
        raw_results: Vec<RawSearchResult>,
        detected_attributes: &HashMap<String, String>,
    ) -> Vec<RankedResult> {
        if raw_results.is_empty() {
            warn!("rank called with an empty result list");
            return Vec::new();
        }

        info!(
            candidates = raw_results.len(),
            attributes = detected_attributes.len(),
            "ranking results"
        );

        let mut ranked: Vec<RankedResult> = raw_results
            .into_iter()
            .map(|raw| {
                let metadata_score = self.metadata_score(&raw.product, detected_attributes);
                let business_score = self.business_score(&raw.product);
                let visual_score = raw.visual_score;

                let breakdown = ScoreBreakdown {
                    visual_contribution: visual_score * self.config.visual_weight,
                    metadata_contribution: metadata_score * self.config.metadata_weight,
                    business_contribution: business_score * self.config.business_weight,
                    visual_weight: self.config.visual_weight,
                    metadata_weight: self.config.metadata_weight,
                    business_weight: self.config.business_weight,
                };

                let final_score = (breakdown.visual_contribution
                    + breakdown.metadata_contribution
                    + breakdown.business_contribution)
                    .min(1.0);

                debug!(
                    product = %raw.product.id,
                    visual_score,
                    metadata_score,
                    business_score,
                    final_score,
                    "ranked"
                );

                RankedResult {
                    product_id: raw.product.id,
                    product: raw.product,
                    visual_score,
                    metadata_score,
                    business_score,
                    final_score,
                    breakdown,
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        if let Some(top) = ranked.first() {
            info!(results = ranked.len(), top_score = top.final_score, "ranking complete");
        }

        ranked
    }
}

/// Trim, uppercase and (for colors) gender-normalize an attribute value.
fn normalize_attribute_value(value: &str, is_color: bool) -> String {
    let normalized = value.trim().to_uppercase();
    if is_color {
        normalize_gender(&normalized)
    } else {
        normalized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::product::AttributeValue;

    fn optimizer(visual: f32, metadata: f32, business: f32) -> SearchOptimizer {
        SearchOptimizer::new(WeightConfig::new(visual, metadata, business).unwrap()).unwrap()
    }

    fn product_with_color(color: &str) -> Product {
        let mut product = Product::new(Uuid::new_v4(), Uuid::new_v4(), "Remera");
        product
            .attributes
            .insert("color".to_string(), AttributeValue::from(color));
        product
    }

    fn detected(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_construction_rejects_invalid_weights() {
        let config = WeightConfig {
            visual_weight: 1.5,
            metadata_weight: 0.3,
            business_weight: 0.2,
            metadata_attributes: HashMap::new(),
        };
        assert!(SearchOptimizer::new(config).is_err());
    }

    #[test]
    fn test_rank_empty_returns_empty() {
        let optimizer = optimizer(0.6, 0.3, 0.1);
        let ranked = optimizer.rank(Vec::new(), &HashMap::new());
        assert!(ranked.is_empty());
    }

    #[test]
    fn test_metadata_score_gender_normalization_idempotence() {
        let optimizer = optimizer(0.6, 0.3, 0.1);
        let masculine = product_with_color("NEGRO");
        let feminine = product_with_color("NEGRA");
        let attrs = detected(&[("color", "NEGRO")]);

        let score_masculine = optimizer.metadata_score(&masculine, &attrs);
        let score_feminine = optimizer.metadata_score(&feminine, &attrs);
        assert_eq!(score_masculine, score_feminine);
        assert_eq!(score_masculine, 1.0);
    }

    #[test]
    fn test_metadata_score_partial_match() {
        let optimizer = optimizer(0.6, 0.3, 0.1);
        let mut product = product_with_color("BLANCO");
        product.brand = Some("Nike".to_string());

        // color matches (weight 1.0), brand does not (weight 1.0)
        let attrs = detected(&[("color", "blanco "), ("brand", "Adidas")]);
        let score = optimizer.metadata_score(&product, &attrs);
        assert!((score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_metadata_score_ignores_missing_product_values() {
        let optimizer = optimizer(0.6, 0.3, 0.1);
        let product = product_with_color("BLANCO");

        // pattern not present on the product: contributes to neither sum
        let attrs = detected(&[("color", "BLANCO"), ("pattern", "liso")]);
        assert_eq!(optimizer.metadata_score(&product, &attrs), 1.0);
    }

    #[test]
    fn test_metadata_score_no_detected_attributes() {
        let optimizer = optimizer(0.6, 0.3, 0.1);
        let product = product_with_color("BLANCO");
        assert_eq!(optimizer.metadata_score(&product, &HashMap::new()), 0.0);
    }

    #[test]
    fn test_metadata_score_list_attribute_matches_any() {
        let optimizer = optimizer(0.6, 0.3, 0.1);
        let mut product = Product::new(Uuid::new_v4(), Uuid::new_v4(), "Remera");
        product.attributes.insert(
            "material".to_string(),
            AttributeValue::List(vec!["algodon".to_string(), "lino".to_string()]),
        );

        let attrs = detected(&[("material", "LINO")]);
        assert_eq!(optimizer.metadata_score(&product, &attrs), 1.0);
    }

    #[test]
    fn test_business_score_stock_only_product() {
        let optimizer = optimizer(0.6, 0.3, 0.1);
        let mut product = Product::new(Uuid::new_v4(), Uuid::new_v4(), "Remera");

        product.stock = 0;
        assert_eq!(optimizer.business_score(&product), 0.0);

        product.stock = 10;
        assert_eq!(optimizer.business_score(&product), 1.0);
    }

    #[test]
    fn test_business_score_with_optional_factors() {
        let optimizer = optimizer(0.6, 0.3, 0.1);
        let mut product = Product::new(Uuid::new_v4(), Uuid::new_v4(), "Remera");
        product.stock = 5;
        product.featured = Some(true);
        product.discount = Some(0.0);

        // stock 0.4 + featured 0.3 out of 1.0 evaluated
        let score = optimizer.business_score(&product);
        assert!((score - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_rank_orders_by_final_score() {
        let optimizer = optimizer(0.6, 0.3, 0.1);

        // matching product: color match + in stock, lower visual score
        let mut matching = product_with_color("NEGRO");
        matching.stock = 10;

        // non-matching product: higher visual score, out of stock
        let other = product_with_color("BLANCO");

        let raw = vec![
            RawSearchResult::new(other, 0.85),
            RawSearchResult::new(matching.clone(), 0.78),
        ];
        let ranked = optimizer.rank(raw, &detected(&[("color", "NEGRO")]));

        // 0.3*1.0 + 0.1*1.0 > (0.85 - 0.78)*0.6, so the match wins
        assert_eq!(ranked[0].product_id, matching.id);
        assert!(ranked[0].final_score > ranked[1].final_score);
        assert!(ranked[0].final_score <= 1.0);
    }

    #[test]
    fn test_rank_ties_keep_input_order() {
        let optimizer = optimizer(0.6, 0.3, 0.1);
        let first = product_with_color("NEGRO");
        let second = product_with_color("NEGRO");

        let raw = vec![
            RawSearchResult::new(first.clone(), 0.5),
            RawSearchResult::new(second.clone(), 0.5),
        ];
        let ranked = optimizer.rank(raw, &HashMap::new());
        assert_eq!(ranked[0].product_id, first.id);
        assert_eq!(ranked[1].product_id, second.id);
    }

    #[test]
    fn test_rank_breakdown_contributions() {
        let optimizer = optimizer(0.6, 0.3, 0.1);
        let mut product = product_with_color("NEGRO");
        product.stock = 1;

        let ranked = optimizer.rank(
            vec![RawSearchResult::new(product, 0.85)],
            &detected(&[("color", "NEGRO")]),
        );
        let result = &ranked[0];

        assert!((result.breakdown.visual_contribution - 0.85 * 0.6).abs() < 1e-6);
        assert!((result.breakdown.metadata_contribution - 0.3).abs() < 1e-6);
        assert!((result.breakdown.business_contribution - 0.1).abs() < 1e-6);
        assert!(
            (result.final_score
                - (result.breakdown.visual_contribution
                    + result.breakdown.metadata_contribution
                    + result.breakdown.business_contribution))
                .abs()
                < 1e-6
        );
    }

    #[test]
    fn test_end_to_end_weighting_scenario() {
        // Three products, visual scores 0.85 / 0.78 / 0.60; weights 0.6/0.3/0.1.
        let optimizer = optimizer(0.6, 0.3, 0.1);

        let best_visual = product_with_color("BLANCO");
        let mut matching = product_with_color("NEGRO");
        matching.stock = 3;
        let weakest = product_with_color("ROJO");

        let ranked = optimizer.rank(
            vec![
                RawSearchResult::new(best_visual, 0.85),
                RawSearchResult::new(matching.clone(), 0.78),
                RawSearchResult::new(weakest, 0.60),
            ],
            &detected(&[("color", "NEGRO")]),
        );

        // 0.3*1.0 + 0.1*0.4 = 0.34 > (0.85-0.78)*0.6 = 0.042
        assert_eq!(ranked[0].product_id, matching.id);
        assert!(ranked[0].metadata_score == 1.0);
        assert!(ranked[0].business_score >= 0.4);
    }
}
