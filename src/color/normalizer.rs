//! Free-text color normalization with a hardcoded fast path and a cached
//! semantic fallback.

use std::fmt::Debug;
use std::sync::Arc;

use ahash::AHashMap;
use async_trait::async_trait;
use lazy_static::lazy_static;
use parking_lot::RwLock;
use regex::Regex;
use tracing::{debug, warn};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::color::groups::shared_perceptual_group;
use crate::error::Result;

/// Cosine threshold for the embedding fallback of [`ColorNormalizer::are_similar`].
///
/// Deliberately strict: the fallback only exists for rare colors the
/// hardcoded tables don't know ("coral" vs "salmón").
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.85;

/// Minimum cleaned length before the semantic fallback is consulted.
const MIN_SEMANTIC_LEN: usize = 3;

lazy_static! {
    static ref PARENTHESES: Regex = Regex::new(r"\(.*?\)").expect("static regex");
    static ref NON_LETTERS: Regex = Regex::new(r"[^a-z\s]").expect("static regex");
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("static regex");
}

/// External semantic normalization collaborator.
///
/// Backed by an LLM or similar service outside this crate. Calls are
/// synchronous from the caller's point of view and are never retried here.
#[async_trait]
pub trait SemanticNormalizer: Send + Sync + Debug {
    /// Extract the canonical color named by the text, if any.
    async fn canonical_color(&self, text: &str) -> Result<Option<String>>;

    /// A semantic embedding of the color text, for similarity comparison.
    async fn color_embedding(&self, text: &str) -> Result<Option<Vec<f32>>>;
}

/// Maps arbitrary color descriptions to a small canonical vocabulary.
///
/// Strategy, in order:
/// 1. Hardcoded substring dictionary covering common colors and their
///    regional synonyms (instantaneous).
/// 2. Semantic fallback through the injected [`SemanticNormalizer`], with
///    results memoized per process lifetime keyed by the cleaned text.
///
/// The memoization caches are append-only; concurrent readers share them
/// behind `parking_lot` locks.
#[derive(Debug, Default)]
pub struct ColorNormalizer {
    semantic: Option<Arc<dyn SemanticNormalizer>>,
    canonical_cache: RwLock<AHashMap<String, Option<String>>>,
    embedding_cache: RwLock<AHashMap<String, Option<Vec<f32>>>>,
}

impl ColorNormalizer {
    /// Normalizer without a semantic fallback; unknown colors yield `None`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizer with a semantic fallback collaborator.
    pub fn with_semantic(semantic: Arc<dyn SemanticNormalizer>) -> Self {
        Self {
            semantic: Some(semantic),
            canonical_cache: RwLock::new(AHashMap::new()),
            embedding_cache: RwLock::new(AHashMap::new()),
        }
    }

    /// Normalize a color description to its canonical uppercase form.
    ///
    /// ```
    /// # tokio_test::block_on(async {
    /// use visura::color::ColorNormalizer;
    ///
    /// let normalizer = ColorNormalizer::new();
    /// assert_eq!(normalizer.normalize("Azul marino").await.as_deref(), Some("AZUL"));
    /// assert_eq!(normalizer.normalize("").await, None);
    /// # });
    /// ```
    pub async fn normalize(&self, raw: &str) -> Option<String> {
        if raw.trim().is_empty() {
            return None;
        }

        let cleaned = clean(raw);

        if let Some(canonical) = hardcoded(&cleaned) {
            return Some(canonical.to_string());
        }

        if cleaned.len() >= MIN_SEMANTIC_LEN {
            return self.semantic_lookup(&cleaned).await;
        }

        None
    }

    /// Decide whether two colors name the same perceptual color.
    ///
    /// Identical strings (case-folded) match immediately; then both sides
    /// are normalized and checked for equality and shared perceptual group
    /// membership; only when all of that is inconclusive does the embedding
    /// fallback compare against [`DEFAULT_SIMILARITY_THRESHOLD`].
    pub async fn are_similar(&self, color_a: &str, color_b: &str) -> bool {
        self.are_similar_with_threshold(color_a, color_b, DEFAULT_SIMILARITY_THRESHOLD)
            .await
    }

    /// [`ColorNormalizer::are_similar`] with an explicit threshold.
    pub async fn are_similar_with_threshold(
        &self,
        color_a: &str,
        color_b: &str,
        threshold: f32,
    ) -> bool {
        if color_a.trim().is_empty() || color_b.trim().is_empty() {
            return false;
        }

        if color_a.trim().to_lowercase() == color_b.trim().to_lowercase() {
            return true;
        }

        let normalized_a = self.normalize(color_a).await;
        let normalized_b = self.normalize(color_b).await;

        if let (Some(a), Some(b)) = (&normalized_a, &normalized_b) {
            if a == b {
                return true;
            }
            if shared_perceptual_group(a, b).is_some() {
                return true;
            }
        }

        // Embedding fallback for colors the tables don't know.
        let embedding_a = self.embedding_for(color_a).await;
        let embedding_b = self.embedding_for(color_b).await;

        if let (Some(a), Some(b)) = (embedding_a, embedding_b) {
            if a.len() == b.len() && !a.is_empty() {
                let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
                let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a > 0.0 && norm_b > 0.0 {
                    let similarity = dot / (norm_a * norm_b);
                    let decided = similarity >= threshold;
                    // Only the fallback decision gets logged; the table
                    // paths above are the expected ones.
                    debug!(
                        color_a,
                        color_b, similarity, threshold, decided, "semantic color comparison"
                    );
                    return decided;
                }
            }
        }

        false
    }

    /// Resolve an unknown color through the semantic collaborator, memoized.
    async fn semantic_lookup(&self, cleaned: &str) -> Option<String> {
        if let Some(cached) = self.canonical_cache.read().get(cleaned) {
            return cached.clone();
        }

        let semantic = self.semantic.as_ref()?;
        let resolved = match semantic.canonical_color(cleaned).await {
            Ok(color) => color.map(|c| c.to_uppercase()),
            Err(err) => {
                warn!(color = cleaned, error = %err, "semantic color normalization failed");
                None
            }
        };

        self.canonical_cache
            .write()
            .insert(cleaned.to_string(), resolved.clone());
        resolved
    }

    /// Fetch (and memoize) the semantic embedding of a color string.
    async fn embedding_for(&self, raw: &str) -> Option<Vec<f32>> {
        let key = raw.trim().to_lowercase();
        if key.is_empty() {
            return None;
        }

        if let Some(cached) = self.embedding_cache.read().get(&key) {
            return cached.clone();
        }

        let semantic = self.semantic.as_ref()?;
        let resolved = match semantic.color_embedding(&key).await {
            Ok(embedding) => embedding,
            Err(err) => {
                warn!(color = %key, error = %err, "semantic color embedding failed");
                None
            }
        };

        self.embedding_cache.write().insert(key, resolved.clone());
        resolved
    }
}

/// Lowercase, strip accents and noise, keep letters and single spaces.
fn clean(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let stripped: String = lowered.nfd().filter(|c| !is_combining_mark(*c)).collect();
    let no_parens = PARENTHESES.replace_all(&stripped, "");
    let letters_only = NON_LETTERS.replace_all(&no_parens, " ");
    WHITESPACE.replace_all(&letters_only, " ").trim().to_string()
}

/// Substring-based dictionary of common colors and regional synonyms.
///
/// Order matters: more specific families first, so "azul marino" resolves
/// before "marino" could be misread.
fn hardcoded(s: &str) -> Option<&'static str> {
    const AZUL: [&str; 5] = ["azul", "celeste", "marino", "jean", "denim"];
    if AZUL.iter().any(|k| s.contains(k)) {
        return Some("AZUL");
    }

    if s.contains("negro") {
        return Some("NEGRO");
    }
    if s.contains("blanco") {
        return Some("BLANCO");
    }
    if s.contains("gris") {
        return Some("GRIS");
    }

    if s.contains("verde") {
        return Some("VERDE");
    }
    if s.contains("rojo") {
        return Some("ROJO");
    }
    if s.contains("amarillo") || s.contains("mostaza") {
        return Some("AMARILLO");
    }

    const MARRON: [&str; 4] = ["marron", "habano", "chocolate", "castano"];
    if MARRON.iter().any(|k| s.contains(k)) {
        return Some("MARRON");
    }
    if s.contains("beige") || s.contains("crema") {
        return Some("BEIGE");
    }
    if s.contains("naranja") {
        return Some("NARANJA");
    }

    const MORADO: [&str; 4] = ["morado", "violeta", "purpura", "lila"];
    if MORADO.iter().any(|k| s.contains(k)) {
        return Some("MORADO");
    }
    if s.contains("rosa") || s.contains("fucsia") {
        return Some("ROSA");
    }

    if s.contains("turquesa") || s.contains("petroleo") || s.contains("cyan") {
        return Some("TURQUESA");
    }
    if s.contains("dorado") || s.contains("oro") {
        return Some("DORADO");
    }
    if s.contains("plateado") || s.contains("plata") {
        return Some("PLATEADO");
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Scripted semantic collaborator that counts its invocations.
    #[derive(Debug, Default)]
    struct ScriptedSemantic {
        colors: AHashMap<String, String>,
        embeddings: AHashMap<String, Vec<f32>>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl SemanticNormalizer for ScriptedSemantic {
        async fn canonical_color(&self, text: &str) -> Result<Option<String>> {
            *self.calls.lock() += 1;
            Ok(self.colors.get(text).cloned())
        }

        async fn color_embedding(&self, text: &str) -> Result<Option<Vec<f32>>> {
            Ok(self.embeddings.get(text).cloned())
        }
    }

    #[tokio::test]
    async fn test_normalize_hardcoded_synonyms() {
        let normalizer = ColorNormalizer::new();

        assert_eq!(
            normalizer.normalize("Azul marino").await.as_deref(),
            Some("AZUL")
        );
        assert_eq!(normalizer.normalize("Jean").await.as_deref(), Some("AZUL"));
        assert_eq!(
            normalizer.normalize("Fucsia vibrante").await.as_deref(),
            Some("ROSA")
        );
        assert_eq!(
            normalizer.normalize("marrón chocolate").await.as_deref(),
            Some("MARRON")
        );
        assert_eq!(
            normalizer.normalize("Mostaza").await.as_deref(),
            Some("AMARILLO")
        );
    }

    #[tokio::test]
    async fn test_normalize_empty_and_short() {
        let normalizer = ColorNormalizer::new();
        assert_eq!(normalizer.normalize("").await, None);
        assert_eq!(normalizer.normalize("  ").await, None);
        assert_eq!(normalizer.normalize("xy").await, None);
    }

    #[tokio::test]
    async fn test_normalize_strips_accents_and_noise() {
        let normalizer = ColorNormalizer::new();
        assert_eq!(
            normalizer.normalize("MARRÓN (tono café)").await.as_deref(),
            Some("MARRON")
        );
    }

    #[tokio::test]
    async fn test_semantic_fallback_is_cached() {
        let mut semantic = ScriptedSemantic::default();
        semantic
            .colors
            .insert("coral".to_string(), "naranja".to_string());
        let semantic = Arc::new(semantic);
        let normalizer = ColorNormalizer::with_semantic(semantic.clone());

        assert_eq!(
            normalizer.normalize("Coral").await.as_deref(),
            Some("NARANJA")
        );
        assert_eq!(
            normalizer.normalize("coral").await.as_deref(),
            Some("NARANJA")
        );
        // second lookup must hit the memoized entry
        assert_eq!(*semantic.calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_semantic_miss_is_cached_as_none() {
        let semantic = Arc::new(ScriptedSemantic::default());
        let normalizer = ColorNormalizer::with_semantic(semantic.clone());

        assert_eq!(normalizer.normalize("zzzzz").await, None);
        assert_eq!(normalizer.normalize("zzzzz").await, None);
        assert_eq!(*semantic.calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_are_similar_exact_and_groups() {
        let normalizer = ColorNormalizer::new();

        assert!(normalizer.are_similar("BEIGE", "beige").await);
        assert!(normalizer.are_similar("beige", "marrón chocolate").await);
        assert!(!normalizer.are_similar("beige", "negro").await);
        assert!(!normalizer.are_similar("", "negro").await);
    }

    #[tokio::test]
    async fn test_are_similar_embedding_fallback() {
        let mut semantic = ScriptedSemantic::default();
        semantic
            .embeddings
            .insert("coral".to_string(), vec![1.0, 0.1, 0.0]);
        semantic
            .embeddings
            .insert("salmon".to_string(), vec![1.0, 0.0, 0.1]);
        semantic
            .embeddings
            .insert("verde lima".to_string(), vec![0.0, 1.0, 0.0]);
        let normalizer = ColorNormalizer::with_semantic(Arc::new(semantic));

        assert!(normalizer.are_similar("coral", "salmon").await);
        assert!(!normalizer.are_similar("coral", "verde lima").await);
    }

    #[test]
    fn test_clean() {
        assert_eq!(clean("  Azul Marino 42  "), "azul marino");
        assert_eq!(clean("MARRÓN (café)"), "marron");
        assert_eq!(clean("rosa/fucsia"), "rosa fucsia");
    }
}
