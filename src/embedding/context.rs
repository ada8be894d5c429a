//! Business context and prompt synthesis for contextual embeddings.

use crate::catalog::category::Category;

/// Maximum contextual prompts fed into one fusion.
pub const MAX_CONTEXTUAL_PROMPTS: usize = 3;

/// How many industry-template prompts participate.
const MAX_INDUSTRY_PROMPTS: usize = 2;

/// How many product tags flow into the tag prompt.
const MAX_PROMPT_TAGS: usize = 3;

/// Business context around one image.
///
/// Everything is optional; an empty context degrades the generator to the
/// baseline-only embedding.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingContext {
    /// The client's industry (e.g. "textile", "footwear").
    pub industry: Option<String>,
    /// Category display name used inside prompt sentences.
    pub category_name: Option<String>,
    /// Category-specific prompt text, when one is configured.
    pub category_prompt: Option<String>,
    /// The category's detection confidence threshold.
    pub confidence_threshold: Option<f32>,
    /// Product tags.
    pub tags: Vec<String>,
}

impl EmbeddingContext {
    /// Build a context from a category plus client-level information.
    pub fn from_category(category: &Category, industry: Option<&str>, tags: &[String]) -> Self {
        Self {
            industry: industry.map(str::to_string),
            category_name: Some(category.name_en.clone()),
            category_prompt: Some(category.build_prompt()),
            confidence_threshold: Some(category.confidence_threshold),
            tags: tags.to_vec(),
        }
    }

    /// Whether the context carries enough signal for contextual prompts.
    pub fn has_category(&self) -> bool {
        self.category_name
            .as_deref()
            .is_some_and(|name| !name.trim().is_empty())
    }
}

/// Render the contextual prompts for one image.
///
/// Two industry-flavored sentences, then the category's configured prompt,
/// then a tag sentence, capped at [`MAX_CONTEXTUAL_PROMPTS`]. Returns an
/// empty list when the context has no category.
pub fn contextual_prompts(context: &EmbeddingContext) -> Vec<String> {
    if !context.has_category() {
        return Vec::new();
    }

    let category = context
        .category_name
        .as_deref()
        .unwrap_or_default()
        .trim()
        .to_lowercase();

    let mut prompts: Vec<String> = industry_prompts(context.industry.as_deref(), &category)
        .into_iter()
        .take(MAX_INDUSTRY_PROMPTS)
        .collect();

    if let Some(category_prompt) = &context.category_prompt {
        let category_prompt = category_prompt.trim();
        if !category_prompt.is_empty() {
            prompts.push(category_prompt.to_string());
        }
    }

    if !context.tags.is_empty() {
        let tag_text = context
            .tags
            .iter()
            .map(|tag| tag.trim())
            .filter(|tag| !tag.is_empty())
            .take(MAX_PROMPT_TAGS)
            .collect::<Vec<_>>()
            .join(", ");
        if !tag_text.is_empty() {
            prompts.push(format!("a {category} that is {tag_text}"));
        }
    }

    prompts.truncate(MAX_CONTEXTUAL_PROMPTS);
    prompts
}

/// Industry-flavored prompt sentences.
///
/// Industries arrive in the catalog's language or English depending on the
/// client record's age; both spellings are accepted.
fn industry_prompts(industry: Option<&str>, category: &str) -> Vec<String> {
    match industry.map(|i| i.trim().to_lowercase()).as_deref() {
        Some("textil") | Some("textile") | Some("clothing") | Some("fashion") => vec![
            format!("a high quality photo of {category} clothing item"),
            format!("professional product photo of {category} fashion"),
            format!("{category} textile with clear details"),
        ],
        Some("calzado") | Some("footwear") | Some("shoes") => vec![
            format!("a clear photo of {category} footwear"),
            format!("professional shoe photography of {category}"),
            format!("{category} footwear with visible details"),
        ],
        _ => vec![
            format!("a clear photo of {category}"),
            format!("product photography of {category}"),
            format!("{category} item with visible details"),
        ],
    }
}
