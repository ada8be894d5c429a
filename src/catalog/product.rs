//! Product model and typed attribute access.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A structured attribute value: a single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Single-valued attribute, e.g. `color = "NEGRO"`.
    Text(String),
    /// Multi-valued attribute, e.g. `material = ["algodon", "poliester"]`.
    List(Vec<String>),
}

impl AttributeValue {
    /// Iterate the attribute's values (one element for `Text`).
    pub fn values(&self) -> impl Iterator<Item = &str> {
        match self {
            AttributeValue::Text(value) => std::slice::from_ref(value).iter(),
            AttributeValue::List(values) => values.iter(),
        }
        .map(|s| s.as_str())
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

/// A catalog product.
///
/// Attributes live in two places in the upstream store: the structured
/// attribute map maintained by the classification collaborator, and older
/// flat columns (`color`, `brand`) that predate it. [`Product::attribute`]
/// is the single accessor that resolves that duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Product identifier.
    pub id: Uuid,
    /// Owning client (tenant).
    pub client_id: Uuid,
    /// Category this product belongs to.
    pub category_id: Uuid,
    /// Display name.
    pub name: String,
    /// Structured attribute map, keyed by lowercase attribute name.
    #[serde(default)]
    pub attributes: HashMap<String, AttributeValue>,
    /// Legacy flat color field.
    #[serde(default)]
    pub color: Option<String>,
    /// Legacy flat brand field.
    #[serde(default)]
    pub brand: Option<String>,
    /// Units in stock.
    #[serde(default)]
    pub stock: u32,
    /// Featured flag; `None` when the catalog has no featured concept.
    #[serde(default)]
    pub featured: Option<bool>,
    /// Active discount percentage; `None` when the catalog has no discounts.
    #[serde(default)]
    pub discount: Option<f32>,
    /// Free-form tags used for contextual prompts.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Product {
    /// Create a product with the mandatory fields; everything else defaults.
    pub fn new(client_id: Uuid, category_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            category_id,
            name: name.into(),
            attributes: HashMap::new(),
            color: None,
            brand: None,
            stock: 0,
            featured: None,
            discount: None,
            tags: Vec::new(),
        }
    }

    /// Look up an attribute value by key.
    ///
    /// Resolution order is fixed: the structured attribute map first (the
    /// classification collaborator keeps it current), then the legacy flat
    /// field when one exists for the key.
    pub fn attribute(&self, key: &str) -> Option<AttributeValue> {
        let key = key.to_lowercase();
        if let Some(value) = self.attributes.get(&key) {
            return Some(value.clone());
        }

        match key.as_str() {
            "color" => self.color.as_deref().map(AttributeValue::from),
            "brand" => self.brand.as_deref().map(AttributeValue::from),
            _ => None,
        }
    }

    /// Whether the product has any units in stock.
    pub fn in_stock(&self) -> bool {
        self.stock > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product() -> Product {
        Product::new(Uuid::new_v4(), Uuid::new_v4(), "Remera basica")
    }

    #[test]
    fn test_attribute_prefers_structured_map() {
        let mut product = product();
        product.color = Some("ROJO".to_string());
        product
            .attributes
            .insert("color".to_string(), AttributeValue::from("NEGRO"));

        assert_eq!(
            product.attribute("color"),
            Some(AttributeValue::from("NEGRO"))
        );
    }

    #[test]
    fn test_attribute_falls_back_to_flat_field() {
        let mut product = product();
        product.brand = Some("Nike".to_string());

        assert_eq!(
            product.attribute("brand"),
            Some(AttributeValue::from("Nike"))
        );
        assert_eq!(product.attribute("pattern"), None);
    }

    #[test]
    fn test_attribute_key_is_case_insensitive() {
        let mut product = product();
        product
            .attributes
            .insert("pattern".to_string(), AttributeValue::from("liso"));

        assert_eq!(
            product.attribute("Pattern"),
            Some(AttributeValue::from("liso"))
        );
    }

    #[test]
    fn test_attribute_value_list_iteration() {
        let value = AttributeValue::List(vec!["algodon".to_string(), "lino".to_string()]);
        let values: Vec<&str> = value.values().collect();
        assert_eq!(values, vec!["algodon", "lino"]);
    }
}
