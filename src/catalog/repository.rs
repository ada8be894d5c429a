//! Ports to the external catalog store and blob storage.
//!
//! The relational store, its schema and the CDN are black boxes; the core
//! consumes them through these narrow async traits. An in-memory
//! implementation backs tests and embedded usage.

use ahash::AHashMap;
use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::catalog::category::Category;
use crate::catalog::image::CatalogImage;
use crate::catalog::product::Product;
use crate::error::{Result, VisuraError};
use crate::ranking::WeightConfig;

/// Read-only access to one client's catalog.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// All images of products in the given category, regardless of state.
    async fn images_for_category(&self, category_id: Uuid) -> Result<Vec<CatalogImage>>;

    /// Products belonging to any of the given categories.
    async fn products_in_categories(&self, category_ids: &[Uuid]) -> Result<Vec<Product>>;

    /// Categories of one client.
    async fn categories_for_client(&self, client_id: Uuid) -> Result<Vec<Category>>;

    /// The client's ranking weight configuration.
    async fn weight_config(&self, client_id: Uuid) -> Result<WeightConfig>;
}

/// Resolves a blob-store URL to raw image bytes.
///
/// May fail on network errors; this core performs no retries, the caller
/// decides whether to skip the item.
#[async_trait]
pub trait BlobResolver: Send + Sync {
    /// Fetch the raw bytes behind a blob URL.
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>>;
}

/// In-memory catalog repository.
///
/// Holds everything behind `parking_lot` locks; suitable for tests and for
/// embedding the engine against a pre-loaded snapshot of a catalog.
#[derive(Debug, Default)]
pub struct InMemoryCatalogRepository {
    categories: RwLock<AHashMap<Uuid, Category>>,
    products: RwLock<AHashMap<Uuid, Product>>,
    images: RwLock<Vec<CatalogImage>>,
    weight_configs: RwLock<AHashMap<Uuid, WeightConfig>>,
}

impl InMemoryCatalogRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a category.
    pub fn put_category(&self, category: Category) {
        self.categories.write().insert(category.id, category);
    }

    /// Insert or replace a product.
    pub fn put_product(&self, product: Product) {
        self.products.write().insert(product.id, product);
    }

    /// Append an image.
    pub fn put_image(&self, image: CatalogImage) {
        self.images.write().push(image);
    }

    /// Set a client's weight configuration.
    pub fn put_weight_config(&self, client_id: Uuid, config: WeightConfig) {
        self.weight_configs.write().insert(client_id, config);
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn images_for_category(&self, category_id: Uuid) -> Result<Vec<CatalogImage>> {
        let products = self.products.read();
        let product_ids: Vec<Uuid> = products
            .values()
            .filter(|product| product.category_id == category_id)
            .map(|product| product.id)
            .collect();

        let images = self.images.read();
        Ok(images
            .iter()
            .filter(|image| product_ids.contains(&image.product_id))
            .cloned()
            .collect())
    }

    async fn products_in_categories(&self, category_ids: &[Uuid]) -> Result<Vec<Product>> {
        let products = self.products.read();
        Ok(products
            .values()
            .filter(|product| category_ids.contains(&product.category_id))
            .cloned()
            .collect())
    }

    async fn categories_for_client(&self, client_id: Uuid) -> Result<Vec<Category>> {
        let categories = self.categories.read();
        let mut result: Vec<Category> = categories
            .values()
            .filter(|category| category.client_id == client_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn weight_config(&self, client_id: Uuid) -> Result<WeightConfig> {
        self.weight_configs
            .read()
            .get(&client_id)
            .cloned()
            .ok_or_else(|| {
                VisuraError::not_found(format!("weight config for client {client_id}"))
            })
    }
}

/// Blob resolver backed by a preloaded URL → bytes map.
#[derive(Debug, Default)]
pub struct InMemoryBlobResolver {
    blobs: RwLock<AHashMap<String, Vec<u8>>>,
}

impl InMemoryBlobResolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register bytes for a URL.
    pub fn put(&self, url: impl Into<String>, bytes: Vec<u8>) {
        self.blobs.write().insert(url.into(), bytes);
    }
}

#[async_trait]
impl BlobResolver for InMemoryBlobResolver {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .get(url)
            .cloned()
            .ok_or_else(|| VisuraError::network(format!("blob not reachable: {url}")))
    }
}
