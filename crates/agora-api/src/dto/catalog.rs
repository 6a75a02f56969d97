//! Catalog DTOs

use serde::{Deserialize, Serialize};

use agora_types::Product;

/// Catalog search query parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductsQuery {
    /// Free-text search
    #[serde(default)]
    pub q: Option<String>,
    /// Category filter
    #[serde(default)]
    pub category: Option<String>,
    /// Page size
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Catalog listing, same shape the store serves
#[derive(Debug, Clone, Serialize)]
pub struct ProductsResponse {
    pub products: Vec<Product>,
}
