//! Product domain model.
//!
//! Products are owner-scoped catalog entries addressed by their
//! external `product_id` (SKU or engineering id), not by row id.
//! Marketing products carry the attributes that drive policy; the
//! engineering products they provide mostly exist to be matched
//! against installed products.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A piece of content a product grants access to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductContent {
    pub content_id: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub owner_id: Uuid,
    /// External identifier, unique within the owner.
    pub product_id: String,
    pub name: String,
    /// Quantity multiplier applied when pools are created from
    /// subscriptions of this product.
    pub multiplier: i64,
    pub attributes: BTreeMap<String, String>,
    /// Product ids this product depends on.
    pub dependent_product_ids: Vec<String>,
    pub content: Vec<ProductContent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Attribute lookup on this product alone. A `"0"` value counts
    /// as unset, matching the merged-view rules.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        match self.attributes.get(name).map(String::as_str) {
            Some("0") | None => None,
            Some(value) => Some(value),
        }
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }
}

/// Fields required to create a new product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProduct {
    pub owner_id: Uuid,
    pub product_id: String,
    pub name: String,
    pub multiplier: Option<i64>,
    pub attributes: Option<BTreeMap<String, String>>,
    pub dependent_product_ids: Option<Vec<String>>,
    pub content: Option<Vec<ProductContent>>,
}

/// Fields that can be updated on an existing product.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub multiplier: Option<i64>,
    pub attributes: Option<BTreeMap<String, String>>,
    pub dependent_product_ids: Option<Vec<String>>,
    pub content: Option<Vec<ProductContent>>,
}
