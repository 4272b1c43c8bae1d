//! Product catalog records stored in `products.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tienda_core::{Price, ProductId};

/// A product in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Price,
    /// Crossed-out "before" price.
    #[serde(default)]
    pub compare_at_price: Option<Price>,
    /// Units available. Can go negative when an order oversells.
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub featured: bool,
    /// Display order in the storefront, set by drag-and-drop.
    #[serde(default)]
    pub position: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const fn default_true() -> bool {
    true
}

/// Editable product fields, validated from the product form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductInput {
    pub name: String,
    pub description: String,
    pub price: Price,
    pub compare_at_price: Option<Price>,
    pub stock: i64,
    pub category: String,
    pub image_url: Option<String>,
    pub active: bool,
    pub featured: bool,
}

impl Product {
    /// Build a new product at the end of the catalog.
    #[must_use]
    pub fn new(input: ProductInput, position: u32) -> Self {
        let now = Utc::now();
        Self {
            id: ProductId::generate(),
            name: input.name,
            description: input.description,
            price: input.price,
            compare_at_price: input.compare_at_price,
            stock: input.stock,
            category: input.category,
            image_url: input.image_url,
            active: input.active,
            featured: input.featured,
            position,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite the editable fields.
    pub fn apply(&mut self, input: ProductInput) {
        self.name = input.name;
        self.description = input.description;
        self.price = input.price;
        self.compare_at_price = input.compare_at_price;
        self.stock = input.stock;
        self.category = input.category;
        self.image_url = input.image_url;
        self.active = input.active;
        self.featured = input.featured;
        self.updated_at = Utc::now();
    }

    /// Whether the product is on sale (compare-at price above price).
    #[must_use]
    pub fn on_sale(&self) -> bool {
        self.compare_at_price.is_some_and(|before| before > self.price)
    }
}
