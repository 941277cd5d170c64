//! Catalog models: products, categories, brands and suppliers

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A sellable product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub sku: String,
    pub barcode: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub brand_id: Option<Uuid>,
    pub supplier_id: Option<Uuid>,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    pub stock_quantity: i32,
    pub reorder_level: i32,
    pub unit: String,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn stock_status(&self) -> StockStatus {
        StockStatus::classify(self.stock_quantity, self.reorder_level)
    }

    /// Gross margin per unit at current prices
    pub fn unit_margin(&self) -> Decimal {
        self.selling_price - self.cost_price
    }
}

/// Stock availability bucket derived from quantity and reorder level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    OutOfStock,
    LowStock,
    InStock,
}

impl StockStatus {
    pub fn classify(quantity: i32, reorder_level: i32) -> Self {
        if quantity <= 0 {
            StockStatus::OutOfStock
        } else if quantity <= reorder_level {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }

    /// True when moving from `before` to `after` newly drops to or below the
    /// reorder level.
    pub fn crossed_reorder_level(before: i32, after: i32, reorder_level: i32) -> bool {
        before > reorder_level && after <= reorder_level
    }
}

/// A product category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A product brand
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Brand {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A supplier products are purchased from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supplier {
    pub id: Uuid,
    pub name: String,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Categories created by the seed script
pub const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("Beverages", "Soft drinks, juices, water and hot drinks"),
    ("Snacks", "Chips, biscuits and confectionery"),
    ("Groceries", "Packaged food and pantry staples"),
    ("Household", "Cleaning and home supplies"),
    ("Personal Care", "Toiletries and hygiene products"),
];
