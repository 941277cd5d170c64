//! Stock movement ledger models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cause of a stock change
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockMovementType {
    Initial,
    Sale,
    SaleVoid,
    PurchaseReceipt,
    Reconciliation,
}

text_enum!(StockMovementType, "stock movement type", {
    Initial => "INITIAL",
    Sale => "SALE",
    SaleVoid => "SALE_VOID",
    PurchaseReceipt => "PURCHASE_RECEIPT",
    Reconciliation => "RECONCILIATION",
});

/// A signed change to a product's stock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: Uuid,
    pub product_id: Uuid,
    pub movement_type: StockMovementType,
    /// Positive adds stock, negative removes it
    pub quantity: i32,
    pub quantity_after: i32,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
