//! Purchase order models and lifecycle

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::round_money;

/// Purchase order status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseOrderStatus {
    Draft,
    Ordered,
    PartiallyReceived,
    Received,
    Cancelled,
}

text_enum!(PurchaseOrderStatus, "purchase order status", {
    Draft => "DRAFT",
    Ordered => "ORDERED",
    PartiallyReceived => "PARTIALLY_RECEIVED",
    Received => "RECEIVED",
    Cancelled => "CANCELLED",
});

impl PurchaseOrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PurchaseOrderStatus::Received | PurchaseOrderStatus::Cancelled)
    }

    pub fn is_editable(&self) -> bool {
        matches!(self, PurchaseOrderStatus::Draft)
    }

    pub fn can_receive(&self) -> bool {
        matches!(
            self,
            PurchaseOrderStatus::Ordered | PurchaseOrderStatus::PartiallyReceived
        )
    }

    pub fn can_transition_to(&self, next: PurchaseOrderStatus) -> bool {
        use PurchaseOrderStatus::*;
        matches!(
            (self, next),
            (Draft, Ordered)
                | (Draft, Cancelled)
                | (Ordered, Cancelled)
                | (Ordered, PartiallyReceived)
                | (Ordered, Received)
                | (PartiallyReceived, PartiallyReceived)
                | (PartiallyReceived, Received)
        )
    }
}

/// Purchase order errors raised by lifecycle rules
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PurchaseOrderError {
    #[error("cannot move purchase order from {from} to {to}")]
    InvalidTransition {
        from: PurchaseOrderStatus,
        to: PurchaseOrderStatus,
    },

    #[error("purchase order is {0} and can no longer be edited")]
    NotEditable(PurchaseOrderStatus),

    #[error("purchase order must contain at least one line")]
    NoLines,

    #[error("line quantity must be positive")]
    NonPositiveQuantity,

    #[error("receiving {requested} of line {line_id} exceeds outstanding quantity {outstanding}")]
    OverReceipt {
        line_id: Uuid,
        requested: i32,
        outstanding: i32,
    },

    #[error("line {0} does not belong to this purchase order")]
    UnknownLine(Uuid),
}

/// A purchase order with its lines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: Uuid,
    pub po_number: String,
    pub supplier_id: Uuid,
    pub supplier_name: String,
    pub status: PurchaseOrderStatus,
    pub expected_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub ordered_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub lines: Vec<PurchaseOrderLine>,
    pub total_cost: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A purchase order line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchaseOrderLine {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity_ordered: i32,
    pub quantity_received: i32,
    pub unit_cost: Decimal,
    pub line_total: Decimal,
}

impl PurchaseOrderLine {
    pub fn outstanding(&self) -> i32 {
        (self.quantity_ordered - self.quantity_received).max(0)
    }

    pub fn is_fully_received(&self) -> bool {
        self.quantity_received >= self.quantity_ordered
    }
}

/// Cost of a line at ordered quantity
pub fn line_total(quantity: i32, unit_cost: Decimal) -> Decimal {
    round_money(Decimal::from(quantity) * unit_cost)
}

/// Sum of line totals
pub fn order_total(lines: &[PurchaseOrderLine]) -> Decimal {
    lines.iter().map(|l| l.line_total).sum()
}

/// Validate a receipt of `quantity` units against a line
pub fn check_receipt(line: &PurchaseOrderLine, quantity: i32) -> Result<(), PurchaseOrderError> {
    if quantity <= 0 {
        return Err(PurchaseOrderError::NonPositiveQuantity);
    }
    if quantity > line.outstanding() {
        return Err(PurchaseOrderError::OverReceipt {
            line_id: line.id,
            requested: quantity,
            outstanding: line.outstanding(),
        });
    }
    Ok(())
}

/// Status after a receipt has been applied to `lines`
pub fn status_after_receipt(lines: &[PurchaseOrderLine]) -> PurchaseOrderStatus {
    if lines.iter().all(PurchaseOrderLine::is_fully_received) {
        PurchaseOrderStatus::Received
    } else {
        PurchaseOrderStatus::PartiallyReceived
    }
}

/// Format a purchase order number, e.g. `PO-20240315-0007`
pub fn format_po_number(date: NaiveDate, sequence: i64) -> String {
    format!("PO-{}-{:04}", date.format("%Y%m%d"), sequence)
}
