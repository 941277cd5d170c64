//! Point-of-sale models: carts, totals and completed sales

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::round_money;
use crate::validation::validate_price;

/// How a sale was paid
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Card,
    MobileMoney,
}

text_enum!(PaymentMethod, "payment method", {
    Cash => "CASH",
    Card => "CARD",
    MobileMoney => "MOBILE_MONEY",
});

impl PaymentMethod {
    /// Human label for receipts
    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "Cash",
            PaymentMethod::Card => "Card",
            PaymentMethod::MobileMoney => "Mobile Money",
        }
    }
}

/// Sale status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleStatus {
    Completed,
    Voided,
}

text_enum!(SaleStatus, "sale status", {
    Completed => "COMPLETED",
    Voided => "VOIDED",
});

/// Errors raised while pricing a cart
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CartError {
    #[error("cart is empty")]
    Empty,

    #[error("quantity for product {0} must be positive")]
    NonPositiveQuantity(Uuid),

    #[error("discount must be between zero and the subtotal")]
    InvalidDiscount,

    #[error("amount tendered must be a non-negative amount with at most two decimal places")]
    InvalidAmount,

    #[error("amount tendered {tendered} is less than total {total}")]
    InsufficientPayment { tendered: Decimal, total: Decimal },

    #[error("insufficient stock for {product}: requested {requested}, available {available}")]
    InsufficientStock {
        product: String,
        requested: i32,
        available: i32,
    },
}

/// A priced cart line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CartLine {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal {
        round_money(self.unit_price * Decimal::from(self.quantity))
    }
}

/// Totals for a cart
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CartTotals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Price a cart: discount applies before tax
pub fn compute_totals(
    lines: &[CartLine],
    discount: Decimal,
    tax_rate: Decimal,
) -> Result<CartTotals, CartError> {
    if lines.is_empty() {
        return Err(CartError::Empty);
    }
    if let Some(bad) = lines.iter().find(|l| l.quantity <= 0) {
        return Err(CartError::NonPositiveQuantity(bad.product_id));
    }

    let subtotal: Decimal = lines.iter().map(CartLine::line_total).sum();
    if validate_price(discount).is_err() || discount > subtotal {
        return Err(CartError::InvalidDiscount);
    }

    let taxable = subtotal - discount;
    let tax = round_money(taxable * tax_rate);
    Ok(CartTotals {
        subtotal,
        discount,
        tax,
        total: taxable + tax,
    })
}

/// Settled payment amounts
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Tender {
    pub amount_tendered: Decimal,
    pub change_due: Decimal,
}

/// Settle payment: cash may overpay and receive change, other methods are
/// charged the exact total.
pub fn settle_payment(
    method: PaymentMethod,
    amount_tendered: Option<Decimal>,
    total: Decimal,
) -> Result<Tender, CartError> {
    match method {
        PaymentMethod::Cash => {
            let tendered = amount_tendered.unwrap_or(total);
            if validate_price(tendered).is_err() {
                return Err(CartError::InvalidAmount);
            }
            if tendered < total {
                return Err(CartError::InsufficientPayment { tendered, total });
            }
            Ok(Tender {
                amount_tendered: tendered,
                change_due: tendered - total,
            })
        }
        PaymentMethod::Card | PaymentMethod::MobileMoney => Ok(Tender {
            amount_tendered: total,
            change_due: Decimal::ZERO,
        }),
    }
}

/// A completed sale
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sale {
    pub id: Uuid,
    pub receipt_number: String,
    pub client_reference: Option<Uuid>,
    pub status: SaleStatus,
    pub cashier_id: Uuid,
    pub cashier_name: String,
    pub customer_name: Option<String>,
    pub payment_method: PaymentMethod,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub amount_tendered: Decimal,
    pub change_due: Decimal,
    pub lines: Vec<SaleLine>,
    pub sold_at: DateTime<Utc>,
    pub voided_at: Option<DateTime<Utc>>,
    pub void_reason: Option<String>,
}

/// A line of a completed sale with a price snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaleLine {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub sku: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// Result of replaying one queued offline checkout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfflineSyncOutcome {
    Applied { sale_id: Uuid, receipt_number: String },
    Duplicate { sale_id: Uuid, receipt_number: String },
    Failed { code: String, message: String },
}

/// Format a receipt number, e.g. `RCP-20240315-000042`
pub fn format_receipt_number(date: NaiveDate, sequence: i64) -> String {
    format!("RCP-{}-{:06}", date.format("%Y%m%d"), sequence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn line(qty: i32, price: &str) -> CartLine {
        CartLine {
            product_id: Uuid::new_v4(),
            name: "Item".to_string(),
            quantity: qty,
            unit_price: dec(price),
        }
    }

    #[test]
    fn totals_apply_discount_before_tax() {
        let totals =
            compute_totals(&[line(2, "5.00"), line(1, "10.00")], dec("2.00"), dec("0.10"))
                .unwrap();
        assert_eq!(totals.subtotal, dec("20.00"));
        assert_eq!(totals.tax, dec("1.80"));
        assert_eq!(totals.total, dec("19.80"));
    }

    #[test]
    fn rejects_bad_carts() {
        assert_eq!(
            compute_totals(&[], Decimal::ZERO, Decimal::ZERO),
            Err(CartError::Empty)
        );
        assert_eq!(
            compute_totals(&[line(1, "1.00")], dec("2.00"), Decimal::ZERO),
            Err(CartError::InvalidDiscount)
        );
        let bad = line(0, "1.00");
        assert_eq!(
            compute_totals(&[bad.clone()], Decimal::ZERO, Decimal::ZERO),
            Err(CartError::NonPositiveQuantity(bad.product_id))
        );
    }

    #[test]
    fn cash_change_and_card_exact() {
        let t = settle_payment(PaymentMethod::Cash, Some(dec("50")), dec("19.80")).unwrap();
        assert_eq!(t.change_due, dec("30.20"));

        assert!(settle_payment(PaymentMethod::Cash, Some(dec("10")), dec("19.80")).is_err());

        let t = settle_payment(PaymentMethod::Card, Some(dec("100")), dec("19.80")).unwrap();
        assert_eq!(t.amount_tendered, dec("19.80"));
        assert_eq!(t.change_due, Decimal::ZERO);
    }

    #[test]
    fn receipt_number_format() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(format_receipt_number(date, 42), "RCP-20240102-000042");
    }
}
