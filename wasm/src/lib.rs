//! WebAssembly module for the retail POS browser client
//!
//! Provides client-side computation for:
//! - Cart totals and cash change while offline
//! - Thermal receipt rendering
//! - Reconciliation discrepancy preview
//! - SKU and barcode validation before submit
//!
//! Structured values cross the boundary as JSON strings. Money amounts are
//! decimal strings so nothing is lost to floating point.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;
use shared::{
    compute_totals, render_receipt, settle_payment, CartLine, CountLine, PaperWidth,
    PaymentMethod, Sale, StockStatus, StoreInfo,
};
use uuid::Uuid;
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::receipt::*;
pub use shared::types::*;
pub use shared::validation::*;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    web_sys::console::log_1(&JsValue::from_str("retail POS module loaded"));
}

fn to_js(err: String) -> JsValue {
    JsValue::from_str(&err)
}

fn parse_decimal(field: &str, value: &str) -> Result<Decimal, String> {
    Decimal::from_str(value.trim()).map_err(|e| format!("Invalid {}: {}", field, e))
}

#[derive(Serialize)]
struct PricedCart {
    subtotal: Decimal,
    discount: Decimal,
    tax: Decimal,
    total: Decimal,
    amount_tendered: Decimal,
    change_due: Decimal,
}

fn price_cart(
    lines_json: &str,
    discount: &str,
    tax_rate: &str,
    payment_method: &str,
    amount_tendered: Option<String>,
) -> Result<String, String> {
    let lines: Vec<CartLine> =
        serde_json::from_str(lines_json).map_err(|e| format!("Invalid cart JSON: {}", e))?;
    let discount = if discount.trim().is_empty() {
        Decimal::ZERO
    } else {
        parse_decimal("discount", discount)?
    };
    let tax_rate = parse_decimal("tax rate", tax_rate)?;
    let method = PaymentMethod::from_str(payment_method).map_err(|e| e.to_string())?;
    let tendered = amount_tendered
        .as_deref()
        .map(|t| parse_decimal("amount tendered", t))
        .transpose()?;

    let totals = compute_totals(&lines, discount, tax_rate).map_err(|e| e.to_string())?;
    let tender = settle_payment(method, tendered, totals.total).map_err(|e| e.to_string())?;

    serde_json::to_string(&PricedCart {
        subtotal: totals.subtotal,
        discount: totals.discount,
        tax: totals.tax,
        total: totals.total,
        amount_tendered: tender.amount_tendered,
        change_due: tender.change_due,
    })
    .map_err(|e| e.to_string())
}

/// Price a cart and settle payment; returns the totals as JSON
#[wasm_bindgen]
pub fn calculate_cart(
    lines_json: &str,
    discount: &str,
    tax_rate: &str,
    payment_method: &str,
    amount_tendered: Option<String>,
) -> Result<String, JsValue> {
    price_cart(lines_json, discount, tax_rate, payment_method, amount_tendered).map_err(to_js)
}

fn receipt_text(store_json: &str, sale_json: &str, columns: usize) -> Result<String, String> {
    let store: StoreInfo =
        serde_json::from_str(store_json).map_err(|e| format!("Invalid store JSON: {}", e))?;
    let sale: Sale =
        serde_json::from_str(sale_json).map_err(|e| format!("Invalid sale JSON: {}", e))?;
    let width = PaperWidth::from_columns(columns)
        .ok_or_else(|| "Receipt width must be 32 or 48".to_string())?;
    Ok(render_receipt(&store, &sale, width))
}

/// Render a sale as thermal receipt text for a 32 or 48 column printer
#[wasm_bindgen]
pub fn render_receipt_text(
    store_json: &str,
    sale_json: &str,
    columns: usize,
) -> Result<String, JsValue> {
    receipt_text(store_json, sale_json, columns).map_err(to_js)
}

#[derive(Serialize)]
struct DiscrepancyPreview {
    discrepancy: i32,
    estimated_impact: Decimal,
    stock_after_approval: i32,
}

fn discrepancy_preview(
    system_count: i32,
    physical_count: i32,
    unit_cost: &str,
) -> Result<String, String> {
    let unit_cost = parse_decimal("unit cost", unit_cost)?;
    let line =
        CountLine::new(Uuid::nil(), system_count, physical_count).map_err(|e| e.to_string())?;
    serde_json::to_string(&DiscrepancyPreview {
        discrepancy: line.discrepancy(),
        estimated_impact: line.estimated_impact(unit_cost),
        stock_after_approval: physical_count,
    })
    .map_err(|e| e.to_string())
}

/// Preview the discrepancy and cost impact of a counted line
#[wasm_bindgen]
pub fn preview_discrepancy(
    system_count: i32,
    physical_count: i32,
    unit_cost: &str,
) -> Result<String, JsValue> {
    discrepancy_preview(system_count, physical_count, unit_cost).map_err(to_js)
}

/// SKU validation message, or `None` when the normalised SKU is valid
#[wasm_bindgen]
pub fn check_sku(sku: &str) -> Option<String> {
    validate_sku(&normalize_sku(sku)).err().map(String::from)
}

/// True for 8-14 digit barcodes with a correct GS1 check digit
#[wasm_bindgen]
pub fn is_valid_barcode(barcode: &str) -> bool {
    validate_barcode(barcode.trim()).is_ok() && has_valid_check_digit(barcode.trim())
}

/// `OUT_OF_STOCK`, `LOW_STOCK` or `IN_STOCK`
#[wasm_bindgen]
pub fn stock_status(quantity: i32, reorder_level: i32) -> String {
    match StockStatus::classify(quantity, reorder_level) {
        StockStatus::OutOfStock => "OUT_OF_STOCK",
        StockStatus::LowStock => "LOW_STOCK",
        StockStatus::InStock => "IN_STOCK",
    }
    .to_string()
}

/// Fresh idempotency key for a queued offline checkout
#[wasm_bindgen]
pub fn new_client_reference() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    const CART: &str = r#"[
        {"product_id":"6f1c2a9e-0000-4000-8000-000000000001","name":"Cola","quantity":2,"unit_price":"1.50"},
        {"product_id":"6f1c2a9e-0000-4000-8000-000000000002","name":"Chips","quantity":1,"unit_price":"2.00"}
    ]"#;

    #[test]
    fn test_price_cart_with_cash_change() {
        let json = price_cart(CART, "", "0.10", "CASH", Some("10".into())).unwrap();
        let v: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["subtotal"], "5.00");
        assert_eq!(v["tax"], "0.50");
        assert_eq!(v["total"], "5.50");
        assert_eq!(v["change_due"], "4.50");
    }

    #[test]
    fn test_price_cart_errors() {
        assert!(price_cart("[]", "", "0", "CASH", None)
            .unwrap_err()
            .contains("empty"));
        assert!(price_cart(CART, "", "0", "CHEQUE", None).is_err());
        assert!(price_cart(CART, "", "0", "CASH", Some("1".into())).is_err());
        assert!(price_cart(CART, "99", "0", "CARD", None).is_err());
    }

    #[test]
    fn test_discrepancy_preview() {
        let json = discrepancy_preview(12, 9, "2.25").unwrap();
        let v: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["discrepancy"], -3);
        assert_eq!(v["estimated_impact"], "-6.75");
        assert_eq!(v["stock_after_approval"], 9);

        assert!(discrepancy_preview(5, -1, "1").is_err());
    }

    #[test]
    fn test_receipt_width_checked() {
        assert!(receipt_text("{}", "{}", 40).is_err());
    }

    #[test]
    fn test_sku_and_barcode_checks() {
        assert_eq!(check_sku(" bev-001 "), None);
        assert!(check_sku("a").is_some());
        assert!(is_valid_barcode("4006381333931"));
        assert!(!is_valid_barcode("4006381333932"));
        assert!(!is_valid_barcode("12AB5678"));
    }

    #[test]
    fn test_stock_status_labels() {
        assert_eq!(stock_status(0, 5), "OUT_OF_STOCK");
        assert_eq!(stock_status(5, 5), "LOW_STOCK");
        assert_eq!(stock_status(6, 5), "IN_STOCK");
    }

    #[test]
    fn test_client_reference_is_uuid() {
        assert!(Uuid::parse_str(&new_client_reference()).is_ok());
    }
}
