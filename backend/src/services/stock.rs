//! Stock ledger helpers shared by sales, purchasing and reconciliation
//!
//! All functions run on a caller-owned connection so they take part in the
//! caller's transaction.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use shared::StockMovementType;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Product row locked with `SELECT ... FOR UPDATE`
#[derive(Debug, Clone, FromRow)]
pub struct LockedProduct {
    pub id: Uuid,
    pub name: String,
    pub sku: String,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    pub stock_quantity: i32,
    pub reorder_level: i32,
    pub is_active: bool,
}

/// A stock change to append to the ledger
#[derive(Debug, Clone)]
pub struct NewMovement<'a> {
    pub product_id: Uuid,
    pub movement_type: StockMovementType,
    pub quantity: i32,
    pub quantity_after: i32,
    pub reference_type: Option<&'a str>,
    pub reference_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
}

/// Lock a single product row
pub async fn lock_product(conn: &mut PgConnection, product_id: Uuid) -> AppResult<LockedProduct> {
    sqlx::query_as::<_, LockedProduct>(
        r#"
        SELECT id, name, sku, cost_price, selling_price, stock_quantity, reorder_level, is_active
        FROM products
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(product_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Product {}", product_id)))
}

/// Lock several products in id order
pub async fn lock_products(
    conn: &mut PgConnection,
    product_ids: &[Uuid],
) -> AppResult<Vec<LockedProduct>> {
    let rows = sqlx::query_as::<_, LockedProduct>(
        r#"
        SELECT id, name, sku, cost_price, selling_price, stock_quantity, reorder_level, is_active
        FROM products
        WHERE id = ANY($1)
        ORDER BY id
        FOR UPDATE
        "#,
    )
    .bind(product_ids)
    .fetch_all(&mut *conn)
    .await?;

    if let Some(missing) = product_ids
        .iter()
        .find(|id| !rows.iter().any(|r| r.id == **id))
    {
        return Err(AppError::NotFound(format!("Product {}", missing)));
    }
    Ok(rows)
}

/// Stock after adding `quantity`; totals past `i32::MAX` are rejected
pub fn add_stock(product_id: Uuid, on_hand: i32, quantity: i32) -> AppResult<i32> {
    on_hand.checked_add(quantity).ok_or_else(|| {
        AppError::validation(
            "quantity",
            format!("Stock for product {} would exceed the supported maximum", product_id),
        )
    })
}

/// Set a product's stock to `quantity_after` and record the movement
pub async fn apply_movement(conn: &mut PgConnection, movement: NewMovement<'_>) -> AppResult<()> {
    sqlx::query("UPDATE products SET stock_quantity = $2, updated_at = NOW() WHERE id = $1")
        .bind(movement.product_id)
        .bind(movement.quantity_after)
        .execute(&mut *conn)
        .await?;

    record_movement(conn, &movement).await
}

/// Append a movement without touching the product row
pub async fn record_movement(conn: &mut PgConnection, movement: &NewMovement<'_>) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO stock_movements (
            product_id, movement_type, quantity, quantity_after,
            reference_type, reference_id, created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(movement.product_id)
    .bind(movement.movement_type.as_str())
    .bind(movement.quantity)
    .bind(movement.quantity_after)
    .bind(movement.reference_type)
    .bind(movement.reference_id)
    .bind(movement.created_by)
    .execute(&mut *conn)
    .await?;

    tracing::debug!(
        product_id = %movement.product_id,
        movement_type = %movement.movement_type,
        quantity = movement.quantity,
        quantity_after = movement.quantity_after,
        "stock movement recorded"
    );
    Ok(())
}

/// Next value of a per-day document counter (receipts, purchase orders)
pub async fn next_document_sequence(
    conn: &mut PgConnection,
    prefix: &str,
    date: NaiveDate,
) -> AppResult<i64> {
    let value = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO document_sequences (prefix, sequence_date, last_value)
        VALUES ($1, $2, 1)
        ON CONFLICT (prefix, sequence_date)
        DO UPDATE SET last_value = document_sequences.last_value + 1
        RETURNING last_value
        "#,
    )
    .bind(prefix)
    .bind(date)
    .fetch_one(&mut *conn)
    .await?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_stock_sums() {
        assert_eq!(add_stock(Uuid::new_v4(), 10, 5).unwrap(), 15);
    }

    #[test]
    fn add_stock_overflow_is_a_validation_error() {
        let err = add_stock(Uuid::new_v4(), 2_147_483_000, 1000).unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "quantity"));
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
