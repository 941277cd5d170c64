//! POS checkout and sales history
//!
//! Checkout prices the cart from current selling prices, decrements stock and
//! books the income in one database transaction. A `client_reference` makes
//! checkout idempotent so queued offline sales can be replayed safely.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    compute_totals, format_receipt_number, render_receipt, settle_payment, CartError, CartLine,
    CartTotals, FinancialCategory, FinancialTransactionType, PaginatedResponse, Pagination,
    PaperWidth, PaymentMethod, Sale, SaleLine, SaleStatus, StockMovementType, StockStatus,
    StoreInfo, Tender,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::finance::{record_transaction, NewTransaction};
use crate::services::notification::{dispatch, LowStockProduct, NotificationService};
use crate::services::stock::{
    add_stock, apply_movement, lock_products, next_document_sequence, NewMovement,
};

/// Sale service
#[derive(Clone)]
pub struct SaleService {
    db: PgPool,
    notifications: NotificationService,
    tax_rate: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutLineInput {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Checkout request from the POS
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CheckoutInput {
    pub lines: Vec<CheckoutLineInput>,
    pub discount: Option<Decimal>,
    pub payment_method: PaymentMethod,
    pub amount_tendered: Option<Decimal>,
    #[validate(length(max = 200, message = "Customer name must be at most 200 characters"))]
    pub customer_name: Option<String>,
    /// Idempotency key generated by the client
    pub client_reference: Option<Uuid>,
    /// When the sale happened on the till; used for queued offline sales
    pub sold_at: Option<DateTime<Utc>>,
}

/// Result of a checkout
#[derive(Debug, Serialize)]
pub struct CheckoutOutcome {
    pub sale: Sale,
    /// The client reference had already been used and nothing was written
    pub duplicate: bool,
}

#[derive(Debug, Deserialize)]
pub struct VoidInput {
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SaleFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<SaleStatus>,
    pub cashier_id: Option<Uuid>,
}

/// Row in the sales list
#[derive(Debug, Serialize, FromRow)]
pub struct SaleSummary {
    pub id: Uuid,
    pub receipt_number: String,
    pub status: String,
    pub cashier_name: String,
    pub customer_name: Option<String>,
    pub payment_method: String,
    pub item_count: i64,
    pub total: Decimal,
    pub sold_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct SaleRow {
    id: Uuid,
    receipt_number: String,
    client_reference: Option<Uuid>,
    status: String,
    cashier_id: Uuid,
    cashier_name: String,
    customer_name: Option<String>,
    payment_method: String,
    subtotal: Decimal,
    discount: Decimal,
    tax: Decimal,
    total: Decimal,
    amount_tendered: Decimal,
    change_due: Decimal,
    sold_at: DateTime<Utc>,
    voided_at: Option<DateTime<Utc>>,
    void_reason: Option<String>,
}

impl SaleRow {
    fn into_sale(self, lines: Vec<SaleLine>) -> AppResult<Sale> {
        Ok(Sale {
            id: self.id,
            receipt_number: self.receipt_number,
            client_reference: self.client_reference,
            status: self.status.parse()?,
            cashier_id: self.cashier_id,
            cashier_name: self.cashier_name,
            customer_name: self.customer_name,
            payment_method: self.payment_method.parse()?,
            subtotal: self.subtotal,
            discount: self.discount,
            tax: self.tax,
            total: self.total,
            amount_tendered: self.amount_tendered,
            change_due: self.change_due,
            lines,
            sold_at: self.sold_at,
            voided_at: self.voided_at,
            void_reason: self.void_reason,
        })
    }
}

#[derive(Debug, FromRow)]
struct SaleLineRow {
    id: Uuid,
    product_id: Uuid,
    product_name: String,
    sku: String,
    quantity: i32,
    unit_price: Decimal,
    line_total: Decimal,
}

impl From<SaleLineRow> for SaleLine {
    fn from(row: SaleLineRow) -> Self {
        SaleLine {
            id: row.id,
            product_id: row.product_id,
            product_name: row.product_name,
            sku: row.sku,
            quantity: row.quantity,
            unit_price: row.unit_price,
            line_total: row.line_total,
        }
    }
}

/// What checkout already holds once its transaction commits
struct CommittedSale {
    id: Uuid,
    receipt_number: String,
    client_reference: Option<Uuid>,
    cashier_id: Uuid,
    cashier_name: String,
    customer_name: Option<String>,
    payment_method: PaymentMethod,
    totals: CartTotals,
    tender: Tender,
    sold_at: DateTime<Utc>,
    lines: Vec<SaleLine>,
}

impl CommittedSale {
    fn into_sale(mut self) -> Sale {
        // Same order as a sale read back from the database.
        self.lines.sort_by(|a, b| a.product_name.cmp(&b.product_name));
        Sale {
            id: self.id,
            receipt_number: self.receipt_number,
            client_reference: self.client_reference,
            status: SaleStatus::Completed,
            cashier_id: self.cashier_id,
            cashier_name: self.cashier_name,
            customer_name: self.customer_name,
            payment_method: self.payment_method,
            subtotal: self.totals.subtotal,
            discount: self.totals.discount,
            tax: self.totals.tax,
            total: self.totals.total,
            amount_tendered: self.tender.amount_tendered,
            change_due: self.tender.change_due,
            lines: self.lines,
            sold_at: self.sold_at,
            voided_at: None,
            void_reason: None,
        }
    }
}

const SALE_SELECT: &str = r#"
    SELECT s.id, s.receipt_number, s.client_reference, s.status, s.cashier_id,
           u.name AS cashier_name, s.customer_name, s.payment_method, s.subtotal,
           s.discount, s.tax, s.total, s.amount_tendered, s.change_due, s.sold_at,
           s.voided_at, s.void_reason
    FROM sales s
    JOIN users u ON u.id = s.cashier_id
"#;

impl SaleService {
    pub fn new(db: PgPool, notifications: NotificationService, tax_rate: Decimal) -> Self {
        Self {
            db,
            notifications,
            tax_rate,
        }
    }

    /// Complete a sale
    pub async fn checkout(&self, actor: &AuthUser, input: CheckoutInput) -> AppResult<CheckoutOutcome> {
        input.validate()?;

        if let Some(reference) = input.client_reference {
            if let Some(existing) = self.find_by_reference(reference).await? {
                tracing::info!(client_reference = %reference, sale_id = %existing.id, "duplicate checkout ignored");
                return Ok(CheckoutOutcome {
                    sale: existing,
                    duplicate: true,
                });
            }
        }

        let quantities = merge_lines(&input.lines)?;
        let now = Utc::now();
        let sold_at = resolve_sold_at(input.sold_at, now);

        let mut tx = self.db.begin().await?;

        let mut product_ids: Vec<Uuid> = quantities.keys().copied().collect();
        product_ids.sort();
        let products = lock_products(&mut tx, &product_ids).await?;

        let mut cart = Vec::with_capacity(products.len());
        for product in &products {
            let quantity = quantities[&product.id];
            if !product.is_active {
                return Err(AppError::validation(
                    "lines",
                    format!("{} is no longer sold", product.name),
                ));
            }
            if quantity > product.stock_quantity {
                return Err(CartError::InsufficientStock {
                    product: product.name.clone(),
                    requested: quantity,
                    available: product.stock_quantity,
                }
                .into());
            }
            cart.push(CartLine {
                product_id: product.id,
                name: product.name.clone(),
                quantity,
                unit_price: product.selling_price,
            });
        }

        let totals = compute_totals(&cart, input.discount.unwrap_or(Decimal::ZERO), self.tax_rate)?;
        let tender = settle_payment(input.payment_method, input.amount_tendered, totals.total)?;

        let sale_date = sold_at.date_naive();
        let sequence = next_document_sequence(&mut tx, "RCP", sale_date).await?;
        let receipt_number = format_receipt_number(sale_date, sequence);
        let customer_name = input
            .customer_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        let inserted = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO sales (
                receipt_number, client_reference, status, cashier_id, customer_name,
                payment_method, subtotal, discount, tax, total, amount_tendered, change_due, sold_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (client_reference) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&receipt_number)
        .bind(input.client_reference)
        .bind(SaleStatus::Completed.as_str())
        .bind(actor.user_id)
        .bind(&customer_name)
        .bind(input.payment_method.as_str())
        .bind(totals.subtotal)
        .bind(totals.discount)
        .bind(totals.tax)
        .bind(totals.total)
        .bind(tender.amount_tendered)
        .bind(tender.change_due)
        .bind(sold_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(sale_id) = inserted else {
            // Another request with the same reference committed first.
            tx.rollback().await?;
            let reference = input
                .client_reference
                .ok_or_else(|| AppError::Internal("sale insert skipped without reference".into()))?;
            let existing = self
                .find_by_reference(reference)
                .await?
                .ok_or_else(|| AppError::Internal("conflicting sale not found".into()))?;
            return Ok(CheckoutOutcome {
                sale: existing,
                duplicate: true,
            });
        };

        let cashier_name =
            sqlx::query_scalar::<_, String>("SELECT name FROM users WHERE id = $1")
                .bind(actor.user_id)
                .fetch_one(&mut *tx)
                .await?;

        let mut crossed = Vec::new();
        let mut sale_lines = Vec::with_capacity(cart.len());
        for (product, line) in products.iter().zip(&cart) {
            let line_id = sqlx::query_scalar::<_, Uuid>(
                r#"
                INSERT INTO sale_lines (
                    sale_id, product_id, product_name, sku, quantity, unit_price, unit_cost, line_total
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING id
                "#,
            )
            .bind(sale_id)
            .bind(product.id)
            .bind(&product.name)
            .bind(&product.sku)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(product.cost_price)
            .bind(line.line_total())
            .fetch_one(&mut *tx)
            .await?;
            sale_lines.push(SaleLine {
                id: line_id,
                product_id: product.id,
                product_name: product.name.clone(),
                sku: product.sku.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
                line_total: line.line_total(),
            });

            let after = product.stock_quantity - line.quantity;
            apply_movement(
                &mut tx,
                NewMovement {
                    product_id: product.id,
                    movement_type: StockMovementType::Sale,
                    quantity: -line.quantity,
                    quantity_after: after,
                    reference_type: Some("sale"),
                    reference_id: Some(sale_id),
                    created_by: Some(actor.user_id),
                },
            )
            .await?;

            if StockStatus::crossed_reorder_level(product.stock_quantity, after, product.reorder_level) {
                crossed.push(LowStockProduct {
                    product_id: product.id,
                    name: product.name.clone(),
                    sku: product.sku.clone(),
                    stock_quantity: after,
                    reorder_level: product.reorder_level,
                });
            }
        }

        if totals.total > Decimal::ZERO {
            record_transaction(
                &mut tx,
                NewTransaction {
                    transaction_type: FinancialTransactionType::Income,
                    category: FinancialCategory::Sales,
                    amount: totals.total,
                    description: format!("Sale {}", receipt_number),
                    reference_type: Some("sale"),
                    reference_id: Some(sale_id),
                    transaction_date: sale_date,
                    created_by: Some(actor.user_id),
                },
            )
            .await?;
        }

        tx.commit().await?;
        tracing::info!(
            sale_id = %sale_id,
            receipt_number = %receipt_number,
            total = %totals.total,
            payment_method = %input.payment_method,
            lines = cart.len(),
            "sale completed"
        );

        if !crossed.is_empty() {
            let notifications = self.notifications.clone();
            dispatch("low_stock", async move { notifications.low_stock(&crossed).await });
        }

        // The sale is committed; answer from what was written rather than
        // risk reporting a failure for an applied sale.
        let sale = CommittedSale {
            id: sale_id,
            receipt_number,
            client_reference: input.client_reference,
            cashier_id: actor.user_id,
            cashier_name,
            customer_name,
            payment_method: input.payment_method,
            totals,
            tender,
            sold_at,
            lines: sale_lines,
        }
        .into_sale();

        Ok(CheckoutOutcome {
            sale,
            duplicate: false,
        })
    }

    /// Void a completed sale, returning its goods to stock
    pub async fn void(&self, actor: &AuthUser, id: Uuid, input: VoidInput) -> AppResult<Sale> {
        let reason = input.reason.trim().to_string();
        shared::validate_required_text(&reason, 500)
            .map_err(|m| AppError::validation("reason", m))?;

        let mut tx = self.db.begin().await?;
        let row = fetch_sale(&mut tx, id, true).await?;
        let status: SaleStatus = row.status.parse()?;
        if status != SaleStatus::Completed {
            return Err(AppError::InvalidStateTransition(format!(
                "sale {} is already {}",
                row.receipt_number, status
            )));
        }

        sqlx::query(
            r#"
            UPDATE sales SET status = $2, voided_at = NOW(), voided_by = $3, void_reason = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(SaleStatus::Voided.as_str())
        .bind(actor.user_id)
        .bind(&reason)
        .execute(&mut *tx)
        .await?;

        let lines = fetch_lines(&mut tx, id).await?;
        let mut product_ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
        product_ids.sort();
        product_ids.dedup();
        let mut stock: HashMap<Uuid, i32> = lock_products(&mut tx, &product_ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p.stock_quantity))
            .collect();

        for line in &lines {
            let on_hand = stock.entry(line.product_id).or_default();
            *on_hand = add_stock(line.product_id, *on_hand, line.quantity)?;
            apply_movement(
                &mut tx,
                NewMovement {
                    product_id: line.product_id,
                    movement_type: StockMovementType::SaleVoid,
                    quantity: line.quantity,
                    quantity_after: *on_hand,
                    reference_type: Some("sale"),
                    reference_id: Some(id),
                    created_by: Some(actor.user_id),
                },
            )
            .await?;
        }

        if row.total > Decimal::ZERO {
            record_transaction(
                &mut tx,
                NewTransaction {
                    transaction_type: FinancialTransactionType::Expense,
                    category: FinancialCategory::Refund,
                    amount: row.total,
                    description: format!("Void of sale {}: {}", row.receipt_number, reason),
                    reference_type: Some("sale"),
                    reference_id: Some(id),
                    transaction_date: Utc::now().date_naive(),
                    created_by: Some(actor.user_id),
                },
            )
            .await?;
        }

        tx.commit().await?;
        tracing::info!(sale_id = %id, receipt_number = %row.receipt_number, voided_by = %actor.user_id, "sale voided");

        self.get(id).await
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Sale> {
        let mut conn = self.db.acquire().await?;
        let row = fetch_sale(&mut conn, id, false).await?;
        let lines = fetch_lines(&mut conn, id).await?;
        row.into_sale(lines)
    }

    pub async fn list(
        &self,
        filter: &SaleFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<SaleSummary>> {
        let status = filter.status.map(|s| s.as_str());

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM sales
            WHERE ($1::date IS NULL OR sold_at::date >= $1)
              AND ($2::date IS NULL OR sold_at::date <= $2)
              AND ($3::text IS NULL OR status = $3)
              AND ($4::uuid IS NULL OR cashier_id = $4)
            "#,
        )
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(status)
        .bind(filter.cashier_id)
        .fetch_one(&self.db)
        .await?;

        let data = sqlx::query_as::<_, SaleSummary>(
            r#"
            SELECT s.id, s.receipt_number, s.status, u.name AS cashier_name, s.customer_name,
                   s.payment_method,
                   (SELECT COALESCE(SUM(quantity), 0) FROM sale_lines WHERE sale_id = s.id)::bigint
                       AS item_count,
                   s.total, s.sold_at
            FROM sales s
            JOIN users u ON u.id = s.cashier_id
            WHERE ($1::date IS NULL OR s.sold_at::date >= $1)
              AND ($2::date IS NULL OR s.sold_at::date <= $2)
              AND ($3::text IS NULL OR s.status = $3)
              AND ($4::uuid IS NULL OR s.cashier_id = $4)
            ORDER BY s.sold_at DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(status)
        .bind(filter.cashier_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse::new(data, pagination, total as u64))
    }

    /// Plain-text receipt for a thermal printer
    pub async fn receipt(&self, id: Uuid, store: &StoreInfo, width: PaperWidth) -> AppResult<String> {
        let sale = self.get(id).await?;
        Ok(render_receipt(store, &sale, width))
    }

    async fn find_by_reference(&self, reference: Uuid) -> AppResult<Option<Sale>> {
        let id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM sales WHERE client_reference = $1")
            .bind(reference)
            .fetch_optional(&self.db)
            .await?;
        match id {
            Some(id) => Ok(Some(self.get(id).await?)),
            None => Ok(None),
        }
    }
}

/// Combine repeated scans of the same product into one line
fn merge_lines(lines: &[CheckoutLineInput]) -> AppResult<HashMap<Uuid, i32>> {
    if lines.is_empty() {
        return Err(CartError::Empty.into());
    }
    let mut merged: HashMap<Uuid, i32> = HashMap::new();
    for line in lines {
        if line.quantity <= 0 {
            return Err(CartError::NonPositiveQuantity(line.product_id).into());
        }
        let entry = merged.entry(line.product_id).or_default();
        *entry = entry
            .checked_add(line.quantity)
            .ok_or_else(|| AppError::validation("quantity", "Quantity too large"))?;
    }
    Ok(merged)
}

/// Client timestamps are kept unless they lie in the future
fn resolve_sold_at(client: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    client.filter(|at| *at <= now).unwrap_or(now)
}

async fn fetch_sale(conn: &mut PgConnection, id: Uuid, for_update: bool) -> AppResult<SaleRow> {
    let lock = if for_update { "FOR UPDATE OF s" } else { "" };
    sqlx::query_as::<_, SaleRow>(&format!("{SALE_SELECT} WHERE s.id = $1 {lock}"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Sale".to_string()))
}

async fn fetch_lines(conn: &mut PgConnection, sale_id: Uuid) -> AppResult<Vec<SaleLine>> {
    let rows = sqlx::query_as::<_, SaleLineRow>(
        r#"
        SELECT id, product_id, product_name, sku, quantity, unit_price, line_total
        FROM sale_lines
        WHERE sale_id = $1
        ORDER BY product_name
        "#,
    )
    .bind(sale_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(SaleLine::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn repeated_scans_are_merged() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let merged = merge_lines(&[
            CheckoutLineInput { product_id: a, quantity: 1 },
            CheckoutLineInput { product_id: b, quantity: 2 },
            CheckoutLineInput { product_id: a, quantity: 3 },
        ])
        .unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[&a], 4);
        assert_eq!(merged[&b], 2);
    }

    #[test]
    fn empty_cart_and_zero_quantity_rejected() {
        assert!(matches!(merge_lines(&[]), Err(AppError::Validation { .. })));
        assert!(merge_lines(&[CheckoutLineInput {
            product_id: Uuid::new_v4(),
            quantity: 0
        }])
        .is_err());
    }

    #[test]
    fn future_client_timestamps_are_ignored() {
        let now = Utc::now();
        let earlier = now - Duration::hours(3);
        assert_eq!(resolve_sold_at(Some(earlier), now), earlier);
        assert_eq!(resolve_sold_at(Some(now + Duration::minutes(5)), now), now);
        assert_eq!(resolve_sold_at(None, now), now);
    }

    #[test]
    fn committed_sale_is_reported_without_reading_back() {
        let line = |name: &str, quantity: i32, price: Decimal| SaleLine {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            product_name: name.into(),
            sku: format!("SKU-{}", name),
            quantity,
            unit_price: price,
            line_total: price * Decimal::from(quantity),
        };
        let reference = Uuid::new_v4();
        let sale = CommittedSale {
            id: Uuid::new_v4(),
            receipt_number: "RCP-20240315-000007".into(),
            client_reference: Some(reference),
            cashier_id: Uuid::new_v4(),
            cashier_name: "Jordan".into(),
            customer_name: None,
            payment_method: PaymentMethod::Cash,
            totals: CartTotals {
                subtotal: Decimal::new(700, 2),
                discount: Decimal::ZERO,
                tax: Decimal::new(70, 2),
                total: Decimal::new(770, 2),
            },
            tender: Tender {
                amount_tendered: Decimal::new(1000, 2),
                change_due: Decimal::new(230, 2),
            },
            sold_at: Utc::now(),
            lines: vec![
                line("Water", 2, Decimal::new(100, 2)),
                line("Bread", 1, Decimal::new(500, 2)),
            ],
        }
        .into_sale();

        assert_eq!(sale.status, SaleStatus::Completed);
        assert_eq!(sale.client_reference, Some(reference));
        assert_eq!(sale.total, Decimal::new(770, 2));
        assert_eq!(sale.change_due, Decimal::new(230, 2));
        assert!(sale.voided_at.is_none());
        let names: Vec<&str> = sale.lines.iter().map(|l| l.product_name.as_str()).collect();
        assert_eq!(names, ["Bread", "Water"]);
    }
}
