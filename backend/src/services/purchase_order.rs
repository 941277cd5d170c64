//! Purchase order service
//!
//! Orders are drafted, sent to the supplier and received (possibly in several
//! deliveries). Each receipt adds stock; a fully received order books the
//! goods value as a purchase expense.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    check_receipt, format_po_number, line_total, order_total, status_after_receipt,
    FinancialCategory, FinancialTransactionType, PaginatedResponse, Pagination, PurchaseOrder,
    PurchaseOrderError, PurchaseOrderLine, PurchaseOrderStatus, StockMovementType,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::finance::{record_transaction, NewTransaction};
use crate::services::notification::{dispatch, NotificationService};
use crate::services::stock::{
    add_stock, apply_movement, lock_products, next_document_sequence, NewMovement,
};

/// Purchase order service
#[derive(Clone)]
pub struct PurchaseOrderService {
    db: PgPool,
    notifications: NotificationService,
}

#[derive(Debug, FromRow)]
struct OrderRow {
    id: Uuid,
    po_number: String,
    supplier_id: Uuid,
    supplier_name: String,
    status: String,
    expected_date: Option<NaiveDate>,
    notes: Option<String>,
    created_by: Uuid,
    ordered_at: Option<DateTime<Utc>>,
    received_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn status(&self) -> AppResult<PurchaseOrderStatus> {
        Ok(self.status.parse()?)
    }

    fn into_order(self, lines: Vec<PurchaseOrderLine>) -> AppResult<PurchaseOrder> {
        Ok(PurchaseOrder {
            status: self.status()?,
            total_cost: order_total(&lines),
            id: self.id,
            po_number: self.po_number,
            supplier_id: self.supplier_id,
            supplier_name: self.supplier_name,
            expected_date: self.expected_date,
            notes: self.notes,
            created_by: self.created_by,
            ordered_at: self.ordered_at,
            received_at: self.received_at,
            lines,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct LineRow {
    id: Uuid,
    product_id: Uuid,
    product_name: String,
    quantity_ordered: i32,
    quantity_received: i32,
    unit_cost: Decimal,
}

impl From<LineRow> for PurchaseOrderLine {
    fn from(row: LineRow) -> Self {
        PurchaseOrderLine {
            line_total: line_total(row.quantity_ordered, row.unit_cost),
            id: row.id,
            product_id: row.product_id,
            product_name: row.product_name,
            quantity_ordered: row.quantity_ordered,
            quantity_received: row.quantity_received,
            unit_cost: row.unit_cost,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderLineInput {
    pub product_id: Uuid,
    pub quantity_ordered: i32,
    pub unit_cost: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePurchaseOrderInput {
    pub supplier_id: Uuid,
    pub expected_date: Option<NaiveDate>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[serde(default)]
    pub lines: Vec<OrderLineInput>,
}

/// Draft edits; `lines` replaces all lines when present
#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePurchaseOrderInput {
    pub supplier_id: Option<Uuid>,
    pub expected_date: Option<NaiveDate>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    pub lines: Option<Vec<OrderLineInput>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReceiveLineInput {
    pub line_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct ReceiveInput {
    pub lines: Vec<ReceiveLineInput>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PurchaseOrderFilter {
    pub status: Option<PurchaseOrderStatus>,
    pub supplier_id: Option<Uuid>,
}

/// Row in the purchase order list
#[derive(Debug, Serialize, FromRow)]
pub struct PurchaseOrderListItem {
    pub id: Uuid,
    pub po_number: String,
    pub supplier_id: Uuid,
    pub supplier_name: String,
    pub status: String,
    pub expected_date: Option<NaiveDate>,
    pub line_count: i64,
    pub total_cost: Decimal,
    pub ordered_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PurchaseOrderService {
    pub fn new(db: PgPool, notifications: NotificationService) -> Self {
        Self { db, notifications }
    }

    pub async fn list(
        &self,
        filter: &PurchaseOrderFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<PurchaseOrderListItem>> {
        let status = filter.status.map(|s| s.as_str());

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM purchase_orders
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR supplier_id = $2)
            "#,
        )
        .bind(status)
        .bind(filter.supplier_id)
        .fetch_one(&self.db)
        .await?;

        let data = sqlx::query_as::<_, PurchaseOrderListItem>(
            r#"
            SELECT po.id, po.po_number, po.supplier_id, s.name AS supplier_name, po.status,
                   po.expected_date, COUNT(l.id) AS line_count,
                   COALESCE(SUM(ROUND(l.quantity_ordered * l.unit_cost, 2)), 0) AS total_cost,
                   po.ordered_at, po.received_at, po.created_at
            FROM purchase_orders po
            JOIN suppliers s ON s.id = po.supplier_id
            LEFT JOIN purchase_order_lines l ON l.purchase_order_id = po.id
            WHERE ($1::text IS NULL OR po.status = $1)
              AND ($2::uuid IS NULL OR po.supplier_id = $2)
            GROUP BY po.id, s.name
            ORDER BY po.created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(status)
        .bind(filter.supplier_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse::new(data, pagination, total as u64))
    }

    pub async fn get(&self, id: Uuid) -> AppResult<PurchaseOrder> {
        let mut conn = self.db.acquire().await?;
        let row = fetch_header(&mut conn, id, false).await?;
        let lines = fetch_lines(&mut conn, id, false).await?;
        row.into_order(lines)
    }

    /// Create a draft with a fresh `PO-YYYYMMDD-NNNN` number
    pub async fn create(
        &self,
        actor: &AuthUser,
        input: CreatePurchaseOrderInput,
    ) -> AppResult<PurchaseOrder> {
        input.validate()?;
        check_lines(&input.lines)?;

        let mut tx = self.db.begin().await?;
        let today = Utc::now().date_naive();
        let sequence = next_document_sequence(&mut tx, "PO", today).await?;
        let po_number = format_po_number(today, sequence);

        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO purchase_orders (po_number, supplier_id, status, expected_date, notes, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&po_number)
        .bind(input.supplier_id)
        .bind(PurchaseOrderStatus::Draft.as_str())
        .bind(input.expected_date)
        .bind(&input.notes)
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_supplier_error)?;

        insert_lines(&mut tx, id, &input.lines).await?;
        tx.commit().await?;

        tracing::info!(purchase_order_id = %id, po_number = %po_number, "purchase order created");
        self.get(id).await
    }

    pub async fn update(&self, id: Uuid, input: UpdatePurchaseOrderInput) -> AppResult<PurchaseOrder> {
        input.validate()?;
        if let Some(lines) = &input.lines {
            check_lines(lines)?;
        }

        let mut tx = self.db.begin().await?;
        let row = fetch_header(&mut tx, id, true).await?;
        let status = row.status()?;
        if !status.is_editable() {
            return Err(PurchaseOrderError::NotEditable(status).into());
        }

        sqlx::query(
            r#"
            UPDATE purchase_orders SET
                supplier_id = COALESCE($2, supplier_id),
                expected_date = COALESCE($3, expected_date),
                notes = COALESCE($4, notes),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(input.supplier_id)
        .bind(input.expected_date)
        .bind(&input.notes)
        .execute(&mut *tx)
        .await
        .map_err(map_supplier_error)?;

        if let Some(lines) = &input.lines {
            sqlx::query("DELETE FROM purchase_order_lines WHERE purchase_order_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            insert_lines(&mut tx, id, lines).await?;
        }

        tx.commit().await?;
        self.get(id).await
    }

    /// Delete a draft order
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        let status = fetch_header(&mut tx, id, true).await?.status()?;
        if !status.is_editable() {
            return Err(PurchaseOrderError::NotEditable(status).into());
        }

        sqlx::query("DELETE FROM purchase_orders WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(purchase_order_id = %id, "purchase order deleted");
        Ok(())
    }

    /// DRAFT -> ORDERED
    pub async fn mark_ordered(&self, id: Uuid) -> AppResult<PurchaseOrder> {
        let mut tx = self.db.begin().await?;
        let status = fetch_header(&mut tx, id, true).await?.status()?;
        ensure_transition(status, PurchaseOrderStatus::Ordered)?;

        let line_count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM purchase_order_lines WHERE purchase_order_id = $1",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if line_count == 0 {
            return Err(PurchaseOrderError::NoLines.into());
        }

        sqlx::query(
            "UPDATE purchase_orders SET status = $2, ordered_at = NOW(), updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(PurchaseOrderStatus::Ordered.as_str())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(purchase_order_id = %id, "purchase order placed");
        self.get(id).await
    }

    /// DRAFT | ORDERED -> CANCELLED
    pub async fn cancel(&self, id: Uuid) -> AppResult<PurchaseOrder> {
        let mut tx = self.db.begin().await?;
        let status = fetch_header(&mut tx, id, true).await?.status()?;
        ensure_transition(status, PurchaseOrderStatus::Cancelled)?;

        sqlx::query("UPDATE purchase_orders SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(PurchaseOrderStatus::Cancelled.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(purchase_order_id = %id, from = %status, "purchase order cancelled");
        self.get(id).await
    }

    /// Receive goods against open lines and add them to stock
    pub async fn receive(
        &self,
        actor: &AuthUser,
        id: Uuid,
        input: ReceiveInput,
    ) -> AppResult<PurchaseOrder> {
        let requested = merge_receipts(&input.lines)?;

        let mut tx = self.db.begin().await?;
        let header = fetch_header(&mut tx, id, true).await?;
        let status = header.status()?;
        if !status.can_receive() {
            return Err(PurchaseOrderError::InvalidTransition {
                from: status,
                to: PurchaseOrderStatus::Received,
            }
            .into());
        }

        let mut lines = fetch_lines(&mut tx, id, true).await?;
        for (line_id, quantity) in &requested {
            let line = lines
                .iter()
                .find(|l| l.id == *line_id)
                .ok_or(PurchaseOrderError::UnknownLine(*line_id))?;
            check_receipt(line, *quantity)?;
        }

        // Lock products in a stable order before touching stock.
        let mut product_ids: Vec<Uuid> = lines
            .iter()
            .filter(|l| requested.contains_key(&l.id))
            .map(|l| l.product_id)
            .collect();
        product_ids.sort();
        product_ids.dedup();
        let mut stock: HashMap<Uuid, i32> = lock_products(&mut tx, &product_ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p.stock_quantity))
            .collect();

        for line in lines.iter_mut() {
            let Some(quantity) = requested.get(&line.id).copied() else {
                continue;
            };

            sqlx::query(
                "UPDATE purchase_order_lines SET quantity_received = quantity_received + $2 WHERE id = $1",
            )
            .bind(line.id)
            .bind(quantity)
            .execute(&mut *tx)
            .await?;
            line.quantity_received += quantity;

            let on_hand = stock.entry(line.product_id).or_default();
            *on_hand = add_stock(line.product_id, *on_hand, quantity)?;
            apply_movement(
                &mut tx,
                NewMovement {
                    product_id: line.product_id,
                    movement_type: StockMovementType::PurchaseReceipt,
                    quantity,
                    quantity_after: *on_hand,
                    reference_type: Some("purchase_order"),
                    reference_id: Some(id),
                    created_by: Some(actor.user_id),
                },
            )
            .await?;
        }

        let next = status_after_receipt(&lines);
        ensure_transition(status, next)?;
        let fully_received = next == PurchaseOrderStatus::Received;

        sqlx::query(
            r#"
            UPDATE purchase_orders SET
                status = $2,
                received_at = CASE WHEN $3 THEN NOW() ELSE received_at END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(next.as_str())
        .bind(fully_received)
        .execute(&mut *tx)
        .await?;

        if fully_received {
            let value = received_value(&lines);
            if value > Decimal::ZERO {
                record_transaction(
                    &mut tx,
                    NewTransaction {
                        transaction_type: FinancialTransactionType::Expense,
                        category: FinancialCategory::Purchases,
                        amount: value,
                        description: format!(
                            "Purchase order {} from {}",
                            header.po_number, header.supplier_name
                        ),
                        reference_type: Some("purchase_order"),
                        reference_id: Some(id),
                        transaction_date: Utc::now().date_naive(),
                        created_by: Some(actor.user_id),
                    },
                )
                .await?;
            }
        }

        tx.commit().await?;
        tracing::info!(
            purchase_order_id = %id,
            po_number = %header.po_number,
            status = %next,
            lines_received = requested.len(),
            "purchase order goods received"
        );

        if fully_received {
            let notifications = self.notifications.clone();
            let po_number = header.po_number.clone();
            let created_by = header.created_by;
            dispatch("purchase_order_received", async move {
                notifications
                    .purchase_order_received(&po_number, created_by)
                    .await
            });
        }

        self.get(id).await
    }
}

fn ensure_transition(from: PurchaseOrderStatus, to: PurchaseOrderStatus) -> AppResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(PurchaseOrderError::InvalidTransition { from, to }.into())
    }
}

fn check_lines(lines: &[OrderLineInput]) -> AppResult<()> {
    let mut seen = std::collections::HashSet::new();
    for line in lines {
        if line.quantity_ordered <= 0 {
            return Err(PurchaseOrderError::NonPositiveQuantity.into());
        }
        shared::validate_price(line.unit_cost)
            .map_err(|m| AppError::validation("unit_cost", m))?;
        if !seen.insert(line.product_id) {
            return Err(AppError::validation(
                "lines",
                format!("product {} appears more than once", line.product_id),
            ));
        }
    }
    Ok(())
}

/// Sum quantities per line so repeated entries are checked together
fn merge_receipts(lines: &[ReceiveLineInput]) -> AppResult<HashMap<Uuid, i32>> {
    if lines.is_empty() {
        return Err(AppError::validation("lines", "Nothing to receive"));
    }
    let mut merged: HashMap<Uuid, i32> = HashMap::new();
    for line in lines {
        if line.quantity <= 0 {
            return Err(PurchaseOrderError::NonPositiveQuantity.into());
        }
        let entry = merged.entry(line.line_id).or_default();
        *entry = entry
            .checked_add(line.quantity)
            .ok_or_else(|| AppError::validation("quantity", "Quantity too large"))?;
    }
    Ok(merged)
}

/// Value of goods received at line cost
fn received_value(lines: &[PurchaseOrderLine]) -> Decimal {
    lines
        .iter()
        .map(|l| line_total(l.quantity_received, l.unit_cost))
        .sum()
}

fn map_supplier_error(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_foreign_key_violation() {
            return AppError::validation("supplier_id", "Unknown supplier");
        }
    }
    AppError::from(err)
}

async fn fetch_header(conn: &mut PgConnection, id: Uuid, for_update: bool) -> AppResult<OrderRow> {
    let lock = if for_update { "FOR UPDATE OF po" } else { "" };
    sqlx::query_as::<_, OrderRow>(&format!(
        r#"
        SELECT po.id, po.po_number, po.supplier_id, s.name AS supplier_name, po.status,
               po.expected_date, po.notes, po.created_by, po.ordered_at, po.received_at,
               po.created_at, po.updated_at
        FROM purchase_orders po
        JOIN suppliers s ON s.id = po.supplier_id
        WHERE po.id = $1
        {lock}
        "#
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Purchase order".to_string()))
}

async fn fetch_lines(
    conn: &mut PgConnection,
    purchase_order_id: Uuid,
    for_update: bool,
) -> AppResult<Vec<PurchaseOrderLine>> {
    let lock = if for_update { "FOR UPDATE OF l" } else { "" };
    let rows = sqlx::query_as::<_, LineRow>(&format!(
        r#"
        SELECT l.id, l.product_id, p.name AS product_name, l.quantity_ordered,
               l.quantity_received, l.unit_cost
        FROM purchase_order_lines l
        JOIN products p ON p.id = l.product_id
        WHERE l.purchase_order_id = $1
        ORDER BY l.product_id
        {lock}
        "#
    ))
    .bind(purchase_order_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(PurchaseOrderLine::from).collect())
}

async fn insert_lines(
    conn: &mut PgConnection,
    purchase_order_id: Uuid,
    lines: &[OrderLineInput],
) -> AppResult<()> {
    for line in lines {
        sqlx::query(
            r#"
            INSERT INTO purchase_order_lines (purchase_order_id, product_id, quantity_ordered, unit_cost)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(purchase_order_id)
        .bind(line.product_id)
        .bind(line.quantity_ordered)
        .bind(line.unit_cost)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.is_foreign_key_violation() {
                    return AppError::validation(
                        "product_id",
                        format!("Unknown product {}", line.product_id),
                    );
                }
            }
            AppError::from(e)
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn receipts_for_same_line_are_merged() {
        let line_id = Uuid::new_v4();
        let merged = merge_receipts(&[
            ReceiveLineInput { line_id, quantity: 2 },
            ReceiveLineInput { line_id, quantity: 3 },
        ])
        .unwrap();
        assert_eq!(merged.get(&line_id), Some(&5));
    }

    #[test]
    fn empty_or_non_positive_receipts_rejected() {
        assert!(merge_receipts(&[]).is_err());
        assert!(merge_receipts(&[ReceiveLineInput {
            line_id: Uuid::new_v4(),
            quantity: 0
        }])
        .is_err());
    }

    #[test]
    fn order_lines_validated() {
        let product_id = Uuid::new_v4();
        let ok = OrderLineInput {
            product_id,
            quantity_ordered: 4,
            unit_cost: dec("1.25"),
        };
        assert!(check_lines(&[ok.clone()]).is_ok());
        assert!(check_lines(&[ok.clone(), ok.clone()]).is_err());
        assert!(check_lines(&[OrderLineInput {
            quantity_ordered: 0,
            ..ok.clone()
        }])
        .is_err());
        assert!(check_lines(&[OrderLineInput {
            unit_cost: dec("-1"),
            ..ok
        }])
        .is_err());
    }

    #[test]
    fn received_value_uses_received_quantities() {
        let line = PurchaseOrderLine {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            product_name: "Cola 330ml".into(),
            quantity_ordered: 10,
            quantity_received: 6,
            unit_cost: dec("0.45"),
            line_total: dec("4.50"),
        };
        assert_eq!(received_value(&[line]), dec("2.70"));
    }

    #[test]
    fn cancelled_orders_cannot_be_placed() {
        assert!(ensure_transition(PurchaseOrderStatus::Draft, PurchaseOrderStatus::Ordered).is_ok());
        assert!(matches!(
            ensure_transition(PurchaseOrderStatus::Cancelled, PurchaseOrderStatus::Ordered),
            Err(AppError::InvalidStateTransition(_))
        ));
    }
}
