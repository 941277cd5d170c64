//! Stock reconciliation service
//!
//! Drafts are edited by their creator, submitted for review and then approved
//! or rejected by an administrator. Approval is the only step that writes to
//! `products.stock_quantity`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    apply_discrepancy, authorize_transition, ensure_can_delete, ensure_can_edit,
    ensure_unique_products, CountLine, PaginatedResponse, Pagination, ReconciliationAction,
    ReconciliationError, ReconciliationItem, ReconciliationStatus, ReconciliationSummary,
    StockMovementType, StockReconciliation, StockStatus,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::notification::{dispatch, LowStockProduct, NotificationService};
use crate::services::stock::{apply_movement, lock_product, lock_products, NewMovement};

/// Stock reconciliation service
#[derive(Clone)]
pub struct ReconciliationService {
    db: PgPool,
    notifications: NotificationService,
}

#[derive(Debug, FromRow)]
struct ReconciliationRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    status: String,
    notes: Option<String>,
    created_by: Uuid,
    approved_by: Option<Uuid>,
    rejection_reason: Option<String>,
    submitted_at: Option<DateTime<Utc>>,
    approved_at: Option<DateTime<Utc>>,
    rejected_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ReconciliationRow {
    fn status(&self) -> AppResult<ReconciliationStatus> {
        Ok(self.status.parse()?)
    }

    fn into_reconciliation(self, items: Vec<ReconciliationItem>) -> AppResult<StockReconciliation> {
        Ok(StockReconciliation {
            status: self.status()?,
            summary: ReconciliationSummary::from_items(&items),
            id: self.id,
            title: self.title,
            description: self.description,
            notes: self.notes,
            created_by: self.created_by,
            approved_by: self.approved_by,
            rejection_reason: self.rejection_reason,
            submitted_at: self.submitted_at,
            approved_at: self.approved_at,
            rejected_at: self.rejected_at,
            items,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ItemRow {
    id: Uuid,
    product_id: Uuid,
    product_name: String,
    product_sku: String,
    system_count: i32,
    physical_count: i32,
    discrepancy: i32,
    unit_cost: Decimal,
    estimated_impact: Decimal,
    reason: Option<String>,
}

impl From<ItemRow> for ReconciliationItem {
    fn from(row: ItemRow) -> Self {
        ReconciliationItem {
            id: row.id,
            product_id: row.product_id,
            product_name: row.product_name,
            product_sku: row.product_sku,
            system_count: row.system_count,
            physical_count: row.physical_count,
            discrepancy: row.discrepancy,
            unit_cost: row.unit_cost,
            estimated_impact: row.estimated_impact,
            reason: row.reason,
        }
    }
}

/// One counted product in a create or update request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CountInput {
    pub product_id: Uuid,
    pub physical_count: i32,
    #[validate(length(max = 500, message = "Reason must be at most 500 characters"))]
    pub reason: Option<String>,
}

/// Input for creating a reconciliation
#[derive(Debug, Deserialize, Validate)]
pub struct CreateReconciliationInput {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[serde(default)]
    pub items: Vec<CountInput>,
}

/// Input for updating a draft; `items` replaces all lines when present
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateReconciliationInput {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    pub items: Option<Vec<CountInput>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApproveInput {
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectInput {
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReconciliationFilter {
    pub status: Option<ReconciliationStatus>,
    pub created_by: Option<Uuid>,
}

/// Row in the reconciliation list
#[derive(Debug, Serialize, FromRow)]
pub struct ReconciliationListItem {
    pub id: Uuid,
    pub title: String,
    pub status: String,
    pub created_by: Uuid,
    pub created_by_name: String,
    pub item_count: i64,
    pub total_impact: Decimal,
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

const RECONCILIATION_COLUMNS: &str = r#"
    id, title, description, status, notes, created_by, approved_by, rejection_reason,
    submitted_at, approved_at, rejected_at, created_at, updated_at
"#;

impl ReconciliationService {
    pub fn new(db: PgPool, notifications: NotificationService) -> Self {
        Self { db, notifications }
    }

    pub async fn list(
        &self,
        filter: &ReconciliationFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<ReconciliationListItem>> {
        let status = filter.status.map(|s| s.as_str());

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM stock_reconciliations
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR created_by = $2)
            "#,
        )
        .bind(status)
        .bind(filter.created_by)
        .fetch_one(&self.db)
        .await?;

        let data = sqlx::query_as::<_, ReconciliationListItem>(
            r#"
            SELECT r.id, r.title, r.status, r.created_by, u.name AS created_by_name,
                   COUNT(i.id) AS item_count,
                   COALESCE(SUM(i.estimated_impact), 0) AS total_impact,
                   r.submitted_at, r.approved_at, r.rejected_at, r.created_at
            FROM stock_reconciliations r
            JOIN users u ON u.id = r.created_by
            LEFT JOIN stock_reconciliation_items i ON i.reconciliation_id = r.id
            WHERE ($1::text IS NULL OR r.status = $1)
              AND ($2::uuid IS NULL OR r.created_by = $2)
            GROUP BY r.id, u.name
            ORDER BY r.created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(status)
        .bind(filter.created_by)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse::new(data, pagination, total as u64))
    }

    pub async fn get(&self, id: Uuid) -> AppResult<StockReconciliation> {
        let mut conn = self.db.acquire().await?;
        let row = fetch_header(&mut conn, id, false).await?;
        let items = fetch_items(&mut conn, id).await?;
        row.into_reconciliation(items)
    }

    /// Create a draft, snapshotting current stock for every counted product
    pub async fn create(
        &self,
        actor: &AuthUser,
        input: CreateReconciliationInput,
    ) -> AppResult<StockReconciliation> {
        input.validate()?;
        check_counts(&input.items)?;

        let mut tx = self.db.begin().await?;

        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO stock_reconciliations (title, description, notes, status, created_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(input.title.trim())
        .bind(&input.description)
        .bind(&input.notes)
        .bind(ReconciliationStatus::Draft.as_str())
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await?;

        insert_items(&mut tx, id, &input.items).await?;
        tx.commit().await?;

        tracing::info!(
            reconciliation_id = %id,
            created_by = %actor.user_id,
            items = input.items.len(),
            "stock reconciliation created"
        );
        self.get(id).await
    }

    /// Edit a draft; replacing items re-snapshots system counts
    pub async fn update(
        &self,
        actor: &AuthUser,
        id: Uuid,
        input: UpdateReconciliationInput,
    ) -> AppResult<StockReconciliation> {
        input.validate()?;
        if let Some(items) = &input.items {
            check_counts(items)?;
        }

        let mut tx = self.db.begin().await?;
        let row = fetch_header(&mut tx, id, true).await?;
        ensure_can_edit(row.status()?, row.created_by, actor.user_id)?;

        sqlx::query(
            r#"
            UPDATE stock_reconciliations SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                notes = COALESCE($4, notes),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(input.title.as_deref().map(str::trim))
        .bind(&input.description)
        .bind(&input.notes)
        .execute(&mut *tx)
        .await?;

        if let Some(items) = &input.items {
            sqlx::query("DELETE FROM stock_reconciliation_items WHERE reconciliation_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            insert_items(&mut tx, id, items).await?;
        }

        tx.commit().await?;
        self.get(id).await
    }

    /// Move a draft to PENDING and notify approvers
    pub async fn submit(&self, actor: &AuthUser, id: Uuid) -> AppResult<StockReconciliation> {
        let mut tx = self.db.begin().await?;
        let row = fetch_header(&mut tx, id, true).await?;
        let item_count = count_items(&mut tx, id).await?;

        let next = authorize_transition(
            row.status()?,
            ReconciliationAction::Submit,
            row.created_by,
            actor.user_id,
            actor.role,
            item_count,
        )?;

        let result = sqlx::query(
            r#"
            UPDATE stock_reconciliations SET
                status = $2, submitted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = $3
            "#,
        )
        .bind(id)
        .bind(next.as_str())
        .bind(ReconciliationStatus::Draft.as_str())
        .execute(&mut *tx)
        .await?;
        ensure_transitioned(result.rows_affected(), ReconciliationStatus::Draft)?;
        tx.commit().await?;

        tracing::info!(reconciliation_id = %id, submitted_by = %actor.user_id, "stock reconciliation submitted");

        let notifications = self.notifications.clone();
        let title = row.title.clone();
        let submitted_by = actor.user_id;
        dispatch("reconciliation_submitted", async move {
            notifications
                .reconciliation_submitted(id, &title, submitted_by)
                .await
        });

        self.get(id).await
    }

    /// Approve a pending reconciliation and apply every discrepancy to stock
    pub async fn approve(
        &self,
        actor: &AuthUser,
        id: Uuid,
        input: ApproveInput,
    ) -> AppResult<StockReconciliation> {
        let mut tx = self.db.begin().await?;
        let row = fetch_header(&mut tx, id, true).await?;
        let item_count = count_items(&mut tx, id).await?;

        let next = authorize_transition(
            row.status()?,
            ReconciliationAction::Approve,
            row.created_by,
            actor.user_id,
            actor.role,
            item_count,
        )?;

        let result = sqlx::query(
            r#"
            UPDATE stock_reconciliations SET
                status = $2, approved_by = $3, approved_at = NOW(),
                notes = COALESCE($4, notes), updated_at = NOW()
            WHERE id = $1 AND status = $5
            "#,
        )
        .bind(id)
        .bind(next.as_str())
        .bind(actor.user_id)
        .bind(input.notes.as_deref().map(str::trim).filter(|n| !n.is_empty()))
        .bind(ReconciliationStatus::Pending.as_str())
        .execute(&mut *tx)
        .await?;
        ensure_transitioned(result.rows_affected(), ReconciliationStatus::Pending)?;

        // Items come back ordered by product id so locks are taken in a stable order.
        let items = fetch_items(&mut tx, id).await?;
        let mut crossed = Vec::new();
        let mut adjusted = 0usize;
        for item in items.iter().filter(|i| i.discrepancy != 0) {
            let product = lock_product(&mut tx, item.product_id).await?;
            let after = apply_discrepancy(product.id, product.stock_quantity, item.discrepancy)?;

            apply_movement(
                &mut tx,
                NewMovement {
                    product_id: product.id,
                    movement_type: StockMovementType::Reconciliation,
                    quantity: item.discrepancy,
                    quantity_after: after,
                    reference_type: Some("stock_reconciliation"),
                    reference_id: Some(id),
                    created_by: Some(actor.user_id),
                },
            )
            .await?;
            adjusted += 1;

            if StockStatus::crossed_reorder_level(
                product.stock_quantity,
                after,
                product.reorder_level,
            ) {
                crossed.push(LowStockProduct {
                    product_id: product.id,
                    name: product.name,
                    sku: product.sku,
                    stock_quantity: after,
                    reorder_level: product.reorder_level,
                });
            }
        }

        tx.commit().await?;
        tracing::info!(
            reconciliation_id = %id,
            approved_by = %actor.user_id,
            products_adjusted = adjusted,
            "stock reconciliation approved"
        );

        let notifications = self.notifications.clone();
        let title = row.title.clone();
        let created_by = row.created_by;
        dispatch("reconciliation_approved", async move {
            let decided = notifications
                .reconciliation_decided(id, &title, created_by, None)
                .await;
            notifications.low_stock(&crossed).await?;
            decided
        });

        self.get(id).await
    }

    /// Reject a pending reconciliation; stock is not touched
    pub async fn reject(
        &self,
        actor: &AuthUser,
        id: Uuid,
        input: RejectInput,
    ) -> AppResult<StockReconciliation> {
        let reason = input.reason.trim().to_string();
        if reason.is_empty() {
            return Err(ReconciliationError::RejectionReasonRequired.into());
        }
        shared::validate_required_text(&reason, 1000)
            .map_err(|m| AppError::validation("reason", m))?;

        let mut tx = self.db.begin().await?;
        let row = fetch_header(&mut tx, id, true).await?;
        let item_count = count_items(&mut tx, id).await?;

        let next = authorize_transition(
            row.status()?,
            ReconciliationAction::Reject,
            row.created_by,
            actor.user_id,
            actor.role,
            item_count,
        )?;

        let result = sqlx::query(
            r#"
            UPDATE stock_reconciliations SET
                status = $2, approved_by = $3, rejected_at = NOW(),
                rejection_reason = $4, updated_at = NOW()
            WHERE id = $1 AND status = $5
            "#,
        )
        .bind(id)
        .bind(next.as_str())
        .bind(actor.user_id)
        .bind(&reason)
        .bind(ReconciliationStatus::Pending.as_str())
        .execute(&mut *tx)
        .await?;
        ensure_transitioned(result.rows_affected(), ReconciliationStatus::Pending)?;

        tx.commit().await?;
        tracing::info!(reconciliation_id = %id, rejected_by = %actor.user_id, "stock reconciliation rejected");

        let notifications = self.notifications.clone();
        let title = row.title.clone();
        let created_by = row.created_by;
        dispatch("reconciliation_rejected", async move {
            notifications
                .reconciliation_decided(id, &title, created_by, Some(&reason))
                .await
        });

        self.get(id).await
    }

    /// Delete a draft
    pub async fn delete(&self, actor: &AuthUser, id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        let row = fetch_header(&mut tx, id, true).await?;
        ensure_can_delete(row.status()?, actor.role)?;

        sqlx::query("DELETE FROM stock_reconciliations WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(reconciliation_id = %id, deleted_by = %actor.user_id, "stock reconciliation deleted");
        Ok(())
    }
}

fn check_counts(items: &[CountInput]) -> AppResult<()> {
    for item in items {
        item.validate()?;
    }
    let ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
    ensure_unique_products(&ids)?;
    if items.iter().any(|i| i.physical_count < 0) {
        return Err(ReconciliationError::NegativeCount.into());
    }
    Ok(())
}

/// A status-guarded update that matched nothing lost a race with another reviewer
fn ensure_transitioned(rows_affected: u64, from: ReconciliationStatus) -> AppResult<()> {
    if rows_affected == 0 {
        return Err(AppError::InvalidStateTransition(format!(
            "reconciliation is no longer {}",
            from
        )));
    }
    Ok(())
}

async fn fetch_header(
    conn: &mut PgConnection,
    id: Uuid,
    for_update: bool,
) -> AppResult<ReconciliationRow> {
    let lock = if for_update { "FOR UPDATE" } else { "" };
    sqlx::query_as::<_, ReconciliationRow>(&format!(
        "SELECT {RECONCILIATION_COLUMNS} FROM stock_reconciliations WHERE id = $1 {lock}"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Stock reconciliation".to_string()))
}

async fn fetch_items(conn: &mut PgConnection, id: Uuid) -> AppResult<Vec<ReconciliationItem>> {
    let rows = sqlx::query_as::<_, ItemRow>(
        r#"
        SELECT i.id, i.product_id, p.name AS product_name, p.sku AS product_sku,
               i.system_count, i.physical_count, i.discrepancy, i.unit_cost,
               i.estimated_impact, i.reason
        FROM stock_reconciliation_items i
        JOIN products p ON p.id = i.product_id
        WHERE i.reconciliation_id = $1
        ORDER BY i.product_id
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(ReconciliationItem::from).collect())
}

async fn count_items(conn: &mut PgConnection, id: Uuid) -> AppResult<usize> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM stock_reconciliation_items WHERE reconciliation_id = $1",
    )
    .bind(id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count as usize)
}

/// Snapshot system counts and cost for each line and insert it
async fn insert_items(
    conn: &mut PgConnection,
    reconciliation_id: Uuid,
    items: &[CountInput],
) -> AppResult<()> {
    if items.is_empty() {
        return Ok(());
    }

    let ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
    let products: HashMap<Uuid, _> = lock_products(conn, &ids)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    for input in items {
        let product = products
            .get(&input.product_id)
            .ok_or_else(|| AppError::NotFound(format!("Product {}", input.product_id)))?;
        let line = CountLine::new(product.id, product.stock_quantity, input.physical_count)?;

        sqlx::query(
            r#"
            INSERT INTO stock_reconciliation_items (
                reconciliation_id, product_id, system_count, physical_count,
                discrepancy, unit_cost, estimated_impact, reason
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(reconciliation_id)
        .bind(line.product_id)
        .bind(line.system_count)
        .bind(line.physical_count)
        .bind(line.discrepancy())
        .bind(product.cost_price)
        .bind(line.estimated_impact(product.cost_price))
        .bind(input.reason.as_deref().map(str::trim).filter(|r| !r.is_empty()))
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(product_id: Uuid, physical_count: i32) -> CountInput {
        CountInput {
            product_id,
            physical_count,
            reason: None,
        }
    }

    #[test]
    fn duplicate_counts_rejected() {
        let id = Uuid::new_v4();
        let err = check_counts(&[count(id, 1), count(id, 2)]).unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn negative_counts_rejected() {
        let err = check_counts(&[count(Uuid::new_v4(), -1)]).unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn lost_race_is_a_state_error() {
        assert!(ensure_transitioned(1, ReconciliationStatus::Pending).is_ok());
        assert!(matches!(
            ensure_transitioned(0, ReconciliationStatus::Pending),
            Err(AppError::InvalidStateTransition(_))
        ));
    }

    #[test]
    fn empty_draft_is_allowed() {
        assert!(check_counts(&[]).is_ok());
    }
}
