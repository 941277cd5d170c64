//! Email notifications for workflow and stock events
//!
//! Every attempt is written to `email_log`. Notifications are dispatched on a
//! background task so a provider outage never fails the request that
//! triggered them.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{PaginatedResponse, Pagination, UserRole};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::AppResult;
use crate::external::{Delivery, EmailClient, EmailMessage};

/// Notification service
#[derive(Clone)]
pub struct NotificationService {
    db: PgPool,
    email: EmailClient,
}

/// Notification kinds recorded in the email log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailKind {
    ReconciliationSubmitted,
    ReconciliationApproved,
    ReconciliationRejected,
    LowStock,
    PurchaseOrderReceived,
}

impl EmailKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailKind::ReconciliationSubmitted => "RECONCILIATION_SUBMITTED",
            EmailKind::ReconciliationApproved => "RECONCILIATION_APPROVED",
            EmailKind::ReconciliationRejected => "RECONCILIATION_REJECTED",
            EmailKind::LowStock => "LOW_STOCK",
            EmailKind::PurchaseOrderReceived => "PURCHASE_ORDER_RECEIVED",
        }
    }
}

/// A product that dropped to or below its reorder level
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LowStockProduct {
    pub product_id: Uuid,
    pub name: String,
    pub sku: String,
    pub stock_quantity: i32,
    pub reorder_level: i32,
}

/// Email log entry
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EmailLogEntry {
    pub id: Uuid,
    pub recipient: String,
    pub subject: String,
    pub kind: String,
    pub status: String,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NotificationService {
    pub fn new(db: PgPool, email: EmailClient) -> Self {
        Self { db, email }
    }

    /// Tell administrators a reconciliation awaits review
    pub async fn reconciliation_submitted(
        &self,
        reconciliation_id: Uuid,
        title: &str,
        submitted_by: Uuid,
    ) -> AppResult<()> {
        let recipients = self.emails_for_roles(&[UserRole::Admin]).await?;
        let submitter = self.user_name(submitted_by).await?;
        let (subject, text) = compose_reconciliation_submitted(reconciliation_id, title, &submitter);
        self.deliver_all(EmailKind::ReconciliationSubmitted, &recipients, &subject, &text)
            .await
    }

    /// Tell the creator their reconciliation was approved or rejected
    pub async fn reconciliation_decided(
        &self,
        reconciliation_id: Uuid,
        title: &str,
        created_by: Uuid,
        rejection_reason: Option<&str>,
    ) -> AppResult<()> {
        let recipients = self.email_for_user(created_by).await?;
        let (kind, subject, text) = match rejection_reason {
            None => {
                let (s, t) = compose_reconciliation_approved(reconciliation_id, title);
                (EmailKind::ReconciliationApproved, s, t)
            }
            Some(reason) => {
                let (s, t) = compose_reconciliation_rejected(reconciliation_id, title, reason);
                (EmailKind::ReconciliationRejected, s, t)
            }
        };
        self.deliver_all(kind, &recipients, &subject, &text).await
    }

    /// Alert managers about products that need reordering
    pub async fn low_stock(&self, products: &[LowStockProduct]) -> AppResult<()> {
        if products.is_empty() {
            return Ok(());
        }
        let recipients = self
            .emails_for_roles(&[UserRole::Admin, UserRole::Manager])
            .await?;
        let (subject, text) = compose_low_stock(products);
        self.deliver_all(EmailKind::LowStock, &recipients, &subject, &text)
            .await
    }

    /// Tell the purchase order creator that goods have been received in full
    pub async fn purchase_order_received(&self, po_number: &str, created_by: Uuid) -> AppResult<()> {
        let recipients = self.email_for_user(created_by).await?;
        let subject = format!("Purchase order {} received", po_number);
        let text = format!(
            "All lines of purchase order {} have been received and added to stock.",
            po_number
        );
        self.deliver_all(EmailKind::PurchaseOrderReceived, &recipients, &subject, &text)
            .await
    }

    /// Recent delivery attempts, newest first
    pub async fn list_email_log(
        &self,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<EmailLogEntry>> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM email_log")
            .fetch_one(&self.db)
            .await?;

        let entries = sqlx::query_as::<_, EmailLogEntry>(
            r#"
            SELECT id, recipient, subject, kind, status, error_message, created_at
            FROM email_log
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse::new(entries, pagination, total as u64))
    }

    /// Send to each recipient, logging every attempt
    async fn deliver_all(
        &self,
        kind: EmailKind,
        recipients: &[String],
        subject: &str,
        text: &str,
    ) -> AppResult<()> {
        for recipient in recipients {
            let message = EmailMessage {
                to: recipient.clone(),
                subject: subject.to_string(),
                text: text.to_string(),
            };

            let (status, error_message) = match self.email.send(&message).await {
                Ok(Delivery::Sent) => ("SENT", None),
                Ok(Delivery::Skipped) => ("SKIPPED", None),
                Err(e) => {
                    tracing::warn!(
                        kind = kind.as_str(),
                        recipient = %recipient,
                        error = %e,
                        "email delivery failed"
                    );
                    ("FAILED", Some(e.to_string()))
                }
            };

            sqlx::query(
                r#"
                INSERT INTO email_log (recipient, subject, kind, status, error_message)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(recipient)
            .bind(subject)
            .bind(kind.as_str())
            .bind(status)
            .bind(error_message)
            .execute(&self.db)
            .await?;
        }
        Ok(())
    }

    async fn emails_for_roles(&self, roles: &[UserRole]) -> AppResult<Vec<String>> {
        let roles: Vec<&str> = roles.iter().map(|r| r.as_str()).collect();
        let emails = sqlx::query_scalar::<_, String>(
            "SELECT email FROM users WHERE is_active = true AND role = ANY($1) ORDER BY email",
        )
        .bind(&roles)
        .fetch_all(&self.db)
        .await?;
        Ok(emails)
    }

    async fn email_for_user(&self, user_id: Uuid) -> AppResult<Vec<String>> {
        let email = sqlx::query_scalar::<_, String>(
            "SELECT email FROM users WHERE id = $1 AND is_active = true",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(email.into_iter().collect())
    }

    async fn user_name(&self, user_id: Uuid) -> AppResult<String> {
        let name = sqlx::query_scalar::<_, String>("SELECT name FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(name.unwrap_or_else(|| "Unknown user".to_string()))
    }
}

/// Run a notification in the background; failures are logged only
pub fn dispatch<F>(what: &'static str, notification: F)
where
    F: Future<Output = AppResult<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = notification.await {
            tracing::error!(notification = what, error = %e, "notification failed");
        }
    });
}

fn compose_reconciliation_submitted(id: Uuid, title: &str, submitter: &str) -> (String, String) {
    (
        format!("Stock reconciliation awaiting approval: {}", title),
        format!(
            "{} submitted the stock reconciliation \"{}\" ({}) for approval.\n\
             Review it in the back office before stock is adjusted.",
            submitter, title, id
        ),
    )
}

fn compose_reconciliation_approved(id: Uuid, title: &str) -> (String, String) {
    (
        format!("Stock reconciliation approved: {}", title),
        format!(
            "Your stock reconciliation \"{}\" ({}) was approved and stock levels have been adjusted.",
            title, id
        ),
    )
}

fn compose_reconciliation_rejected(id: Uuid, title: &str, reason: &str) -> (String, String) {
    (
        format!("Stock reconciliation rejected: {}", title),
        format!(
            "Your stock reconciliation \"{}\" ({}) was rejected.\nReason: {}",
            title, id, reason
        ),
    )
}

fn compose_low_stock(products: &[LowStockProduct]) -> (String, String) {
    let subject = match products {
        [one] => format!("Low stock: {}", one.name),
        many => format!("Low stock: {} products need reordering", many.len()),
    };
    let mut text = String::from("The following products are at or below their reorder level:\n\n");
    for p in products {
        text.push_str(&format!(
            "- {} ({}): {} left, reorder level {}\n",
            p.name, p.sku, p.stock_quantity, p.reorder_level
        ));
    }
    (subject, text)
}
