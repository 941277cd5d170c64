//! Financial transaction service: income and expense ledger

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    DateRange, FinancialCategory, FinancialSummary, FinancialTransaction,
    FinancialTransactionType, PaginatedResponse, Pagination,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::reporting::export_to_csv;

/// Financial transaction service
#[derive(Clone)]
pub struct FinanceService {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: Uuid,
    transaction_type: String,
    category: String,
    amount: Decimal,
    description: String,
    reference_type: Option<String>,
    reference_id: Option<Uuid>,
    transaction_date: NaiveDate,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_transaction(self) -> AppResult<FinancialTransaction> {
        Ok(FinancialTransaction {
            id: self.id,
            transaction_type: self.transaction_type.parse()?,
            category: self.category.parse()?,
            amount: self.amount,
            description: self.description,
            reference_type: self.reference_type,
            reference_id: self.reference_id,
            transaction_date: self.transaction_date,
            created_by: self.created_by,
            created_at: self.created_at,
        })
    }
}

/// A ledger entry written by another workflow inside its transaction
#[derive(Debug, Clone)]
pub struct NewTransaction<'a> {
    pub transaction_type: FinancialTransactionType,
    pub category: FinancialCategory,
    pub amount: Decimal,
    pub description: String,
    pub reference_type: Option<&'a str>,
    pub reference_id: Option<Uuid>,
    pub transaction_date: NaiveDate,
    pub created_by: Option<Uuid>,
}

/// Input for a manual entry
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTransactionInput {
    pub transaction_type: FinancialTransactionType,
    pub category: FinancialCategory,
    pub amount: Decimal,
    #[validate(length(min = 1, max = 500, message = "Description must be 1-500 characters"))]
    pub description: String,
    pub transaction_date: Option<NaiveDate>,
}

/// Filter for listing and exporting transactions
#[derive(Debug, Default, Deserialize)]
pub struct TransactionFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub transaction_type: Option<FinancialTransactionType>,
    pub category: Option<FinancialCategory>,
}

/// Totals for one type and category
#[derive(Debug, Serialize, FromRow)]
pub struct CategoryTotal {
    pub transaction_type: String,
    pub category: String,
    pub total: Decimal,
    pub count: i64,
}

/// Summary over a date range
#[derive(Debug, Serialize)]
pub struct PeriodSummary {
    pub period: DateRange,
    #[serde(flatten)]
    pub totals: FinancialSummary,
    pub by_category: Vec<CategoryTotal>,
}

/// Flat CSV record
#[derive(Debug, Serialize)]
struct TransactionCsvRecord<'a> {
    date: NaiveDate,
    transaction_type: &'a str,
    category: &'a str,
    amount: Decimal,
    description: &'a str,
    reference_type: Option<&'a str>,
    reference_id: Option<Uuid>,
}

/// Write a ledger entry on the caller's connection
pub async fn record_transaction(
    conn: &mut PgConnection,
    entry: NewTransaction<'_>,
) -> AppResult<Uuid> {
    if entry.amount <= Decimal::ZERO {
        return Err(AppError::validation("amount", "Amount must be positive"));
    }

    let id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO financial_transactions (
            transaction_type, category, amount, description,
            reference_type, reference_id, transaction_date, created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        "#,
    )
    .bind(entry.transaction_type.as_str())
    .bind(entry.category.as_str())
    .bind(entry.amount)
    .bind(&entry.description)
    .bind(entry.reference_type)
    .bind(entry.reference_id)
    .bind(entry.transaction_date)
    .bind(entry.created_by)
    .fetch_one(&mut *conn)
    .await?;

    tracing::info!(
        transaction_id = %id,
        transaction_type = %entry.transaction_type,
        category = %entry.category,
        amount = %entry.amount,
        "financial transaction recorded"
    );
    Ok(id)
}

/// Default reporting window: the current month to date
pub fn resolve_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> AppResult<DateRange> {
    let today = Utc::now().date_naive();
    let end = end.unwrap_or(today);
    let start = start.unwrap_or_else(|| end.with_day0(0).unwrap_or(end));
    if start > end {
        return Err(AppError::validation(
            "start_date",
            "start_date must not be after end_date",
        ));
    }
    Ok(DateRange { start, end })
}

impl FinanceService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// List transactions, newest first
    pub async fn list(
        &self,
        filter: &TransactionFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<FinancialTransaction>> {
        let transaction_type = filter.transaction_type.map(|t| t.as_str());
        let category = filter.category.map(|c| c.as_str());

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM financial_transactions
            WHERE ($1::date IS NULL OR transaction_date >= $1)
              AND ($2::date IS NULL OR transaction_date <= $2)
              AND ($3::text IS NULL OR transaction_type = $3)
              AND ($4::text IS NULL OR category = $4)
            "#,
        )
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(transaction_type)
        .bind(category)
        .fetch_one(&self.db)
        .await?;

        let rows = self
            .fetch(filter, Some((pagination.limit(), pagination.offset())))
            .await?;
        let data = rows
            .into_iter()
            .map(TransactionRow::into_transaction)
            .collect::<AppResult<Vec<_>>>()?;
        Ok(PaginatedResponse::new(data, pagination, total as u64))
    }

    /// Record a manual income or expense
    pub async fn create(
        &self,
        actor: &AuthUser,
        input: CreateTransactionInput,
    ) -> AppResult<FinancialTransaction> {
        input.validate()?;
        shared::validate_price(input.amount).map_err(|m| AppError::validation("amount", m))?;

        let mut conn = self.db.acquire().await?;
        let id = record_transaction(
            &mut conn,
            NewTransaction {
                transaction_type: input.transaction_type,
                category: input.category,
                amount: input.amount,
                description: input.description.trim().to_string(),
                reference_type: None,
                reference_id: None,
                transaction_date: input
                    .transaction_date
                    .unwrap_or_else(|| Utc::now().date_naive()),
                created_by: Some(actor.user_id),
            },
        )
        .await?;
        drop(conn);

        self.get(id).await
    }

    pub async fn get(&self, id: Uuid) -> AppResult<FinancialTransaction> {
        sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, transaction_type, category, amount, description, reference_type,
                   reference_id, transaction_date, created_by, created_at
            FROM financial_transactions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Transaction".to_string()))?
        .into_transaction()
    }

    /// Income, expense and net over a date range
    pub async fn summary(&self, range: DateRange) -> AppResult<PeriodSummary> {
        let by_category = sqlx::query_as::<_, CategoryTotal>(
            r#"
            SELECT transaction_type, category, SUM(amount) AS total, COUNT(*) AS count
            FROM financial_transactions
            WHERE transaction_date BETWEEN $1 AND $2
            GROUP BY transaction_type, category
            ORDER BY transaction_type, category
            "#,
        )
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.db)
        .await?;

        let mut totals = FinancialSummary::default();
        for row in &by_category {
            match row.transaction_type.parse::<FinancialTransactionType>()? {
                FinancialTransactionType::Income => totals.total_income += row.total,
                FinancialTransactionType::Expense => totals.total_expense += row.total,
            }
            totals.transaction_count += row.count as u64;
        }
        totals.net = totals.total_income - totals.total_expense;

        Ok(PeriodSummary {
            period: range,
            totals,
            by_category,
        })
    }

    /// Export matching transactions as CSV
    pub async fn export_csv(&self, filter: &TransactionFilter) -> AppResult<String> {
        let rows = self.fetch(filter, None).await?;
        let records: Vec<TransactionCsvRecord<'_>> = rows
            .iter()
            .map(|r| TransactionCsvRecord {
                date: r.transaction_date,
                transaction_type: &r.transaction_type,
                category: &r.category,
                amount: r.amount,
                description: &r.description,
                reference_type: r.reference_type.as_deref(),
                reference_id: r.reference_id,
            })
            .collect();
        export_to_csv(&records)
    }

    async fn fetch(
        &self,
        filter: &TransactionFilter,
        page: Option<(i64, i64)>,
    ) -> AppResult<Vec<TransactionRow>> {
        let (limit, offset) = match page {
            Some((limit, offset)) => (Some(limit), offset),
            None => (None, 0),
        };

        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, transaction_type, category, amount, description, reference_type,
                   reference_id, transaction_date, created_by, created_at
            FROM financial_transactions
            WHERE ($1::date IS NULL OR transaction_date >= $1)
              AND ($2::date IS NULL OR transaction_date <= $2)
              AND ($3::text IS NULL OR transaction_type = $3)
              AND ($4::text IS NULL OR category = $4)
            ORDER BY transaction_date DESC, created_at DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(filter.transaction_type.map(|t| t.as_str()))
        .bind(filter.category.map(|c| c.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_range_is_kept() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let range = resolve_range(Some(start), Some(end)).unwrap();
        assert_eq!(range.start, start);
        assert_eq!(range.end, end);
    }

    #[test]
    fn default_range_starts_on_first_of_month() {
        let end = NaiveDate::from_ymd_opt(2024, 2, 17).unwrap();
        let range = resolve_range(None, Some(end)).unwrap();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
    }

    #[test]
    fn inverted_range_rejected() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert!(resolve_range(Some(start), Some(end)).is_err());
    }
}
