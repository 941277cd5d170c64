//! Reporting service for dashboards and data export

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::DateRange;
use sqlx::{FromRow, PgPool};

use crate::error::{AppError, AppResult};

/// Reporting service
#[derive(Clone)]
pub struct ReportingService {
    db: PgPool,
}

/// Dashboard metrics
#[derive(Debug, Serialize, FromRow)]
pub struct DashboardMetrics {
    pub product_count: i64,
    pub low_stock_count: i64,
    pub out_of_stock_count: i64,
    pub stock_value_at_cost: Decimal,
    pub stock_value_at_retail: Decimal,
    pub today_sales_count: i64,
    pub today_revenue: Decimal,
    pub pending_reconciliations: i64,
    pub open_purchase_orders: i64,
}

/// Sales totals for one day
#[derive(Debug, Serialize, FromRow)]
pub struct DailySales {
    pub date: NaiveDate,
    pub sale_count: i64,
    pub items_sold: i64,
    pub gross_sales: Decimal,
    pub discounts: Decimal,
    pub tax: Decimal,
    pub revenue: Decimal,
}

impl ReportingService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Get dashboard metrics
    pub async fn get_dashboard_metrics(&self) -> AppResult<DashboardMetrics> {
        let today = Utc::now().date_naive();

        let metrics = sqlx::query_as::<_, DashboardMetrics>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM products WHERE is_active) AS product_count,
                (SELECT COUNT(*) FROM products
                    WHERE is_active AND stock_quantity > 0
                      AND stock_quantity <= reorder_level) AS low_stock_count,
                (SELECT COUNT(*) FROM products
                    WHERE is_active AND stock_quantity = 0) AS out_of_stock_count,
                (SELECT COALESCE(SUM(stock_quantity * cost_price), 0)
                    FROM products WHERE is_active) AS stock_value_at_cost,
                (SELECT COALESCE(SUM(stock_quantity * selling_price), 0)
                    FROM products WHERE is_active) AS stock_value_at_retail,
                (SELECT COUNT(*) FROM sales
                    WHERE status = 'COMPLETED' AND sold_at::date = $1) AS today_sales_count,
                (SELECT COALESCE(SUM(total), 0) FROM sales
                    WHERE status = 'COMPLETED' AND sold_at::date = $1) AS today_revenue,
                (SELECT COUNT(*) FROM stock_reconciliations
                    WHERE status = 'PENDING') AS pending_reconciliations,
                (SELECT COUNT(*) FROM purchase_orders
                    WHERE status IN ('ORDERED', 'PARTIALLY_RECEIVED')) AS open_purchase_orders
            "#,
        )
        .bind(today)
        .fetch_one(&self.db)
        .await?;

        Ok(metrics)
    }

    /// Completed sales grouped by day
    pub async fn get_sales_by_day(&self, range: &DateRange) -> AppResult<Vec<DailySales>> {
        let rows = sqlx::query_as::<_, DailySales>(
            r#"
            SELECT
                s.sold_at::date AS date,
                COUNT(*) AS sale_count,
                COALESCE(SUM(l.items), 0)::bigint AS items_sold,
                SUM(s.subtotal) AS gross_sales,
                SUM(s.discount) AS discounts,
                SUM(s.tax) AS tax,
                SUM(s.total) AS revenue
            FROM sales s
            LEFT JOIN (
                SELECT sale_id, SUM(quantity) AS items FROM sale_lines GROUP BY sale_id
            ) l ON l.sale_id = s.id
            WHERE s.status = 'COMPLETED'
              AND s.sold_at::date BETWEEN $1 AND $2
            GROUP BY s.sold_at::date
            ORDER BY date
            "#,
        )
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }
}

/// Serialize records as CSV with a header row
pub fn export_to_csv<T: Serialize>(data: &[T]) -> AppResult<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for record in data {
        wtr.serialize(record)
            .map_err(|e| AppError::Internal(format!("CSV serialization error: {}", e)))?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("UTF-8 conversion error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn csv_has_header_and_rows() {
        let rows = vec![DailySales {
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            sale_count: 3,
            items_sold: 7,
            gross_sales: Decimal::from_str("42.00").unwrap(),
            discounts: Decimal::ZERO,
            tax: Decimal::from_str("2.94").unwrap(),
            revenue: Decimal::from_str("44.94").unwrap(),
        }];
        let csv = export_to_csv(&rows).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("date,sale_count,items_sold,gross_sales,discounts,tax,revenue")
        );
        assert_eq!(lines.next(), Some("2024-05-01,3,7,42.00,0,2.94,44.94"));
    }

    #[test]
    fn empty_export_is_empty() {
        let rows: Vec<DailySales> = Vec::new();
        assert_eq!(export_to_csv(&rows).unwrap(), "");
    }
}
