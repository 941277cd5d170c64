//! Financial transaction models

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of money movement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinancialTransactionType {
    Income,
    Expense,
}

text_enum!(FinancialTransactionType, "transaction type", {
    Income => "INCOME",
    Expense => "EXPENSE",
});

/// Bookkeeping category of a transaction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinancialCategory {
    Sales,
    Purchases,
    Refund,
    Operating,
    Other,
}

text_enum!(FinancialCategory, "transaction category", {
    Sales => "SALES",
    Purchases => "PURCHASES",
    Refund => "REFUND",
    Operating => "OPERATING",
    Other => "OTHER",
});

/// A recorded income or expense
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialTransaction {
    pub id: Uuid,
    pub transaction_type: FinancialTransactionType,
    pub category: FinancialCategory,
    pub amount: Decimal,
    pub description: String,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub transaction_date: NaiveDate,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Income, expense and net over a period
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FinancialSummary {
    pub total_income: Decimal,
    pub total_expense: Decimal,
    pub net: Decimal,
    pub transaction_count: u64,
}

impl FinancialSummary {
    pub fn from_entries<'a>(
        entries: impl IntoIterator<Item = (FinancialTransactionType, &'a Decimal)>,
    ) -> Self {
        let mut summary = Self::default();
        for (kind, amount) in entries {
            match kind {
                FinancialTransactionType::Income => summary.total_income += *amount,
                FinancialTransactionType::Expense => summary.total_expense += *amount,
            }
            summary.transaction_count += 1;
        }
        summary.net = summary.total_income - summary.total_expense;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_nets_income_and_expense() {
        let amounts = [Decimal::from(100), Decimal::from(30), Decimal::from(5)];
        let summary = FinancialSummary::from_entries([
            (FinancialTransactionType::Income, &amounts[0]),
            (FinancialTransactionType::Expense, &amounts[1]),
            (FinancialTransactionType::Income, &amounts[2]),
        ]);
        assert_eq!(summary.total_income, Decimal::from(105));
        assert_eq!(summary.total_expense, Decimal::from(30));
        assert_eq!(summary.net, Decimal::from(75));
        assert_eq!(summary.transaction_count, 3);
    }
}
