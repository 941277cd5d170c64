//! Financial transaction handlers

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use shared::{Action, FinancialTransaction, PaginatedResponse, Resource};

use super::PageQuery;
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::finance::{
    resolve_range, CreateTransactionInput, PeriodSummary, TransactionFilter,
};
use crate::services::FinanceService;
use crate::AppState;

#[derive(Deserialize)]
pub struct SummaryQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

pub async fn list_transactions(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(page): Query<PageQuery>,
    Query(filter): Query<TransactionFilter>,
) -> AppResult<Json<PaginatedResponse<FinancialTransaction>>> {
    current_user.0.require(Resource::Transaction, Action::View)?;
    let service = FinanceService::new(state.db);
    Ok(Json(service.list(&filter, page.pagination()).await?))
}

/// Record a manual income or expense
pub async fn create_transaction(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateTransactionInput>,
) -> AppResult<(StatusCode, Json<FinancialTransaction>)> {
    current_user.0.require(Resource::Transaction, Action::Create)?;
    let service = FinanceService::new(state.db);
    let transaction = service.create(&current_user.0, input).await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

/// Income, expense and net; defaults to the current month
pub async fn transaction_summary(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<SummaryQuery>,
) -> AppResult<Json<PeriodSummary>> {
    current_user.0.require(Resource::Transaction, Action::View)?;
    let range = resolve_range(query.start_date, query.end_date)?;
    let service = FinanceService::new(state.db);
    Ok(Json(service.summary(range).await?))
}

pub async fn export_transactions(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(filter): Query<TransactionFilter>,
) -> AppResult<impl IntoResponse> {
    current_user.0.require(Resource::Transaction, Action::Export)?;
    let service = FinanceService::new(state.db);
    let csv = service.export_csv(&filter).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"transactions.csv\"",
            ),
        ],
        csv,
    ))
}
