//! Stock reconciliation handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{Action, PaginatedResponse, Resource, StockReconciliation};
use uuid::Uuid;

use super::PageQuery;
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::reconciliation::{
    ApproveInput, CreateReconciliationInput, ReconciliationFilter, ReconciliationListItem,
    RejectInput, UpdateReconciliationInput,
};
use crate::services::ReconciliationService;
use crate::AppState;

fn service(state: &AppState) -> ReconciliationService {
    ReconciliationService::new(state.db.clone(), state.notifications())
}

pub async fn list_reconciliations(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(page): Query<PageQuery>,
    Query(filter): Query<ReconciliationFilter>,
) -> AppResult<Json<PaginatedResponse<ReconciliationListItem>>> {
    current_user.0.require(Resource::Reconciliation, Action::View)?;
    Ok(Json(service(&state).list(&filter, page.pagination()).await?))
}

pub async fn get_reconciliation(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<StockReconciliation>> {
    current_user.0.require(Resource::Reconciliation, Action::View)?;
    Ok(Json(service(&state).get(id).await?))
}

/// Start a draft count
pub async fn create_reconciliation(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateReconciliationInput>,
) -> AppResult<(StatusCode, Json<StockReconciliation>)> {
    current_user.0.require(Resource::Reconciliation, Action::Create)?;
    let reconciliation = service(&state).create(&current_user.0, input).await?;
    Ok((StatusCode::CREATED, Json(reconciliation)))
}

pub async fn update_reconciliation(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateReconciliationInput>,
) -> AppResult<Json<StockReconciliation>> {
    current_user.0.require(Resource::Reconciliation, Action::Edit)?;
    Ok(Json(service(&state).update(&current_user.0, id, input).await?))
}

/// Discard a draft; restricted to roles holding the delete permission
pub async fn delete_reconciliation(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    current_user.0.require(Resource::Reconciliation, Action::Delete)?;
    service(&state).delete(&current_user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn submit_reconciliation(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<StockReconciliation>> {
    current_user.0.require(Resource::Reconciliation, Action::Edit)?;
    Ok(Json(service(&state).submit(&current_user.0, id).await?))
}

/// Approve and apply stock corrections
pub async fn approve_reconciliation(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    input: Option<Json<ApproveInput>>,
) -> AppResult<Json<StockReconciliation>> {
    current_user.0.require(Resource::Reconciliation, Action::Approve)?;
    let input = input.map(|Json(i)| i).unwrap_or_default();
    Ok(Json(service(&state).approve(&current_user.0, id, input).await?))
}

pub async fn reject_reconciliation(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<RejectInput>,
) -> AppResult<Json<StockReconciliation>> {
    current_user.0.require(Resource::Reconciliation, Action::Approve)?;
    Ok(Json(service(&state).reject(&current_user.0, id, input).await?))
}
