//! Purchase order handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{Action, PaginatedResponse, PurchaseOrder, Resource};
use uuid::Uuid;

use super::PageQuery;
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::purchase_order::{
    CreatePurchaseOrderInput, PurchaseOrderFilter, PurchaseOrderListItem, ReceiveInput,
    UpdatePurchaseOrderInput,
};
use crate::services::PurchaseOrderService;
use crate::AppState;

fn service(state: &AppState) -> PurchaseOrderService {
    PurchaseOrderService::new(state.db.clone(), state.notifications())
}

pub async fn list_purchase_orders(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(page): Query<PageQuery>,
    Query(filter): Query<PurchaseOrderFilter>,
) -> AppResult<Json<PaginatedResponse<PurchaseOrderListItem>>> {
    current_user.0.require(Resource::PurchaseOrder, Action::View)?;
    Ok(Json(service(&state).list(&filter, page.pagination()).await?))
}

pub async fn get_purchase_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PurchaseOrder>> {
    current_user.0.require(Resource::PurchaseOrder, Action::View)?;
    Ok(Json(service(&state).get(id).await?))
}

pub async fn create_purchase_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreatePurchaseOrderInput>,
) -> AppResult<(StatusCode, Json<PurchaseOrder>)> {
    current_user.0.require(Resource::PurchaseOrder, Action::Create)?;
    let order = service(&state).create(&current_user.0, input).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn update_purchase_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdatePurchaseOrderInput>,
) -> AppResult<Json<PurchaseOrder>> {
    current_user.0.require(Resource::PurchaseOrder, Action::Edit)?;
    Ok(Json(service(&state).update(id, input).await?))
}

pub async fn delete_purchase_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    current_user.0.require(Resource::PurchaseOrder, Action::Delete)?;
    service(&state).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Send a draft to the supplier
pub async fn order_purchase_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PurchaseOrder>> {
    current_user.0.require(Resource::PurchaseOrder, Action::Approve)?;
    Ok(Json(service(&state).mark_ordered(id).await?))
}

pub async fn cancel_purchase_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PurchaseOrder>> {
    current_user.0.require(Resource::PurchaseOrder, Action::Approve)?;
    Ok(Json(service(&state).cancel(id).await?))
}

/// Book a delivery into stock
pub async fn receive_purchase_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<ReceiveInput>,
) -> AppResult<Json<PurchaseOrder>> {
    current_user.0.require(Resource::PurchaseOrder, Action::Edit)?;
    Ok(Json(service(&state).receive(&current_user.0, id, input).await?))
}
