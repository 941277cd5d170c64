//! Product handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use shared::{Action, PaginatedResponse, Resource, StockMovement};
use uuid::Uuid;

use super::PageQuery;
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::product::{
    CreateProductInput, DeleteOutcome, ProductFilter, ProductView, UpdateProductInput,
};
use crate::services::ProductService;
use crate::AppState;

#[derive(Serialize)]
pub struct DeleteProductResponse {
    pub id: Uuid,
    pub outcome: DeleteOutcome,
}

/// Search products by name, SKU or barcode
pub async fn list_products(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(page): Query<PageQuery>,
    Query(filter): Query<ProductFilter>,
) -> AppResult<Json<PaginatedResponse<ProductView>>> {
    current_user.0.require(Resource::Product, Action::View)?;
    let service = ProductService::new(state.db);
    Ok(Json(service.list(&filter, page.pagination()).await?))
}

pub async fn low_stock_products(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<Vec<ProductView>>> {
    current_user.0.require(Resource::Product, Action::View)?;
    let service = ProductService::new(state.db);
    Ok(Json(service.low_stock().await?))
}

/// Barcode scan lookup used by the POS
pub async fn get_by_barcode(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(code): Path<String>,
) -> AppResult<Json<ProductView>> {
    current_user.0.require(Resource::Product, Action::View)?;
    let service = ProductService::new(state.db);
    Ok(Json(service.get_by_barcode(&code).await?))
}

pub async fn get_product(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ProductView>> {
    current_user.0.require(Resource::Product, Action::View)?;
    let service = ProductService::new(state.db);
    Ok(Json(service.get(id).await?))
}

pub async fn create_product(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateProductInput>,
) -> AppResult<(StatusCode, Json<ProductView>)> {
    current_user.0.require(Resource::Product, Action::Create)?;
    let service = ProductService::new(state.db);
    let product = service.create(&current_user.0, input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update_product(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateProductInput>,
) -> AppResult<Json<ProductView>> {
    current_user.0.require(Resource::Product, Action::Edit)?;
    let service = ProductService::new(state.db);
    Ok(Json(service.update(id, input).await?))
}

/// Delete, or deactivate when the product has history
pub async fn delete_product(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DeleteProductResponse>> {
    current_user.0.require(Resource::Product, Action::Delete)?;
    let service = ProductService::new(state.db);
    let outcome = service.delete(id).await?;
    Ok(Json(DeleteProductResponse { id, outcome }))
}

/// Stock ledger for one product
pub async fn product_movements(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> AppResult<Json<PaginatedResponse<StockMovement>>> {
    current_user.0.require(Resource::Product, Action::View)?;
    let service = ProductService::new(state.db);
    Ok(Json(service.movements(id, page.pagination()).await?))
}
