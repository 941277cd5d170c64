//! Category, brand and supplier handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{Action, Brand, Category, PaginatedResponse, Resource, Supplier};
use uuid::Uuid;

use super::PageQuery;
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::catalog::{LookupInput, NameFilter, SupplierInput};
use crate::services::{LookupService, SupplierService};
use crate::AppState;

pub async fn list_categories(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(page): Query<PageQuery>,
    Query(filter): Query<NameFilter>,
) -> AppResult<Json<PaginatedResponse<Category>>> {
    current_user.0.require(Resource::Category, Action::View)?;
    let service = LookupService::categories(state.db);
    Ok(Json(service.list(&filter, page.pagination()).await?))
}

pub async fn get_category(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Category>> {
    current_user.0.require(Resource::Category, Action::View)?;
    let service = LookupService::categories(state.db);
    Ok(Json(service.get(id).await?))
}

pub async fn create_category(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<LookupInput>,
) -> AppResult<(StatusCode, Json<Category>)> {
    current_user.0.require(Resource::Category, Action::Create)?;
    let service = LookupService::categories(state.db);
    Ok((StatusCode::CREATED, Json(service.create(input).await?)))
}

pub async fn update_category(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<LookupInput>,
) -> AppResult<Json<Category>> {
    current_user.0.require(Resource::Category, Action::Edit)?;
    let service = LookupService::categories(state.db);
    Ok(Json(service.update(id, input).await?))
}

pub async fn delete_category(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    current_user.0.require(Resource::Category, Action::Delete)?;
    LookupService::categories(state.db).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_brands(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(page): Query<PageQuery>,
    Query(filter): Query<NameFilter>,
) -> AppResult<Json<PaginatedResponse<Brand>>> {
    current_user.0.require(Resource::Brand, Action::View)?;
    let service = LookupService::brands(state.db);
    Ok(Json(service.list(&filter, page.pagination()).await?))
}

pub async fn get_brand(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Brand>> {
    current_user.0.require(Resource::Brand, Action::View)?;
    let service = LookupService::brands(state.db);
    Ok(Json(service.get(id).await?))
}

pub async fn create_brand(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<LookupInput>,
) -> AppResult<(StatusCode, Json<Brand>)> {
    current_user.0.require(Resource::Brand, Action::Create)?;
    let service = LookupService::brands(state.db);
    Ok((StatusCode::CREATED, Json(service.create(input).await?)))
}

pub async fn update_brand(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<LookupInput>,
) -> AppResult<Json<Brand>> {
    current_user.0.require(Resource::Brand, Action::Edit)?;
    let service = LookupService::brands(state.db);
    Ok(Json(service.update(id, input).await?))
}

pub async fn delete_brand(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    current_user.0.require(Resource::Brand, Action::Delete)?;
    LookupService::brands(state.db).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_suppliers(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(page): Query<PageQuery>,
    Query(filter): Query<NameFilter>,
) -> AppResult<Json<PaginatedResponse<Supplier>>> {
    current_user.0.require(Resource::Supplier, Action::View)?;
    let service = SupplierService::new(state.db);
    Ok(Json(service.list(&filter, page.pagination()).await?))
}

pub async fn get_supplier(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Supplier>> {
    current_user.0.require(Resource::Supplier, Action::View)?;
    let service = SupplierService::new(state.db);
    Ok(Json(service.get(id).await?))
}

pub async fn create_supplier(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<SupplierInput>,
) -> AppResult<(StatusCode, Json<Supplier>)> {
    current_user.0.require(Resource::Supplier, Action::Create)?;
    let service = SupplierService::new(state.db);
    Ok((StatusCode::CREATED, Json(service.create(input).await?)))
}

pub async fn update_supplier(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<SupplierInput>,
) -> AppResult<Json<Supplier>> {
    current_user.0.require(Resource::Supplier, Action::Edit)?;
    let service = SupplierService::new(state.db);
    Ok(Json(service.update(id, input).await?))
}

pub async fn delete_supplier(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    current_user.0.require(Resource::Supplier, Action::Delete)?;
    SupplierService::new(state.db).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
