//! Sales history, receipts and voids

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use shared::{Action, PaginatedResponse, PaperWidth, Resource, Sale};
use uuid::Uuid;

use super::PageQuery;
use crate::error::{AppError, AppResult};
use crate::middleware::CurrentUser;
use crate::services::sale::{SaleFilter, SaleSummary, VoidInput};
use crate::AppState;

#[derive(Deserialize)]
pub struct ReceiptQuery {
    /// Printer width in characters: 32 (58 mm) or 48 (80 mm)
    pub width: Option<usize>,
}

pub async fn list_sales(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(page): Query<PageQuery>,
    Query(filter): Query<SaleFilter>,
) -> AppResult<Json<PaginatedResponse<SaleSummary>>> {
    current_user.0.require(Resource::Sale, Action::View)?;
    Ok(Json(state.sales().list(&filter, page.pagination()).await?))
}

pub async fn get_sale(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Sale>> {
    current_user.0.require(Resource::Sale, Action::View)?;
    Ok(Json(state.sales().get(id).await?))
}

/// Plain-text thermal receipt
pub async fn get_receipt(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    Query(query): Query<ReceiptQuery>,
) -> AppResult<impl IntoResponse> {
    current_user.0.require(Resource::Sale, Action::View)?;
    let width = match query.width {
        None => PaperWidth::Wide,
        Some(columns) => PaperWidth::from_columns(columns)
            .ok_or_else(|| AppError::validation("width", "Receipt width must be 32 or 48"))?,
    };

    let store = state.config.store.store_info();
    let text = state.sales().receipt(id, &store, width).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text))
}

/// Void a completed sale
pub async fn void_sale(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<VoidInput>,
) -> AppResult<Json<Sale>> {
    current_user.0.require(Resource::Sale, Action::Void)?;
    Ok(Json(state.sales().void(&current_user.0, id, input).await?))
}
