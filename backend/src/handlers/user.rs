//! User management handlers (administrators)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shared::{Action, PaginatedResponse, Resource, User};
use uuid::Uuid;

use super::PageQuery;
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::user::{CreateUserInput, UpdateUserInput, UserFilter};
use crate::services::UserService;
use crate::AppState;

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
}

pub async fn list_users(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(page): Query<PageQuery>,
    Query(filter): Query<UserFilter>,
) -> AppResult<Json<PaginatedResponse<User>>> {
    current_user.0.require(Resource::User, Action::View)?;
    let service = UserService::new(state.db);
    Ok(Json(service.list(&filter, page.pagination()).await?))
}

pub async fn get_user(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<User>> {
    current_user.0.require(Resource::User, Action::View)?;
    let service = UserService::new(state.db);
    Ok(Json(service.get(id).await?))
}

pub async fn create_user(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateUserInput>,
) -> AppResult<(StatusCode, Json<User>)> {
    current_user.0.require(Resource::User, Action::Create)?;
    let service = UserService::new(state.db);
    let user = service.create(input).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn update_user(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateUserInput>,
) -> AppResult<Json<User>> {
    current_user.0.require(Resource::User, Action::Edit)?;
    let service = UserService::new(state.db);
    Ok(Json(service.update(&current_user.0, id, input).await?))
}

/// Set a new password for a user
pub async fn reset_password(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(body): Json<ResetPasswordRequest>,
) -> AppResult<StatusCode> {
    current_user.0.require(Resource::User, Action::Edit)?;
    let service = UserService::new(state.db);
    service.reset_password(id, &body.password).await?;
    Ok(StatusCode::NO_CONTENT)
}
