//! Email delivery log

use axum::{
    extract::{Query, State},
    Json,
};
use shared::PaginatedResponse;

use super::PageQuery;
use crate::error::{AppError, AppResult};
use crate::middleware::CurrentUser;
use crate::services::notification::EmailLogEntry;
use crate::AppState;

/// Recent notification attempts (administrators)
pub async fn list_email_log(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(page): Query<PageQuery>,
) -> AppResult<Json<PaginatedResponse<EmailLogEntry>>> {
    if !current_user.0.is_admin() {
        return Err(AppError::InsufficientPermissions);
    }
    let log = state.notifications().list_email_log(page.pagination()).await?;
    Ok(Json(log))
}
