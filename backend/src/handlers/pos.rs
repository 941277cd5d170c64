//! POS checkout and offline queue handlers

use axum::{extract::State, http::StatusCode, Json};
use shared::{Action, Resource};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::sale::{CheckoutInput, CheckoutOutcome};
use crate::services::sync::{SyncBatch, SyncReport};
use crate::services::OfflineSyncService;
use crate::AppState;

/// Complete a sale; replays of a known client reference return 200 with the
/// original sale
pub async fn checkout(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CheckoutInput>,
) -> AppResult<(StatusCode, Json<CheckoutOutcome>)> {
    current_user.0.require(Resource::Sale, Action::Create)?;
    let outcome = state.sales().checkout(&current_user.0, input).await?;
    let status = if outcome.duplicate {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(outcome)))
}

/// Replay checkouts queued while the till was offline
pub async fn sync_offline_sales(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(batch): Json<SyncBatch>,
) -> AppResult<Json<SyncReport>> {
    current_user.0.require(Resource::Sale, Action::Create)?;
    let service = OfflineSyncService::new(state.sales());
    Ok(Json(service.sync(&current_user.0, batch).await?))
}
