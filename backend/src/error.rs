//! Error handling for the retail POS server
//!
//! Every error renders as `{"error": {"code", "message", "field"?}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::{CartError, ParseEnumError, PurchaseOrderError, ReconciliationError};
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Conflict: {message}")]
    Conflict { resource: String, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business logic errors
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    // External service errors
    #[error("Email provider error: {0}")]
    EmailProvider(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn conflict(resource: &str, message: impl Into<String>) -> Self {
        AppError::Conflict {
            resource: resource.to_string(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code, also used by the offline sync outcome
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidCredentials => "INVALID_CREDENTIALS",
            AppError::InvalidToken => "INVALID_TOKEN",
            AppError::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Validation { .. } | AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::DuplicateEntry(_) => "DUPLICATE_ENTRY",
            AppError::Conflict { .. } => "CONFLICT",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            AppError::InsufficientStock(_) => "INSUFFICIENT_STOCK",
            AppError::EmailProvider(_) => "EMAIL_PROVIDER_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::Internal(_) | AppError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidCredentials | AppError::InvalidToken | AppError::Unauthorized(_) => {
                StatusCode::UNAUTHORIZED
            }
            AppError::InsufficientPermissions | AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Validation { .. } | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::DuplicateEntry(_) | AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidStateTransition(_) | AppError::InsufficientStock(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::EmailProvider(_) => StatusCode::BAD_GATEWAY,
            AppError::Configuration(_)
            | AppError::DatabaseError(_)
            | AppError::Internal(_)
            | AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message; internal details are never exposed
    pub fn public_message(&self) -> String {
        match self {
            AppError::InvalidCredentials => "Invalid email or password".to_string(),
            AppError::InvalidToken => "Invalid token".to_string(),
            AppError::InsufficientPermissions => {
                "You do not have permission to perform this action".to_string()
            }
            AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::ValidationError(msg)
            | AppError::InvalidStateTransition(msg)
            | AppError::InsufficientStock(msg) => msg.clone(),
            AppError::Validation { message, .. } | AppError::Conflict { message, .. } => {
                message.clone()
            }
            AppError::DuplicateEntry(field) => {
                format!("A record with this {} already exists", field)
            }
            AppError::NotFound(resource) => format!("{} not found", resource),
            AppError::EmailProvider(msg) => format!("Email provider error: {}", msg),
            AppError::Configuration(_) => "Server configuration error".to_string(),
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            AppError::Internal(_) | AppError::InternalError(_) => {
                "An internal server error occurred".to_string()
            }
        }
    }

    fn field(&self) -> Option<String> {
        match self {
            AppError::Validation { field, .. } => Some(field.clone()),
            AppError::DuplicateEntry(field) => Some(field.clone()),
            AppError::Conflict { resource, .. } => Some(resource.clone()),
            _ => None,
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.public_message(),
                field: self.field(),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<ReconciliationError> for AppError {
    fn from(err: ReconciliationError) -> Self {
        match err {
            ReconciliationError::InvalidTransition { .. } | ReconciliationError::NotEditable(_) => {
                AppError::InvalidStateTransition(err.to_string())
            }
            ReconciliationError::NotCreator
            | ReconciliationError::DeleteNotPermitted
            | ReconciliationError::ApproverRequired => {
                AppError::Forbidden(err.to_string())
            }
            ReconciliationError::NoItems | ReconciliationError::DuplicateProduct(_) => {
                AppError::validation("items", err.to_string())
            }
            ReconciliationError::NegativeCount => {
                AppError::validation("physical_count", err.to_string())
            }
            ReconciliationError::RejectionReasonRequired => {
                AppError::validation("reason", err.to_string())
            }
            ReconciliationError::NegativeStock { .. } => {
                AppError::InsufficientStock(err.to_string())
            }
        }
    }
}

impl From<PurchaseOrderError> for AppError {
    fn from(err: PurchaseOrderError) -> Self {
        match err {
            PurchaseOrderError::InvalidTransition { .. } | PurchaseOrderError::NotEditable(_) => {
                AppError::InvalidStateTransition(err.to_string())
            }
            PurchaseOrderError::NoLines
            | PurchaseOrderError::NonPositiveQuantity
            | PurchaseOrderError::OverReceipt { .. }
            | PurchaseOrderError::UnknownLine(_) => AppError::validation("lines", err.to_string()),
        }
    }
}

impl From<CartError> for AppError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::InsufficientStock { .. } => AppError::InsufficientStock(err.to_string()),
            CartError::Empty | CartError::NonPositiveQuantity(_) => {
                AppError::validation("lines", err.to_string())
            }
            CartError::InvalidDiscount => AppError::validation("discount", err.to_string()),
            CartError::InvalidAmount | CartError::InsufficientPayment { .. } => {
                AppError::validation("amount_tendered", err.to_string())
            }
        }
    }
}

impl From<ParseEnumError> for AppError {
    fn from(err: ParseEnumError) -> Self {
        // Stored labels are written by this server; failing to parse one is a
        // data integrity problem, not a client error.
        AppError::Internal(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field_errors = errors.field_errors();
        match field_errors.iter().next() {
            Some((field, errs)) => {
                let message = errs
                    .first()
                    .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| format!("{} is invalid", field));
                AppError::validation(field, message)
            }
            None => AppError::ValidationError(errors.to_string()),
        }
    }
}

/// Map unique-constraint violations to a duplicate-entry error
pub fn map_unique_violation(err: sqlx::Error, field: &str) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return AppError::DuplicateEntry(field.to_string());
        }
        if db_err.is_foreign_key_violation() {
            return AppError::conflict(field, format!("{} is still referenced", field));
        }
    }
    AppError::DatabaseError(err)
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
