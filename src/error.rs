use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Identity required")]
    IdentityRequired,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Init data signature verification failed")]
    SignatureInvalid,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Identity conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("External API error: {0}")]
    ExternalApi(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Postgres SQLSTATE carried by a storage error, if any.
    pub fn sqlstate(&self) -> Option<String> {
        match self {
            AppError::Database(sqlx::Error::Database(db_err)) => {
                db_err.code().map(|code| code.into_owned())
            }
            _ => None,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::IdentityRequired => (
                StatusCode::BAD_REQUEST,
                "identity_required",
                "A Telegram user id or wallet address is required".to_string(),
            ),
            AppError::Validation(ref msg) => {
                (StatusCode::BAD_REQUEST, "validation_error", msg.clone())
            }
            AppError::SignatureInvalid => (
                StatusCode::UNAUTHORIZED,
                "signature_invalid",
                "Init data signature verification failed".to_string(),
            ),
            AppError::Unauthorized(ref msg) => {
                (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone())
            }
            AppError::NotFound(ref msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::Conflict(ref msg) => {
                (StatusCode::CONFLICT, "identity_conflict", msg.clone())
            }
            AppError::Database(ref e) => {
                tracing::error!(error = %e, "storage failure");
                server_error()
            }
            AppError::ExternalApi(ref msg) | AppError::Internal(ref msg) => {
                tracing::error!(error = %msg, "internal failure");
                server_error()
            }
        };

        (status, Json(ErrorResponse { error: code, message })).into_response()
    }
}

fn server_error() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "server_error",
        "Internal server error".to_string(),
    )
}

pub type Result<T> = std::result::Result<T, AppError>;
