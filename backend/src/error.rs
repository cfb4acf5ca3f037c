//! Application error types and result alias.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application result type alias
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Missing or invalid admin token
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Not found error
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The row exists but its backing file has disappeared
    #[error("Resource gone: {0}")]
    Gone(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Upload exceeds the configured ceiling
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// A mounted plugin failed while serving a request
    #[error("Plugin error: {0}")]
    Plugin(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Address parse error
    #[error("Address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Archive error
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl AppError {
    /// Status code and machine-readable code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            AppError::Migration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "MIGRATION_ERROR"),
            AppError::Authentication(_) => (StatusCode::UNAUTHORIZED, "AUTH_ERROR"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Gone(_) => (StatusCode::GONE, "GONE"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            AppError::Plugin(_) => (StatusCode::BAD_GATEWAY, "PLUGIN_ERROR"),
            AppError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            AppError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            AppError::AddrParse(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ADDR_PARSE_ERROR"),
            AppError::Json(_) => (StatusCode::BAD_REQUEST, "JSON_ERROR"),
            AppError::Zip(_) => (StatusCode::BAD_REQUEST, "ZIP_ERROR"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            AppError::Config(msg)
            | AppError::Authentication(msg)
            | AppError::NotFound(msg)
            | AppError::Gone(msg)
            | AppError::Validation(msg)
            | AppError::PayloadTooLarge(msg)
            | AppError::Plugin(msg)
            | AppError::Storage(msg)
            | AppError::Internal(msg) => msg.clone(),
            AppError::Database(_) => "Database operation failed".to_string(),
            AppError::Migration(_) => "Database migration failed".to_string(),
            AppError::Io(_) => "IO operation failed".to_string(),
            AppError::AddrParse(_) => "Invalid address".to_string(),
            AppError::Json(_) => "Invalid JSON".to_string(),
            AppError::Zip(e) => format!("Invalid zip archive: {}", e),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, code = code, "Request error");
        } else {
            tracing::debug!(error = %self, code = code, "Request rejected");
        }

        let body = Json(json!({
            "code": code,
            "message": message,
        }));

        (status, body).into_response()
    }
}
