//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how each
//! variant is reported to HTTP clients.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use lumina_core::{PortError, StoreError};
use serde_json::json;
use tracing::error;

use crate::config::ConfigError;

/// The primary error type for the `lumina_api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// A workspace operation was rejected or failed.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The request itself was malformed.
    #[error("{0}")]
    BadRequest(String),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Store(err) => match err {
                StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
                StoreError::ParentNotConfirmed { .. } => StatusCode::CONFLICT,
                StoreError::Blank(_) | StoreError::EmptyNote(_) => StatusCode::BAD_REQUEST,
                StoreError::Remote(port) => port_status(port),
                StoreError::Assistant(_) => StatusCode::BAD_GATEWAY,
            },
            Self::Port(port) => port_status(port),
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) | Self::Database(_) | Self::Io(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

fn port_status(err: &PortError) -> StatusCode {
    match err {
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::AccessDenied(_) => StatusCode::FORBIDDEN,
        PortError::Unexpected(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
