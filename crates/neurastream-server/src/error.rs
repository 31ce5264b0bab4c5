//! HTTP-facing error type, mapping the core error taxonomy onto status codes

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Result type for server operations
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors surfaced across the HTTP and WebSocket control surface
#[derive(Error, Debug)]
pub enum ApiError {
    /// Invalid settings at startup
    #[error("configuration error: {reason}")]
    Config {
        /// Description of the invalid setting
        reason: String,
    },

    /// The dataset file is missing or unreadable; fatal at startup
    #[error("dataset unavailable: {source}")]
    DatasetUnavailable {
        #[from]
        /// Underlying dataset error
        source: neurastream_dataset::DatasetError,
    },

    /// A requested session, trial, or target does not exist
    #[error("not found: {reason}")]
    NotFound {
        /// Description of what was missing
        reason: String,
    },

    /// A session delete was attempted while connections were still attached
    #[error("session busy: {reason}")]
    Busy {
        /// Description of why the request was refused
        reason: String,
    },

    /// The manager has not finished starting up
    #[error("service not ready")]
    NotReady,
}

impl ApiError {
    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::NotFound {
            reason: reason.into(),
        }
    }
}

impl From<neurastream_core::CoreError> for ApiError {
    fn from(err: neurastream_core::CoreError) -> Self {
        match err {
            neurastream_core::CoreError::UnknownSession { session_code } => Self::NotFound {
                reason: format!("unknown session: {session_code}"),
            },
            neurastream_core::CoreError::SessionBusy {
                session_code,
                active_connections,
            } => Self::Busy {
                reason: format!(
                    "cannot delete session {session_code}: {active_connections} active connection(s)"
                ),
            },
            other => Self::NotFound {
                reason: other.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::DatasetUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Busy { .. } => StatusCode::CONFLICT,
            ApiError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
