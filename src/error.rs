use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::llm::LlmError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0} is not configured")]
    MissingCredentials(&'static str),

    #[error("{0}")]
    InvalidPayload(String),

    /// Upstream failure; the detail is logged and replaced by `public`.
    #[error("{public}")]
    Upstream { public: &'static str, detail: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn upstream(public: &'static str, err: impl std::fmt::Display) -> Self {
        ApiError::Upstream {
            public,
            detail: err.to_string(),
        }
    }
}

impl From<LlmError> for ApiError {
    fn from(err: LlmError) -> Self {
        ApiError::upstream("The advisory service is unavailable", err)
    }
}

impl From<bcrypt::BcryptError> for ApiError {
    fn from(err: bcrypt::BcryptError) -> Self {
        ApiError::Internal(format!("password hashing failed: {}", err))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::BadRequest(msg) | ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::MissingCredentials(what) => {
                tracing::error!(missing = what, "Provider credentials are not configured");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("{} is not configured", what),
                )
            }
            ApiError::InvalidPayload(msg) => {
                tracing::warn!(error = %msg, "Rejected malformed payload");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            ApiError::Upstream { public, detail } => {
                tracing::error!(error = %detail, "Upstream error");
                (StatusCode::INTERNAL_SERVER_ERROR, public.to_string())
            }
            ApiError::Store(StoreError::Conflict(msg)) => (StatusCode::CONFLICT, msg),
            ApiError::Store(e) => {
                tracing::error!(error = %e, "Store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": error_message }))).into_response()
    }
}
