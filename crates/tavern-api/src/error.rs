use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use thiserror::Error;

use tavern_types::api::ErrorBody;

/// Every failure a handler can return. Anything not covered by a specific
/// variant ends up as `Internal`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    /// Carries the validator's reason, e.g. "expired".
    #[error("invalid or expired token: {0}")]
    Unauthorized(String),

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    Internal {
        message: String,
        details: Option<String>,
    },
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::Validation(message) | Self::NotFound(message) => ErrorBody {
                error: message,
                details: None,
            },
            Self::Unauthorized(reason) => ErrorBody {
                error: "invalid or expired token".to_string(),
                details: Some(reason),
            },
            Self::MethodNotAllowed => ErrorBody {
                error: "method not allowed".to_string(),
                details: None,
            },
            Self::Internal { message, details } => ErrorBody {
                error: message,
                details,
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Decode a JSON request body. Malformed input is a 400 with our error shape.
pub fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::Validation(format!("invalid request body: {}", e)))
}
