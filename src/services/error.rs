// src/services/error.rs
//! HTTP error responses.
//!
//! Every failure leaves the API as `{"success": false, "message": ...}`.
//! Server-side failures are logged with their cause; the client only sees
//! the fixed public message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or unusable request input (400).
    #[error("{0}")]
    BadRequest(String),

    /// Resource does not exist (404).
    #[error("{0}")]
    NotFound(String),

    /// Unexpected failure (500). `message` is returned, `cause` only logged.
    #[error("{message}: {cause}")]
    Internal { message: &'static str, cause: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn internal(message: &'static str, cause: impl ToString) -> Self {
        Self::Internal {
            message,
            cause: cause.to_string(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::BadRequest(message) => {
                log::debug!("rejected request: {}", message);
                message.clone()
            }
            Self::NotFound(message) => message.clone(),
            Self::Internal { message, .. } => {
                log::error!("{}", self);
                message.to_string()
            }
        };
        (status, Json(json!({ "success": false, "message": message }))).into_response()
    }
}
