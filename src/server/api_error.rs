//! HTTP rendering of [`ServiceError`].
//!
//! Every failure leaves the services as
//!
//! ```json
//! { "success": false, "error": "Invalid license key" }
//! ```
//!
//! with the status code of its category. Internal failures are logged in full
//! and rendered with a generic message so no storage detail leaks to callers.

use std::any::Any;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::errors::ServiceError;

/// Message sent in place of internal error details.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Standard error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
        }
    }
}

impl ServiceError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::MissingParameter(_) | ServiceError::InvalidParameter(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::InvalidKey | ServiceError::ExpiredKey => StatusCode::FORBIDDEN,
            ServiceError::KeyNotFound | ServiceError::ServerNotFound => StatusCode::NOT_FOUND,
            ServiceError::Network(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Storage(_) | ServiceError::Config(_) | ServiceError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = if self.is_internal() {
            error!("Request failed: {}", self);
            INTERNAL_ERROR_MESSAGE.to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

/// Response for a handler that panicked.
///
/// Installed through `tower_http::catch_panic::CatchPanicLayer::custom`.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!(detail = %detail, "Handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(INTERNAL_ERROR_MESSAGE)),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_mapping() {
        assert_eq!(
            ServiceError::MissingParameter("license key").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ServiceError::InvalidKey.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ServiceError::ExpiredKey.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ServiceError::KeyNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ServiceError::ServerNotFound.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::Storage("disk".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn error_response_serialization() {
        let body = ErrorResponse::new("Key not found");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Key not found");
    }

    #[test]
    fn internal_errors_hide_details() {
        let response = ServiceError::Storage("/var/lib/keys.json: EACCES".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn panic_response_is_500() {
        let response = panic_response(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
