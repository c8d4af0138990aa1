//! Error types for Profilegate
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Application-wide error type
///
/// Every failure ends the current request with an error response.
/// Nothing here is retried.
#[derive(Debug, Error)]
pub enum AppError {
    /// Authentication required (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Malformed request, e.g. a callback without `code` (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// The provider refused the access token (401)
    #[error("Access token rejected: {0}")]
    TokenRejected(String),

    /// Authorization code exchange failed (502)
    #[error("Code exchange failed: {0}")]
    ProviderExchange(String),

    /// Provider answered with something unusable (502)
    #[error("Provider error: {0}")]
    Provider(String),

    /// HTTP client error (502)
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Provider did not answer in time (504)
    #[error("Provider request timed out")]
    ProviderTimeout,

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, String, &'static str) {
        match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string(), "unauthorized"),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), "validation"),
            AppError::TokenRejected(_) => (
                StatusCode::UNAUTHORIZED,
                self.to_string(),
                "token_rejected",
            ),
            AppError::ProviderExchange(_) => (
                StatusCode::BAD_GATEWAY,
                self.to_string(),
                "provider_exchange",
            ),
            AppError::Provider(_) => (StatusCode::BAD_GATEWAY, self.to_string(), "provider"),
            AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, self.to_string(), "http_client"),
            AppError::ProviderTimeout => (
                StatusCode::GATEWAY_TIMEOUT,
                self.to_string(),
                "provider_timeout",
            ),
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), "config"),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                "internal",
            ),
        }
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to appropriate HTTP status code
    /// and JSON error body.
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_message, error_type) = self.parts();

        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[error_type]).inc();

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
