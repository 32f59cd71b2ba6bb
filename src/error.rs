//! Error types for credgate.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::limiter::RateLimitExceeded;

/// Result type alias for credgate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for credgate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    RateLimited(#[from] RateLimitExceeded),

    #[error("Invalid or missing credentials")]
    Unauthorized,

    #[error("No upstream credentials available")]
    NoCredentials,

    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::NoCredentials => StatusCode::SERVICE_UNAVAILABLE,
            Error::Upstream(_) => StatusCode::BAD_GATEWAY,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_type = match &self {
            Error::RateLimited(_) => "rate_limit_exceeded",
            Error::Unauthorized => "invalid_request_error",
            _ => "credgate_error",
        };

        // Return OpenAI-compatible error format
        let body = serde_json::json!({
            "error": {
                "message": self.to_string(),
                "type": error_type,
                "code": status.as_u16()
            }
        });

        let mut response = (status, axum::Json(body)).into_response();
        if let Error::RateLimited(exceeded) = &self {
            let secs = exceeded.retry_after.as_secs().max(1);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
