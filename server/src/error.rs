//! HTTP error mapping.
//!
//! Domain errors carry exact public messages where the contract demands one
//! (insufficient stock); backend faults always collapse to a generic body so
//! internals never leak.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use formgate_core::form::graph::GraphError;
use formgate_core::intake::IntakeError;
use formgate_core::ratelimit::RateLimited;
use formgate_core::store::{LimitError, StoreError};
use serde::Serialize;

/// Handler error: an HTTP status plus the public message.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    retry_after: Option<u64>,
}

/// Error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl AppError {
    /// Creates an error with an explicit status.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            retry_after: None,
        }
    }

    /// A 400 with the given public message.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// A 404 with the given public message.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// A 500 with a generic body. The real cause belongs in the logs.
    #[must_use]
    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, message = %self.message, "request failed");
        }
        let mut response = (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response();
        if let Some(secs) = self.retry_after {
            if let Ok(value) = axum::http::HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert("Retry-After", value);
            }
        }
        response
    }
}

impl From<IntakeError> for AppError {
    fn from(err: IntakeError) -> Self {
        match err {
            IntakeError::Validation(inner) => Self::bad_request(inner.to_string()),
            IntakeError::NotFound | IntakeError::NotAvailable => Self::not_found(err.to_string()),
            // The exact stock message is part of the public contract.
            IntakeError::InsufficientStock { .. } => Self::bad_request(err.to_string()),
            IntakeError::RateLimited(limited) => limited.into(),
            IntakeError::Store(store) => store.into(),
        }
    }
}

impl From<RateLimited> for AppError {
    fn from(err: RateLimited) -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: "too many requests".to_string(),
            retry_after: Some(err.retry_after.as_secs().max(1)),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "storage failure");
        Self::internal()
    }
}

impl From<GraphError> for AppError {
    fn from(err: GraphError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<LimitError> for AppError {
    fn from(err: LimitError) -> Self {
        match err {
            LimitError::BelowOrdered { .. } => Self::bad_request(err.to_string()),
            LimitError::NotFound => Self::not_found(err.to_string()),
            LimitError::Store(store) => store.into(),
        }
    }
}
