//! Dispatch failures.
//!
//! # Taxonomy
//! - `Status`: structured failure with an explicit code and optional cause
//! - `Timeout`: raised by the loader executor when the budget runs out (408)
//! - `Internal`: opaque failure, always rendered as 500
//!
//! Route-not-found is not a failure value; it is served by the not-found
//! handler, whose default happens to return `DispatchError::not_found`.

use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

/// Boxed error used for causes and opaque failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A failure produced by a handler, middleware, loader or the dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Failure that maps onto a specific status page.
    #[error("{message}")]
    Status {
        status: StatusCode,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A loader exceeded its budget.
    #[error("loader timed out after {0:?}")]
    Timeout(Duration),

    /// Anything else.
    #[error(transparent)]
    Internal(BoxError),
}

impl DispatchError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
            source: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Wrap an arbitrary error as an opaque 500.
    pub fn internal(err: impl Into<BoxError>) -> Self {
        Self::Internal(err.into())
    }

    /// Attach a cause. Non-structured variants are promoted to a structured
    /// failure with their current status.
    pub fn with_source(self, cause: impl Into<BoxError>) -> Self {
        let status = self.status();
        match self {
            Self::Status { message, .. } => Self::Status {
                status,
                message,
                source: Some(cause.into()),
            },
            other => Self::Status {
                status,
                message: other.to_string(),
                source: Some(cause.into()),
            },
        }
    }

    /// Status code the failure is rendered with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Status { status, .. } => *status,
            Self::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
