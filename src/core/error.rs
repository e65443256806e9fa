//! Typed error handling for the resource store
//!
//! Every backend reports failures through [`StoreError`], so callers never
//! observe backend-specific error types (`sqlx::Error`, `reqwest::Error`).
//!
//! # Error Categories
//!
//! - `NotFound`: an identifier does not resolve to an existing resource
//! - `AlreadyExists`: a create or rename violates a uniqueness constraint
//! - `IllegalOperation`: forbidden by policy (protected built-ins, live dependents)
//! - `InvalidArgument`: malformed filter, unsupported operator, out-of-range page
//! - `Authorization`: the remote store rejected our credentials or token
//! - `Transport`: network, timeout or decoding failure talking to a remote store
//! - `Remote`: the remote store failed in a way no specific kind describes
//!
//! The error is also the wire format: [`StoreError::to_response`] renders the
//! `{code, message}` body served by the REST exposure, and
//! [`StoreError::from_response`] turns such a body back into the same kind on
//! the client side.
//!
//! # Example
//!
//! ```rust,ignore
//! match store.get_stack(&id).await {
//!     Ok(stack) => println!("{}", stack.name),
//!     Err(StoreError::NotFound(msg)) => println!("missing: {}", msg),
//!     Err(e) => return Err(e),
//! }
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use thiserror::Error;

/// Result alias used by every store operation
pub type StoreResult<T> = Result<T, StoreError>;

/// The error type shared by all store backends
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Identifier does not resolve to an existing resource
    #[error("{0}")]
    NotFound(String),

    /// Create or rename violates a uniqueness constraint
    #[error("{0}")]
    AlreadyExists(String),

    /// Operation forbidden by domain policy
    #[error("{0}")]
    IllegalOperation(String),

    /// Malformed input
    #[error("{0}")]
    InvalidArgument(String),

    /// Credentials or token rejected
    #[error("Authorization failed: {0}")]
    Authorization(String),

    /// Network, timeout or decoding failure
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Unmapped failure reported by a remote store
    #[error("Remote store returned HTTP {status}: {body}")]
    Remote { status: u16, body: String },

    /// Database failure that is not a domain error
    #[error("Database error: {0}")]
    Database(String),

    /// Failed to serialize or deserialize a payload
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal store errors (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response structure for HTTP responses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl StoreError {
    /// `NotFound` for a resource kind and identifier
    pub fn not_found(resource: &str, id: impl Display) -> Self {
        StoreError::NotFound(format!("Unable to find {} with ID '{}'", resource, id))
    }

    /// `AlreadyExists` naming the conflicting key and scope
    pub fn already_exists(resource: &str, key: impl Display, scope: impl Display) -> Self {
        StoreError::AlreadyExists(format!(
            "Unable to register {} '{}': a {} with this name already exists {}",
            resource, key, resource, scope
        ))
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::AlreadyExists(_) => StatusCode::CONFLICT,
            StoreError::IllegalOperation(_) => StatusCode::FORBIDDEN,
            StoreError::InvalidArgument(_) => StatusCode::UNPROCESSABLE_ENTITY,
            StoreError::Authorization(_) => StatusCode::UNAUTHORIZED,
            StoreError::Transport(_) => StatusCode::BAD_GATEWAY,
            StoreError::Remote { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            StoreError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            StoreError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            StoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "NOT_FOUND",
            StoreError::AlreadyExists(_) => "ALREADY_EXISTS",
            StoreError::IllegalOperation(_) => "ILLEGAL_OPERATION",
            StoreError::InvalidArgument(_) => "INVALID_ARGUMENT",
            StoreError::Authorization(_) => "UNAUTHORIZED",
            StoreError::Transport(_) => "TRANSPORT_ERROR",
            StoreError::Remote { .. } => "REMOTE_ERROR",
            StoreError::Database(_) => "DATABASE_ERROR",
            StoreError::Serialization(_) => "SERIALIZATION_ERROR",
            StoreError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Convert to an error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
        }
    }

    /// Rebuild an error from an HTTP status and response body.
    ///
    /// The body's `code` wins when it names a domain kind; otherwise the status
    /// decides. Anything unmapped becomes `Remote` with the raw status and body.
    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed = serde_json::from_str::<ErrorResponse>(body).ok();

        if let Some(resp) = &parsed {
            let message = resp.message.clone();
            match resp.code.as_str() {
                "NOT_FOUND" => return StoreError::NotFound(message),
                "ALREADY_EXISTS" => return StoreError::AlreadyExists(message),
                "ILLEGAL_OPERATION" => return StoreError::IllegalOperation(message),
                "INVALID_ARGUMENT" => return StoreError::InvalidArgument(message),
                "UNAUTHORIZED" => return StoreError::Authorization(message),
                _ => {}
            }
        }

        let message = parsed
            .map(|resp| resp.message)
            .unwrap_or_else(|| body.to_string());

        match status {
            401 => StoreError::Authorization(message),
            403 => StoreError::IllegalOperation(message),
            404 => StoreError::NotFound(message),
            409 => StoreError::AlreadyExists(message),
            400 | 422 => StoreError::InvalidArgument(message),
            _ => StoreError::Remote {
                status,
                body: body.to_string(),
            },
        }
    }
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self.to_response());
        (status, body).into_response()
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<validator::ValidationErrors> for StoreError {
    fn from(err: validator::ValidationErrors) -> Self {
        StoreError::InvalidArgument(format!("Invalid request: {}", err))
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound(err.to_string()),
            other => StoreError::Database(other.to_string()),
        }
    }
}

#[cfg(feature = "rest")]
impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StoreError::Transport(format!("request timed out: {}", err))
        } else if err.is_decode() {
            StoreError::Transport(format!("failed to decode response: {}", err))
        } else {
            StoreError::Transport(err.to_string())
        }
    }
}
