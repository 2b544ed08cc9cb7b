//! Errors reported synchronously by the relay's outer layers.
//!
//! Job failures are recorded on the job and answered with an apology to the
//! sender; they only reach [`RelayError`] when a caller asks about them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error surfaced to the HTTP layer and the process entry point.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("{resource_type} '{id}' not found")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// Rejected input, such as a payload that cannot be serialized.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// A queue with the same name already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Settings missing or malformed at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Circuit breaker open for queue '{0}'")]
    CircuitBreakerOpen(String),

    #[error("Timed out after {0}")]
    Timeout(String),

    /// Queue full or shutting down.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Validation(_) => 400,
            Self::Conflict(_) => 409,
            Self::CircuitBreakerOpen(_) | Self::ServiceUnavailable(_) => 503,
            Self::Timeout(_) => 504,
            Self::Configuration(_) | Self::Internal(_) => 500,
        }
    }

    /// Stable code clients can match on.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Validation(_) => "INVALID_REQUEST",
            Self::Conflict(_) => "CONFLICT",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::CircuitBreakerOpen(_) => "CIRCUIT_OPEN",
            Self::Timeout(_) => "TIMEOUT",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    #[must_use]
    pub fn not_found(resource_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource_type,
            id: id.to_string(),
        }
    }

    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("malformed JSON: {}", err))
    }
}

/// Error body returned by the HTTP API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    #[must_use]
    pub fn from_error(error: &RelayError) -> Self {
        Self {
            code: error.error_code().to_string(),
            message: error.to_string(),
        }
    }
}

impl From<&RelayError> for ErrorResponse {
    fn from(error: &RelayError) -> Self {
        Self::from_error(error)
    }
}
