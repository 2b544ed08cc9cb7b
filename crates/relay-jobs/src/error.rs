//! Job and queue error types.

use relay_core::RelayError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for job execution.
pub type JobResult<T> = Result<T, JobError>;

/// Classification of a failed job, recorded on the job and used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    AudioDownloadError,
    AudioConversionError,
    TranscriptionError,
    MessagingError,
    InvalidPayload,
    Unexpected,
    HandlerNotFound,
    Timeout,
}

impl FailureKind {
    /// Returns the snake_case label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AudioDownloadError => "audio_download_error",
            Self::AudioConversionError => "audio_conversion_error",
            Self::TranscriptionError => "transcription_error",
            Self::MessagingError => "messaging_error",
            Self::InvalidPayload => "invalid_payload",
            Self::Unexpected => "unexpected",
            Self::HandlerNotFound => "handler_not_found",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a failed job execution.
#[derive(Debug, Error)]
pub enum JobError {
    /// Media could not be fetched.
    #[error("Audio download failed: {0}")]
    AudioDownload(String),

    /// Media could not be transcoded.
    #[error("Audio conversion failed: {0}")]
    AudioConversion(String),

    /// Speech-to-text or translation failed.
    #[error("Transcription failed: {0}")]
    Transcription(String),

    /// The result reply could not be sent.
    #[error("Messaging failed: {0}")]
    Messaging(String),

    /// The stored payload does not match the handler's payload type.
    #[error("Invalid job payload: {0}")]
    InvalidPayload(String),

    /// Unclassified failure, including panics inside the handler.
    #[error("Unexpected error: {0}")]
    Unexpected(String),

    /// No handler is registered for the job's task type.
    #[error("No handler registered for task type '{0}'")]
    HandlerNotFound(String),

    /// The handler did not finish within the queue's task timeout.
    #[error("Job timed out after {0:?}")]
    Timeout(Duration),
}

impl JobError {
    /// Returns the failure classification.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::AudioDownload(_) => FailureKind::AudioDownloadError,
            Self::AudioConversion(_) => FailureKind::AudioConversionError,
            Self::Transcription(_) => FailureKind::TranscriptionError,
            Self::Messaging(_) => FailureKind::MessagingError,
            Self::InvalidPayload(_) => FailureKind::InvalidPayload,
            Self::Unexpected(_) => FailureKind::Unexpected,
            Self::HandlerNotFound(_) => FailureKind::HandlerNotFound,
            Self::Timeout(_) => FailureKind::Timeout,
        }
    }

    /// Returns true for the failures the processing pipeline classifies
    /// itself, as opposed to unexpected ones.
    #[must_use]
    pub const fn is_classified(&self) -> bool {
        matches!(
            self,
            Self::AudioDownload(_) | Self::AudioConversion(_) | Self::Transcription(_)
        )
    }
}

impl From<serde_json::Error> for JobError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidPayload(err.to_string())
    }
}

/// Rejection of a queue definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueConfigError {
    /// A queue with this name already exists.
    #[error("Queue '{0}' already exists")]
    DuplicateQueue(String),

    /// A field is out of range.
    #[error("Invalid queue configuration: {field} {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Rejection of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// No queue with this name.
    #[error("Queue '{0}' not found")]
    QueueNotFound(String),

    /// The queue's circuit breaker is open.
    #[error("Circuit breaker open for queue '{0}'")]
    CircuitOpen(String),

    /// Pending plus running jobs reached the queue's depth limit.
    #[error("Queue '{queue}' is full ({depth} jobs)")]
    QueueFull { queue: String, depth: usize },

    /// The manager is shutting down.
    #[error("Queue manager is shutting down")]
    ShuttingDown,

    /// The typed payload could not be serialised.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl SubmitError {
    /// Returns a short label for logs and metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::QueueNotFound(_) => "queue_not_found",
            Self::CircuitOpen(_) => "circuit_open",
            Self::QueueFull { .. } => "queue_full",
            Self::ShuttingDown => "shutting_down",
            Self::InvalidPayload(_) => "invalid_payload",
        }
    }

    /// Returns true when the rejection is temporary back-pressure rather than
    /// a caller mistake.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::CircuitOpen(_) | Self::QueueFull { .. } | Self::ShuttingDown
        )
    }
}

impl From<QueueConfigError> for RelayError {
    fn from(err: QueueConfigError) -> Self {
        match err {
            QueueConfigError::DuplicateQueue(_) => RelayError::Conflict(err.to_string()),
            QueueConfigError::InvalidField { .. } => RelayError::Configuration(err.to_string()),
        }
    }
}

impl From<SubmitError> for RelayError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::QueueNotFound(name) => RelayError::not_found("Queue", name),
            SubmitError::CircuitOpen(name) => RelayError::CircuitBreakerOpen(name),
            SubmitError::QueueFull { .. } | SubmitError::ShuttingDown => {
                RelayError::ServiceUnavailable(err.to_string())
            }
            SubmitError::InvalidPayload(msg) => RelayError::Validation(msg),
        }
    }
}
