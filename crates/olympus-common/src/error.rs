//! Shared error taxonomy for the compile service.

use thiserror::Error;

/// Finer-grained classification of an infrastructure failure, carried
/// alongside the human-readable message so the worker's classification
/// logic does not rely purely on substring matching over `error` text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfraErrorKind {
    DockerUnavailable,
    ImageMissing,
    ClusterApiError,
    Base64Decode,
    Timeout,
    Other,
}

/// Main application error type used across the compile service.
#[derive(Error, Debug)]
pub enum AppError {
    /// Request failed structural or semantic validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// `language`/`compiler` pair does not appear in the loaded environment set.
    #[error("unsupported environment: {0}")]
    UnsupportedEnvironment(String),

    /// Decoded source exceeds the configured cap.
    #[error("source too large: {0}")]
    TooLarge(String),

    /// Resource not found (unknown job id).
    #[error("not found: {0}")]
    NotFound(String),

    /// Worker pool has no available slots.
    #[error("no workers available")]
    NoWorkersAvailable,

    /// Worker pool's bounded queue rejected the job.
    #[error("job queue is full")]
    QueueFull,

    /// Per-IP token bucket is empty.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// The sandbox backend could not run the job at all (as opposed to the
    /// compiled program exiting non-zero, which is not an error).
    #[error("compilation failed: {source}")]
    InfrastructureFailure {
        kind: InfraErrorKind,
        #[source]
        source: anyhow::Error,
    },

    /// Internal server error not covered by a more specific variant.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation(_) => 400,
            AppError::UnsupportedEnvironment(_) => 400,
            AppError::TooLarge(_) => 400,
            AppError::NotFound(_) => 404,
            AppError::NoWorkersAvailable => 429,
            AppError::QueueFull => 429,
            AppError::RateLimitExceeded => 429,
            AppError::InfrastructureFailure { .. } => 500,
            AppError::Internal(_) => 500,
        }
    }

    /// Returns the error code string for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::UnsupportedEnvironment(_) => "UNSUPPORTED_ENVIRONMENT",
            AppError::TooLarge(_) => "TOO_LARGE",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::NoWorkersAvailable => "NO_WORKERS_AVAILABLE",
            AppError::QueueFull => "QUEUE_FULL",
            AppError::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            AppError::InfrastructureFailure { .. } => "INFRASTRUCTURE_FAILURE",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn infrastructure(kind: InfraErrorKind, source: anyhow::Error) -> Self {
        AppError::InfrastructureFailure { kind, source }
    }
}

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;
