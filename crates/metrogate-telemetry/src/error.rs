//! Error types for the telemetry pipeline and backends.

use thiserror::Error;

/// Result type alias for telemetry operations other than writes.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Failure of a single backend write or probe.
///
/// These never reach producers: the pipeline writer retries or drops the
/// batch and records the outcome in its statistics.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TelemetryWriteError {
    /// The backend could not be reached (connection refused, DNS, reset).
    #[error("Backend unreachable: {message}")]
    BackendUnreachable { message: String },

    /// The backend answered with a non-success status.
    #[error("Write rejected with status {status}: {body}")]
    WriteRejected { status: u16, body: String },

    /// The write did not finish within the hard timeout.
    #[error("Write timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
}

impl TelemetryWriteError {
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::BackendUnreachable {
            message: message.into(),
        }
    }

    pub fn rejected(status: u16, body: impl Into<String>) -> Self {
        Self::WriteRejected {
            status,
            body: body.into(),
        }
    }

    /// Whether the same batch may succeed later.
    ///
    /// Client errors (4xx other than 429) mean the batch itself is malformed
    /// or unauthorized for the bucket; resending it would fail forever.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::BackendUnreachable { .. } | Self::Timeout { .. } => true,
            Self::WriteRejected { status, .. } => *status == 429 || !(400..500).contains(status),
        }
    }
}

/// Errors for point construction, configuration and history queries.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Invalid point: {0}")]
    InvalidPoint(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Query failed with status {status}: {body}")]
    QueryFailed { status: u16, body: String },

    #[error("Malformed query response: {0}")]
    MalformedResponse(String),

    #[error(transparent)]
    Write(#[from] TelemetryWriteError),
}
