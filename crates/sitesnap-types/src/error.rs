//! Error types for sitesnap.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for parameter validation.
pub type Result<T> = std::result::Result<T, ParamsError>;

/// Classification of every failure the service can report.
///
/// Job-level kinds are recorded on jobs that end in the error state;
/// request-level kinds are only ever returned to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad or missing URL or crawl parameters.
    InvalidInput,
    /// The fetch ran past the configured duration ceiling.
    TimeoutExceeded,
    /// The fetcher process could not be started or exited unsuccessfully.
    ProcessFailed,
    /// The captured output exceeded the configured size ceiling.
    QuotaExceeded,
    /// The output directory could not be packaged.
    ArchiveFailed,
    /// No job exists with the requested id.
    UnknownJob,
    /// The artifact was requested before the job finished successfully.
    NotReady,
    /// The service is at capacity and refused a new job.
    AtCapacity,
    /// Any other failure caught by the supervisor.
    InternalError,
}

impl ErrorKind {
    /// Returns the kind as a string identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::TimeoutExceeded => "timeout_exceeded",
            Self::ProcessFailed => "process_failed",
            Self::QuotaExceeded => "quota_exceeded",
            Self::ArchiveFailed => "archive_failed",
            Self::UnknownJob => "unknown_job",
            Self::NotReady => "not_ready",
            Self::AtCapacity => "at_capacity",
            Self::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal failure recorded on a job.
///
/// The detail is shown to clients, so it must never carry filesystem paths
/// or raw fetcher output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub detail: String,
}

impl JobFailure {
    /// Creates a new failure record.
    #[must_use]
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

/// Errors raised while validating a crawl request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamsError {
    /// The request body is not valid JSON.
    #[error("request body is not valid JSON: {0}")]
    MalformedBody(String),

    /// The request body is JSON but not an object.
    #[error("request body must be a JSON object")]
    NotAnObject,

    /// The `url` field is missing or empty.
    #[error("send JSON {{\"url\":\"https://example.com\", \"depth\":2, \"wait\":0.5, \"obey_robots\":false}}")]
    MissingUrl,

    /// The `url` field does not use an accepted scheme.
    #[error("url must start with http:// or https://")]
    UnsupportedScheme,

    /// The `url` field contains whitespace or control characters, or has no host.
    #[error("url is malformed")]
    MalformedUrl,

    /// The `depth` field is not a non-negative integer.
    #[error("depth must be a non-negative integer, got {0}")]
    InvalidDepth(String),

    /// The `wait` field is not a non-negative number.
    #[error("wait must be a non-negative number of seconds, got {0}")]
    InvalidWait(String),

    /// The `obey_robots` field is not a boolean.
    #[error("obey_robots must be a boolean, got {0}")]
    InvalidObeyRobots(String),
}

impl ParamsError {
    /// Every validation failure is an [`ErrorKind::InvalidInput`].
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidInput
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::QuotaExceeded).unwrap();
        assert_eq!(json, "\"quota_exceeded\"");

        let parsed: ErrorKind = serde_json::from_str("\"timeout_exceeded\"").unwrap();
        assert_eq!(parsed, ErrorKind::TimeoutExceeded);
    }

    #[test]
    fn test_error_kind_display_matches_serde() {
        for kind in [
            ErrorKind::InvalidInput,
            ErrorKind::TimeoutExceeded,
            ErrorKind::ProcessFailed,
            ErrorKind::QuotaExceeded,
            ErrorKind::ArchiveFailed,
            ErrorKind::UnknownJob,
            ErrorKind::NotReady,
            ErrorKind::AtCapacity,
            ErrorKind::InternalError,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json.trim_matches('"'), kind.to_string());
        }
    }

    #[test]
    fn test_job_failure_display() {
        let failure = JobFailure::new(ErrorKind::ProcessFailed, "fetcher exited with status 8");
        assert_eq!(
            failure.to_string(),
            "process_failed: fetcher exited with status 8"
        );
    }
}
