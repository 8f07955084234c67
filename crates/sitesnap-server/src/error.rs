//! Mapping from failures to HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use sitesnap_daemon::{Job, JobId, RegistryError};
use sitesnap_types::{ErrorKind, ParamsError};
use thiserror::Error;
use tracing::debug;

/// A failure reported to an API client.
///
/// The message is always safe to show: it never contains server paths or
/// crawler output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
    job_id: Option<JobId>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<JobId>,
}

impl ApiError {
    /// Creates an error of the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            job_id: None,
        }
    }

    /// Attaches the id of the job the error concerns.
    #[must_use]
    pub const fn with_job(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    /// Builds the error for a job that finished in `error`.
    #[must_use]
    pub fn from_failed_job(job: &Job) -> Self {
        let error = job.failure.as_ref().map_or_else(
            || Self::new(ErrorKind::InternalError, "job failed"),
            |failure| Self::new(failure.kind, failure.detail.clone()),
        );
        error.with_job(job.id)
    }

    /// Returns the error classification.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the job id, if a job was created.
    #[must_use]
    pub const fn job_id(&self) -> Option<JobId> {
        self.job_id
    }

    /// Returns the HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        status_for(self.kind)
    }
}

/// HTTP status code for an error kind.
#[must_use]
pub const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput | ErrorKind::NotReady => StatusCode::BAD_REQUEST,
        ErrorKind::UnknownJob => StatusCode::NOT_FOUND,
        ErrorKind::QuotaExceeded => StatusCode::PAYLOAD_TOO_LARGE,
        ErrorKind::TimeoutExceeded => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::AtCapacity => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::ProcessFailed | ErrorKind::ArchiveFailed | ErrorKind::InternalError => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<ParamsError> for ApiError {
    fn from(e: ParamsError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::JobNotFound(_) => Self::new(ErrorKind::UnknownJob, "unknown job id"),
            RegistryError::NotFinished { id, state } => {
                Self::new(ErrorKind::NotReady, format!("job is still {state}")).with_job(id)
            }
            RegistryError::AtCapacity { .. } => Self::new(
                ErrorKind::AtCapacity,
                "service is at capacity, try again later",
            ),
            RegistryError::IllegalTransition { id, .. } => {
                Self::new(ErrorKind::InternalError, "internal error").with_job(id)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        debug!(%status, kind = %self.kind, job_id = ?self.job_id, "request failed");

        let body = ErrorBody {
            error: &self.message,
            job_id: self.job_id,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitesnap_types::JobState;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::InvalidInput), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::NotReady), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::UnknownJob), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(ErrorKind::QuotaExceeded),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            status_for(ErrorKind::TimeoutExceeded),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(ErrorKind::AtCapacity),
            StatusCode::SERVICE_UNAVAILABLE
        );
        for kind in [
            ErrorKind::ProcessFailed,
            ErrorKind::ArchiveFailed,
            ErrorKind::InternalError,
        ] {
            assert_eq!(status_for(kind), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[test]
    fn test_from_registry_error() {
        let id = Uuid::new_v4();

        let err = ApiError::from(RegistryError::JobNotFound(id));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.job_id(), None);

        let err = ApiError::from(RegistryError::NotFinished {
            id,
            state: JobState::Running,
        });
        assert_eq!(err.kind(), ErrorKind::NotReady);
        assert_eq!(err.job_id(), Some(id));
        assert_eq!(err.to_string(), "job is still running");

        let err = ApiError::from(RegistryError::AtCapacity {
            active: 20,
            limit: 20,
        });
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_from_params_error() {
        let err = ApiError::from(ParamsError::MissingUrl);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
