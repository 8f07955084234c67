//! Route handlers.

use crate::{ApiError, AppState};
use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use sitesnap_daemon::{Job, JobCounts, JobId, artifact_file_name};
use sitesnap_types::{CrawlParameters, ErrorKind, JobState};
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub(crate) struct JobQuery {
    job_id: Option<String>,
}

impl JobQuery {
    fn parse(&self) -> Result<JobId, ApiError> {
        let raw = self
            .job_id
            .as_deref()
            .ok_or_else(|| ApiError::new(ErrorKind::InvalidInput, "job_id is required"))?;
        // A malformed id can never have been issued.
        Uuid::parse_str(raw.trim())
            .map_err(|_| ApiError::new(ErrorKind::UnknownJob, "unknown job id"))
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmitResponse {
    job_id: JobId,
}

#[derive(Debug, Serialize)]
pub(crate) struct StatusResponse {
    job_id: JobId,
    status: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
    jobs: JobCounts,
    capacity: usize,
}

/// `POST /download`: submit, wait, then stream the archive.
pub(crate) async fn download(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let config = state.supervisor.config();
    let params = CrawlParameters::from_json_slice(&body, &config.sync_defaults)?;
    let job = state.supervisor.submit(params).await?;

    let finished = state
        .supervisor
        .wait(job.id, config.sync_request_timeout)
        .await?
        .ok_or_else(|| {
            warn!(job_id = %job.id, "request deadline passed before job finished");
            ApiError::new(
                ErrorKind::TimeoutExceeded,
                "snapshot did not finish before the request deadline",
            )
            .with_job(job.id)
        })?;

    match finished.state {
        JobState::Done => stream_artifact(&state, finished).await,
        _ => Err(ApiError::from_failed_job(&finished)),
    }
}

/// `POST /jobs`: submit and return the job id.
pub(crate) async fn submit_job(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let params =
        CrawlParameters::from_json_slice(&body, &state.supervisor.config().async_defaults)?;
    let job = state.supervisor.submit(params).await?;

    Ok((StatusCode::ACCEPTED, Json(SubmitResponse { job_id: job.id })))
}

/// `GET /jobs/status?job_id=`
pub(crate) async fn job_status(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> Result<Json<StatusResponse>, ApiError> {
    let id = query.parse()?;
    let job = state.supervisor.registry().get(id).await?;

    Ok(Json(StatusResponse {
        job_id: job.id,
        status: job.state,
        error_kind: job.failure.as_ref().map(|f| f.kind),
        error: job.failure.map(|f| f.detail),
    }))
}

/// `GET /jobs/download?job_id=`
pub(crate) async fn download_job(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> Result<Response, ApiError> {
    let id = query.parse()?;
    let job = state.supervisor.registry().get(id).await?;

    match job.state {
        JobState::Done => stream_artifact(&state, job).await,
        JobState::Error => Err(ApiError::new(
            ErrorKind::NotReady,
            "job failed; no archive is available",
        )
        .with_job(id)),
        JobState::Queued | JobState::Running => Err(ApiError::new(
            ErrorKind::NotReady,
            format!("job is still {}", job.state),
        )
        .with_job(id)),
    }
}

/// `GET /health`
pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        jobs: state.supervisor.registry().counts().await,
        capacity: state.supervisor.config().capacity(),
    })
}

/// Streams a finished job's archive.
///
/// With reclaim on download, taking the record out of the registry decides
/// which request serves the archive; concurrent requests for the same job
/// see it as unknown. The archive is deleted once the file is open.
async fn stream_artifact(state: &AppState, job: Job) -> Result<Response, ApiError> {
    let supervisor = &state.supervisor;
    let reclaim = supervisor.config().reclaim_on_download;
    let job = if reclaim {
        supervisor.registry().remove_finished(job.id).await?
    } else {
        job
    };
    let id = job.id;
    let internal =
        || ApiError::new(ErrorKind::InternalError, "archive is unavailable").with_job(id);

    let path = job.artifact_path.as_ref().ok_or_else(internal)?;
    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(job_id = %id, "archive already removed");
            return Err(ApiError::new(ErrorKind::UnknownJob, "unknown job id"));
        }
        Err(e) => {
            error!(job_id = %id, error = %e, "failed to open archive");
            return Err(internal());
        }
    };

    if reclaim {
        if let Err(e) = supervisor.storage().remove_artifact(id) {
            warn!(job_id = %id, error = %e, "failed to delete downloaded archive");
        }
        debug!(job_id = %id, "job reclaimed");
    }

    let disposition = format!("attachment; filename=\"{}\"", artifact_file_name(id));
    let disposition = HeaderValue::try_from(disposition).map_err(|_| internal())?;

    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/zip"));
    headers.insert(CONTENT_DISPOSITION, disposition);
    if let Some(bytes) = job.artifact_bytes {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(bytes));
    }

    info!(job_id = %id, bytes = job.artifact_bytes, "archive served");
    Ok(response)
}
