//! Snapshot job records and their lifecycle.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sitesnap_types::{CrawlParameters, JobFailure, JobState};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for a snapshot job.
pub type JobId = Uuid;

/// One submitted snapshot request.
///
/// Records are owned by the [`JobRegistry`](crate::JobRegistry); callers
/// receive copies taken under the registry lock.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Current lifecycle state.
    pub state: JobState,
    /// Crawl parameters fixed at submission.
    pub params: CrawlParameters,
    /// Private scratch directory for the crawl.
    #[serde(skip)]
    pub work_dir: PathBuf,
    /// Location of the finished archive. Set only in [`JobState::Done`].
    #[serde(skip)]
    pub artifact_path: Option<PathBuf>,
    /// Size of the finished archive in bytes.
    pub artifact_bytes: Option<u64>,
    /// Why the job failed. Set only in [`JobState::Error`].
    pub failure: Option<JobFailure>,
    /// Timestamp when the job was admitted.
    pub created_at: DateTime<Utc>,
    /// Timestamp when a worker picked the job up.
    pub started_at: Option<DateTime<Utc>>,
    /// Timestamp when the job reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
}

/// A requested change to a job's state.
#[derive(Debug, Clone)]
pub(crate) enum Transition {
    Start,
    Complete {
        artifact_path: PathBuf,
        artifact_bytes: u64,
    },
    Fail(JobFailure),
}

impl Transition {
    pub(crate) const fn target(&self) -> JobState {
        match self {
            Self::Start => JobState::Running,
            Self::Complete { .. } => JobState::Done,
            Self::Fail(_) => JobState::Error,
        }
    }
}

impl Job {
    pub(crate) fn new(id: JobId, params: CrawlParameters, work_dir: PathBuf) -> Self {
        Self {
            id,
            state: JobState::Queued,
            params,
            work_dir,
            artifact_path: None,
            artifact_bytes: None,
            failure: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Returns true if the job is in a terminal state.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Time spent running, or `None` if the job never started.
    #[must_use]
    pub fn run_time(&self) -> Option<Duration> {
        let started = self.started_at?;
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - started).to_std().ok()
    }

    /// Applies a transition, or leaves the record untouched and returns
    /// the state it was in if the move is not allowed.
    pub(crate) fn apply(&mut self, transition: Transition) -> Result<(), JobState> {
        let target = transition.target();
        if !self.state.can_transition_to(target) {
            return Err(self.state);
        }

        let now = Utc::now();
        match transition {
            Transition::Start => {
                self.started_at = Some(now);
            }
            Transition::Complete {
                artifact_path,
                artifact_bytes,
            } => {
                self.artifact_path = Some(artifact_path);
                self.artifact_bytes = Some(artifact_bytes);
                self.finished_at = Some(now);
            }
            Transition::Fail(failure) => {
                self.failure = Some(failure);
                self.finished_at = Some(now);
            }
        }
        self.state = target;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitesnap_types::ErrorKind;

    fn create_test_job() -> Job {
        let params = CrawlParameters::new("https://example.com", 1, 0.5, false).unwrap();
        Job::new(Uuid::new_v4(), params, PathBuf::from("/tmp/site_snap_test"))
    }

    fn complete() -> Transition {
        Transition::Complete {
            artifact_path: PathBuf::from("/tmp/site_snapshot_test.zip"),
            artifact_bytes: 42,
        }
    }

    #[test]
    fn test_new_job_is_queued() {
        let job = create_test_job();
        assert_eq!(job.state, JobState::Queued);
        assert!(!job.is_finished());
        assert!(job.artifact_path.is_none());
        assert!(job.failure.is_none());
        assert!(job.run_time().is_none());
    }

    #[test]
    fn test_successful_lifecycle() {
        let mut job = create_test_job();

        job.apply(Transition::Start).unwrap();
        assert_eq!(job.state, JobState::Running);
        assert!(job.started_at.is_some());
        assert!(job.finished_at.is_none());

        job.apply(complete()).unwrap();
        assert_eq!(job.state, JobState::Done);
        assert!(job.is_finished());
        assert_eq!(job.artifact_bytes, Some(42));
        assert!(job.artifact_path.is_some());
        assert!(job.failure.is_none());
        assert!(job.finished_at.is_some());
        assert!(job.run_time().is_some());
    }

    #[test]
    fn test_failed_lifecycle() {
        let mut job = create_test_job();
        job.apply(Transition::Start).unwrap();
        job.apply(Transition::Fail(JobFailure::new(
            ErrorKind::ProcessFailed,
            "fetcher exited with status 8",
        )))
        .unwrap();

        assert_eq!(job.state, JobState::Error);
        assert!(job.artifact_path.is_none());
        assert_eq!(
            job.failure.as_ref().map(|f| f.kind),
            Some(ErrorKind::ProcessFailed)
        );
    }

    #[test]
    fn test_illegal_transitions_leave_record_untouched() {
        let mut job = create_test_job();
        assert_eq!(job.apply(complete()), Err(JobState::Queued));
        assert_eq!(
            job.apply(Transition::Fail(JobFailure::new(ErrorKind::InternalError, "x"))),
            Err(JobState::Queued)
        );
        assert_eq!(job.state, JobState::Queued);
        assert!(job.finished_at.is_none());

        job.apply(Transition::Start).unwrap();
        assert_eq!(job.apply(Transition::Start), Err(JobState::Running));

        job.apply(complete()).unwrap();
        assert_eq!(
            job.apply(Transition::Fail(JobFailure::new(ErrorKind::InternalError, "x"))),
            Err(JobState::Done)
        );
        assert_eq!(job.state, JobState::Done);
        assert!(job.failure.is_none());
    }

    #[test]
    fn test_serialization_hides_paths() {
        let mut job = create_test_job();
        job.apply(Transition::Start).unwrap();
        job.apply(complete()).unwrap();

        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["state"], "done");
        assert!(json.get("work_dir").is_none());
        assert!(json.get("artifact_path").is_none());
    }
}
