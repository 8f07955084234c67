//! In-memory job registry.

use crate::job::Transition;
use crate::{Job, JobId, Storage};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use sitesnap_types::{CrawlParameters, ErrorKind, JobState};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{RwLock, watch};
use tracing::{debug, error};
use uuid::Uuid;

/// Errors returned by registry operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No job with this id exists.
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    /// The job has not reached a terminal state.
    #[error("job {id} is still {state}")]
    NotFinished {
        /// The job.
        id: JobId,
        /// Its current state.
        state: JobState,
    },

    /// The requested state change is not allowed.
    #[error("illegal transition for job {id}: {from} -> {to}")]
    IllegalTransition {
        /// The job.
        id: JobId,
        /// State it was in.
        from: JobState,
        /// State that was requested.
        to: JobState,
    },

    /// Too many jobs are queued or running.
    #[error("service at capacity ({active} of {limit} job slots in use)")]
    AtCapacity {
        /// Jobs currently queued or running.
        active: usize,
        /// Configured ceiling.
        limit: usize,
    },
}

impl RegistryError {
    /// Classifies this error for callers.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::JobNotFound(_) => ErrorKind::UnknownJob,
            Self::NotFinished { .. } => ErrorKind::NotReady,
            Self::IllegalTransition { .. } => ErrorKind::InternalError,
            Self::AtCapacity { .. } => ErrorKind::AtCapacity,
        }
    }
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Number of jobs in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    /// Jobs waiting for a worker.
    pub queued: usize,
    /// Jobs being fetched or packaged.
    pub running: usize,
    /// Jobs with an archive ready.
    pub done: usize,
    /// Jobs that failed.
    pub error: usize,
}

impl JobCounts {
    /// Jobs holding a capacity slot.
    #[must_use]
    pub const fn active(&self) -> usize {
        self.queued + self.running
    }

    /// Jobs in a terminal state.
    #[must_use]
    pub const fn finished(&self) -> usize {
        self.done + self.error
    }
}

/// How long finished jobs stay resolvable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Finished jobs older than this are evicted.
    pub max_age: Duration,
    /// At most this many finished jobs are kept, newest first.
    pub max_finished: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(60 * 60),
            max_finished: 256,
        }
    }
}

#[derive(Debug)]
struct Entry {
    job: Job,
    state_tx: watch::Sender<JobState>,
}

/// Concurrency-safe map from job id to job record.
///
/// Every read returns a copy taken under the lock, so a caller never sees
/// a record halfway through a transition. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    inner: Arc<RwLock<HashMap<JobId, Entry>>>,
}

impl JobRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits a new job in [`JobState::Queued`].
    ///
    /// The capacity check and the insert happen under one lock, so
    /// concurrent submissions cannot overshoot `capacity`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AtCapacity`] if `capacity` jobs are already
    /// queued or running.
    pub async fn create(
        &self,
        params: CrawlParameters,
        storage: &Storage,
        capacity: usize,
    ) -> Result<Job> {
        let mut jobs = self.inner.write().await;

        let active = jobs.values().filter(|e| !e.job.is_finished()).count();
        if active >= capacity {
            return Err(RegistryError::AtCapacity {
                active,
                limit: capacity,
            });
        }

        let mut id = Uuid::new_v4();
        while jobs.contains_key(&id) {
            id = Uuid::new_v4();
        }

        let job = Job::new(id, params, storage.work_dir(id));
        let (state_tx, _) = watch::channel(job.state);
        jobs.insert(
            id,
            Entry {
                job: job.clone(),
                state_tx,
            },
        );

        debug!(job_id = %id, url = job.params.target_url(), "job admitted");
        Ok(job)
    }

    /// Returns a copy of a job record.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::JobNotFound`] for unknown or evicted ids.
    pub async fn get(&self, id: JobId) -> Result<Job> {
        self.inner
            .read()
            .await
            .get(&id)
            .map(|e| e.job.clone())
            .ok_or(RegistryError::JobNotFound(id))
    }

    /// Returns copies of every record, newest first.
    pub async fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .inner
            .read()
            .await
            .values()
            .map(|e| e.job.clone())
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    /// Counts jobs by state.
    pub async fn counts(&self) -> JobCounts {
        let mut counts = JobCounts::default();
        for entry in self.inner.read().await.values() {
            match entry.job.state {
                JobState::Queued => counts.queued += 1,
                JobState::Running => counts.running += 1,
                JobState::Done => counts.done += 1,
                JobState::Error => counts.error += 1,
            }
        }
        counts
    }

    /// Subscribes to a job's state changes.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::JobNotFound`] for unknown ids.
    pub async fn subscribe(&self, id: JobId) -> Result<watch::Receiver<JobState>> {
        self.inner
            .read()
            .await
            .get(&id)
            .map(|e| e.state_tx.subscribe())
            .ok_or(RegistryError::JobNotFound(id))
    }

    /// Waits until a job reaches a terminal state and returns its record.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::JobNotFound`] if the job is unknown or is
    /// removed before finishing.
    pub async fn wait_finished(&self, id: JobId) -> Result<Job> {
        let mut rx = self.subscribe(id).await?;
        rx.wait_for(JobState::is_terminal)
            .await
            .map_err(|_| RegistryError::JobNotFound(id))?;
        self.get(id).await
    }

    /// Moves a job to a new state.
    ///
    /// Only the worker running a job calls this. A rejected transition
    /// leaves the record untouched and is logged as an error.
    pub(crate) async fn transition(&self, id: JobId, transition: Transition) -> Result<Job> {
        let mut jobs = self.inner.write().await;
        let entry = jobs.get_mut(&id).ok_or(RegistryError::JobNotFound(id))?;
        let to = transition.target();

        if let Err(from) = entry.job.apply(transition) {
            error!(job_id = %id, %from, %to, "rejected illegal job transition");
            return Err(RegistryError::IllegalTransition { id, from, to });
        }

        entry.state_tx.send_replace(to);
        debug!(job_id = %id, state = %to, "job transitioned");
        Ok(entry.job.clone())
    }

    /// Removes a finished job and returns its final record.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::JobNotFound`] for unknown ids and
    /// [`RegistryError::NotFinished`] for jobs still queued or running.
    pub async fn remove_finished(&self, id: JobId) -> Result<Job> {
        let mut jobs = self.inner.write().await;
        let entry = jobs.get(&id).ok_or(RegistryError::JobNotFound(id))?;
        if !entry.job.is_finished() {
            return Err(RegistryError::NotFinished {
                id,
                state: entry.job.state,
            });
        }
        jobs.remove(&id)
            .map(|e| e.job)
            .ok_or(RegistryError::JobNotFound(id))
    }

    /// Evicts finished jobs that fall outside `policy` as of `now`.
    ///
    /// Queued and running jobs are never evicted. Returns the evicted
    /// records so their artifacts can be deleted.
    pub async fn evict(&self, policy: RetentionPolicy, now: DateTime<Utc>) -> Vec<Job> {
        let max_age = TimeDelta::from_std(policy.max_age).unwrap_or(TimeDelta::MAX);
        let mut jobs = self.inner.write().await;

        let mut finished: Vec<(JobId, DateTime<Utc>)> = jobs
            .values()
            .filter(|e| e.job.is_finished())
            .map(|e| (e.job.id, e.job.finished_at.unwrap_or(e.job.created_at)))
            .collect();
        finished.sort_by(|a, b| b.1.cmp(&a.1));

        let expired: Vec<JobId> = finished
            .iter()
            .enumerate()
            .filter(|(rank, (_, at))| *rank >= policy.max_finished || now - *at > max_age)
            .map(|(_, (id, _))| *id)
            .collect();

        expired
            .into_iter()
            .filter_map(|id| jobs.remove(&id).map(|e| e.job))
            .collect()
    }
}
