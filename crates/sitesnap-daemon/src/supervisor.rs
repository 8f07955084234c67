//! Job execution: the worker pool and the fetch, quota, archive pipeline.

use crate::job::Transition;
use crate::registry::{JobRegistry, RegistryError};
use crate::{Job, JobId, ServiceConfig, Storage};
use chrono::Utc;
use sitesnap_archive::{Archiver, QuotaError, QuotaGuard};
use sitesnap_fetch::Fetcher;
use sitesnap_types::{CrawlParameters, ErrorKind, JobFailure};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Number of trailing fetcher output lines kept in failure logs.
const LOGGED_OUTPUT_LINES: usize = 20;

/// Runs admitted jobs on a bounded pool of workers.
///
/// Each job gets its own task that waits for a worker permit, runs the
/// fetcher in a private work directory, checks the disk quota, packs the
/// output and records the outcome. The work directory is removed on every
/// path before the job reaches a terminal state. Clones share the pool.
#[derive(Debug, Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    registry: JobRegistry,
    storage: Storage,
    fetcher: Arc<dyn Fetcher>,
    archiver: Archiver,
    quota: QuotaGuard,
    config: ServiceConfig,
    permits: Arc<Semaphore>,
}

/// What a successful pipeline leaves behind.
struct Completed {
    artifact_path: PathBuf,
    artifact_bytes: u64,
}

impl Supervisor {
    /// Creates a supervisor over the given registry, storage and fetcher.
    #[must_use]
    pub fn new(
        registry: JobRegistry,
        storage: Storage,
        fetcher: Arc<dyn Fetcher>,
        config: ServiceConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        Self {
            inner: Arc::new(Inner {
                registry,
                storage,
                fetcher,
                archiver: Archiver::new(),
                quota: QuotaGuard::new(config.max_output_bytes),
                config,
                permits,
            }),
        }
    }

    /// Returns the job registry.
    #[must_use]
    pub fn registry(&self) -> &JobRegistry {
        &self.inner.registry
    }

    /// Returns the storage layout.
    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.inner.storage
    }

    /// Returns the service configuration.
    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    /// Admits a job and schedules it for execution.
    ///
    /// Returns as soon as the job is registered; it runs in the
    /// background.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AtCapacity`] if the service already holds
    /// as many queued and running jobs as it allows.
    pub async fn submit(&self, params: CrawlParameters) -> Result<Job, RegistryError> {
        let job = self
            .inner
            .registry
            .create(params, &self.inner.storage, self.inner.config.capacity())
            .await?;

        info!(
            job_id = %job.id,
            url = job.params.target_url(),
            depth = job.params.depth(),
            "job submitted"
        );

        let span = info_span!("job", job_id = %job.id);
        tokio::spawn(run_job(Arc::clone(&self.inner), job.id).instrument(span));
        Ok(job)
    }

    /// Waits up to `timeout` for a job to finish.
    ///
    /// Returns `Ok(None)` if the deadline passes first; the job keeps
    /// running.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::JobNotFound`] for unknown ids.
    pub async fn wait(&self, id: JobId, timeout: Duration) -> Result<Option<Job>, RegistryError> {
        match tokio::time::timeout(timeout, self.inner.registry.wait_finished(id)).await {
            Ok(job) => job.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Removes a finished job and deletes its archive.
    ///
    /// Callers that still need the archive must open it first.
    ///
    /// # Errors
    ///
    /// Returns an error if the job is unknown or not finished.
    pub async fn reclaim(&self, id: JobId) -> Result<Job, RegistryError> {
        let job = self.inner.registry.remove_finished(id).await?;
        if let Err(e) = self.inner.storage.remove_artifact(id) {
            warn!(job_id = %id, error = %e, "failed to delete reclaimed artifact");
        }
        debug!(job_id = %id, "job reclaimed");
        Ok(job)
    }

    /// Evicts finished jobs past the retention policy and deletes their
    /// archives. Returns the number of jobs evicted.
    pub async fn reap(&self) -> usize {
        let evicted = self
            .inner
            .registry
            .evict(self.inner.config.retention, Utc::now())
            .await;

        for job in &evicted {
            if let Err(e) = self.inner.storage.remove_artifact(job.id) {
                warn!(job_id = %job.id, error = %e, "failed to delete evicted artifact");
            }
        }

        if !evicted.is_empty() {
            info!(evicted = evicted.len(), "evicted expired jobs");
        }
        evicted.len()
    }

    /// Spawns a task that calls [`reap`](Self::reap) every `period`.
    pub fn spawn_reaper(&self, period: Duration) -> JoinHandle<()> {
        let supervisor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                supervisor.reap().await;
            }
        })
    }
}

/// Drives one job from `Queued` to a terminal state.
async fn run_job(inner: Arc<Inner>, id: JobId) {
    let permit = Arc::clone(&inner.permits).acquire_owned().await;

    let job = match inner.registry.transition(id, Transition::Start).await {
        Ok(job) => job,
        Err(e) => {
            error!(error = %e, "job could not be started");
            return;
        }
    };
    debug!("worker acquired");

    let outcome = match permit {
        Ok(_) => {
            // Run the pipeline in its own task so a panic is contained.
            let pipeline = tokio::spawn(execute(Arc::clone(&inner), job).in_current_span());
            match pipeline.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "job worker panicked");
                    Err(JobFailure::new(
                        ErrorKind::InternalError,
                        "job worker stopped unexpectedly",
                    ))
                }
            }
        }
        Err(_) => Err(JobFailure::new(
            ErrorKind::InternalError,
            "worker pool is shut down",
        )),
    };

    remove_work_dir(&inner, id).await;

    let transition = match outcome {
        Ok(done) => {
            info!(artifact_bytes = done.artifact_bytes, "job done");
            Transition::Complete {
                artifact_path: done.artifact_path,
                artifact_bytes: done.artifact_bytes,
            }
        }
        Err(failure) => {
            warn!(kind = %failure.kind, detail = %failure.detail, "job failed");
            Transition::Fail(failure)
        }
    };

    record_outcome(&inner, id, transition).await;
}

/// Applies a job's terminal transition.
///
/// If the registry rejects it the archive is deleted, since no record will
/// ever point at it.
async fn record_outcome(inner: &Inner, id: JobId, transition: Transition) {
    if let Err(e) = inner.registry.transition(id, transition).await {
        error!(job_id = %id, error = %e, "job outcome could not be recorded");
        if let Err(e) = inner.storage.remove_artifact(id) {
            warn!(job_id = %id, error = %e, "failed to delete unrecorded artifact");
        }
    }
}

/// Fetch, quota check and archive for one running job.
async fn execute(inner: Arc<Inner>, job: Job) -> Result<Completed, JobFailure> {
    let work_dir = inner.storage.create_work_dir(job.id).map_err(|e| {
        error!(error = %e, "failed to create work directory");
        JobFailure::new(ErrorKind::InternalError, "failed to allocate a work directory")
    })?;

    let limit = inner.config.max_duration;
    let backstop = limit.saturating_add(inner.config.kill_grace);
    let fetch = inner.fetcher.fetch(&job.params, &work_dir, limit);

    match tokio::time::timeout(backstop, fetch).await {
        Ok(Ok(outcome)) => {
            debug!(elapsed_ms = outcome.elapsed.as_millis(), "fetch finished");
        }
        Ok(Err(e)) => {
            warn!(
                error = %e,
                output = %tail_lines(e.output().unwrap_or_default(), LOGGED_OUTPUT_LINES),
                "fetch failed"
            );
            return Err(JobFailure::new(e.kind(), e.client_detail()));
        }
        Err(_) => {
            warn!(limit_secs = limit.as_secs(), "fetcher ignored its deadline");
            return Err(JobFailure::new(
                ErrorKind::TimeoutExceeded,
                format!("fetch exceeded the {}s duration limit", limit.as_secs()),
            ));
        }
    }

    let quota = inner.quota;
    let archiver = inner.archiver;
    let dest = inner.storage.artifact_path(job.id);

    let packaged = tokio::task::spawn_blocking(move || {
        let size = quota.check(&work_dir).map_err(|e| {
            match &e {
                QuotaError::Exceeded { .. } => warn!(error = %e, "quota exceeded"),
                QuotaError::Measure { .. } => error!(error = %e, "quota check failed"),
            }
            let detail = match e {
                QuotaError::Exceeded { .. } => e.to_string(),
                QuotaError::Measure { .. } => "failed to measure download size".to_string(),
            };
            JobFailure::new(e.kind(), detail)
        })?;
        debug!(bytes = size, "quota check passed");

        archiver.archive(&work_dir, &dest).map_err(|e| {
            error!(error = %e, "archive failed");
            JobFailure::new(e.kind(), "failed to package the download")
        })
    })
    .await
    .map_err(|e| {
        error!(error = %e, "packaging task failed");
        JobFailure::new(ErrorKind::InternalError, "packaging stopped unexpectedly")
    })??;

    Ok(Completed {
        artifact_path: packaged.path,
        artifact_bytes: packaged.archive_bytes,
    })
}

async fn remove_work_dir(inner: &Arc<Inner>, id: JobId) {
    let storage = inner.storage.clone();
    let removed = tokio::task::spawn_blocking(move || storage.remove_work_dir(id)).await;
    match removed {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "failed to remove work directory"),
        Err(e) => error!(error = %e, "work directory cleanup task failed"),
    }
}

fn tail_lines(output: &str, lines: usize) -> String {
    let all: Vec<&str> = output.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sitesnap_fetch::{FetchError, FetchOutcome};
    use sitesnap_types::JobState;
    use std::fs::File;
    use std::io::Read;
    use std::path::Path;
    use tempfile::TempDir;
    use tokio::sync::Notify;
    use zip::ZipArchive;

    #[derive(Debug)]
    enum Behavior {
        /// Writes `index.html` containing the target URL plus `padding` bytes.
        Mirror { padding: usize },
        /// Exits with the given status.
        Exit(i32),
        /// Reports its own deadline.
        Timeout,
        /// Never returns.
        Hang,
        /// Panics mid-fetch.
        Panic,
        /// Writes a page once released.
        Gate(Arc<Notify>),
    }

    #[derive(Debug)]
    struct FakeFetcher(Behavior);

    #[async_trait]
    impl Fetcher for FakeFetcher {
        async fn fetch(
            &self,
            params: &CrawlParameters,
            work_dir: &Path,
            limit: Duration,
        ) -> Result<FetchOutcome, FetchError> {
            match &self.0 {
                Behavior::Mirror { padding } => {
                    let site = work_dir.join("example.com");
                    tokio::fs::create_dir_all(&site).await?;
                    tokio::fs::write(site.join("index.html"), params.target_url()).await?;
                    if *padding > 0 {
                        tokio::fs::write(site.join("big.bin"), vec![0u8; *padding]).await?;
                    }
                    Ok(FetchOutcome::default())
                }
                Behavior::Exit(code) => Err(FetchError::ProcessFailed {
                    code: Some(*code),
                    output: "ERROR 404: Not Found.\n/secret/path".to_string(),
                }),
                Behavior::Timeout => Err(FetchError::TimeoutExceeded {
                    limit,
                    output: String::new(),
                }),
                Behavior::Hang => {
                    std::future::pending::<()>().await;
                    Ok(FetchOutcome::default())
                }
                Behavior::Panic => panic!("fetcher blew up"),
                Behavior::Gate(notify) => {
                    notify.notified().await;
                    tokio::fs::write(work_dir.join("index.html"), "gated").await?;
                    Ok(FetchOutcome::default())
                }
            }
        }
    }

    fn test_config() -> ServiceConfig {
        ServiceConfig {
            max_duration: Duration::from_millis(200),
            kill_grace: Duration::from_millis(100),
            ..ServiceConfig::default()
        }
    }

    fn setup(behavior: Behavior, config: ServiceConfig) -> (TempDir, Supervisor) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path().to_path_buf()).unwrap();
        let supervisor = Supervisor::new(
            JobRegistry::new(),
            storage,
            Arc::new(FakeFetcher(behavior)),
            config,
        );
        (temp_dir, supervisor)
    }

    fn params(url: &str) -> CrawlParameters {
        CrawlParameters::new(url, 1, 0.0, false).unwrap()
    }

    async fn run_to_end(supervisor: &Supervisor, url: &str) -> Job {
        let job = supervisor.submit(params(url)).await.unwrap();
        supervisor
            .wait(job.id, Duration::from_secs(10))
            .await
            .unwrap()
            .expect("job did not finish in time")
    }

    fn read_entry(path: &Path, name: &str) -> String {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut body = String::new();
        archive
            .by_name(name)
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        body
    }

    #[tokio::test]
    async fn test_successful_job_produces_archive() {
        let (_dir, supervisor) = setup(Behavior::Mirror { padding: 0 }, test_config());

        let job = run_to_end(&supervisor, "https://example.com").await;

        assert_eq!(job.state, JobState::Done);
        assert!(job.failure.is_none());
        let artifact = job.artifact_path.clone().unwrap();
        assert_eq!(artifact, supervisor.storage().artifact_path(job.id));
        assert!(artifact.is_file());
        assert!(job.artifact_bytes.unwrap() > 0);
        assert_eq!(
            read_entry(&artifact, "example.com/index.html"),
            "https://example.com"
        );
        assert!(!job.work_dir.exists());
    }

    #[tokio::test]
    async fn test_quota_exceeded() {
        let config = ServiceConfig {
            max_output_bytes: 100,
            ..test_config()
        };
        let (_dir, supervisor) = setup(Behavior::Mirror { padding: 1000 }, config);

        let job = run_to_end(&supervisor, "https://example.com").await;

        assert_eq!(job.state, JobState::Error);
        assert_eq!(job.failure.as_ref().unwrap().kind, ErrorKind::QuotaExceeded);
        assert!(job.artifact_path.is_none());
        assert!(!supervisor.storage().artifact_path(job.id).exists());
        assert!(!job.work_dir.exists());
    }

    #[tokio::test]
    async fn test_process_failure_hides_output() {
        let (_dir, supervisor) = setup(Behavior::Exit(8), test_config());

        let job = run_to_end(&supervisor, "https://example.com").await;

        let failure = job.failure.unwrap();
        assert_eq!(job.state, JobState::Error);
        assert_eq!(failure.kind, ErrorKind::ProcessFailed);
        assert!(failure.detail.contains('8'));
        assert!(!failure.detail.contains("/secret/path"));
        assert!(!job.work_dir.exists());
    }

    #[tokio::test]
    async fn test_fetcher_timeout() {
        let (_dir, supervisor) = setup(Behavior::Timeout, test_config());

        let job = run_to_end(&supervisor, "https://example.com").await;

        assert_eq!(job.state, JobState::Error);
        assert_eq!(job.failure.unwrap().kind, ErrorKind::TimeoutExceeded);
        assert!(!job.work_dir.exists());
    }

    #[tokio::test]
    async fn test_hung_fetcher_hits_backstop() {
        let (_dir, supervisor) = setup(Behavior::Hang, test_config());

        let job = run_to_end(&supervisor, "https://example.com").await;

        assert_eq!(job.state, JobState::Error);
        assert_eq!(job.failure.unwrap().kind, ErrorKind::TimeoutExceeded);
        assert!(!job.work_dir.exists());
    }

    #[tokio::test]
    async fn test_unbounded_duration_limit() {
        let config = ServiceConfig {
            max_duration: Duration::MAX,
            ..test_config()
        };
        let (_dir, supervisor) = setup(Behavior::Mirror { padding: 0 }, config);

        let job = run_to_end(&supervisor, "https://example.com").await;
        assert_eq!(job.state, JobState::Done);
    }

    #[tokio::test]
    async fn test_panic_becomes_internal_error() {
        let (_dir, supervisor) = setup(Behavior::Panic, test_config());

        let job = run_to_end(&supervisor, "https://example.com").await;

        assert_eq!(job.state, JobState::Error);
        assert_eq!(job.failure.unwrap().kind, ErrorKind::InternalError);
        assert!(!job.work_dir.exists());
    }

    #[tokio::test]
    async fn test_state_moves_forward_only() {
        let gate = Arc::new(Notify::new());
        let (_dir, supervisor) = setup(Behavior::Gate(Arc::clone(&gate)), test_config());

        let job = supervisor.submit(params("https://example.com")).await.unwrap();
        assert_eq!(job.state, JobState::Queued);

        let mut rx = supervisor.registry().subscribe(job.id).await.unwrap();
        rx.wait_for(|s| *s == JobState::Running).await.unwrap();
        assert_eq!(
            supervisor.registry().get(job.id).await.unwrap().state,
            JobState::Running
        );

        gate.notify_one();
        let finished = supervisor
            .wait(job.id, Duration::from_secs(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(finished.state, JobState::Done);
        assert!(finished.started_at.unwrap() >= finished.created_at);
        assert!(finished.finished_at.unwrap() >= finished.started_at.unwrap());
    }

    #[tokio::test]
    async fn test_jobs_wait_for_a_worker() {
        let gate = Arc::new(Notify::new());
        let config = ServiceConfig {
            max_concurrent_jobs: 1,
            ..test_config()
        };
        let (_dir, supervisor) = setup(Behavior::Gate(Arc::clone(&gate)), config);

        let first = supervisor.submit(params("https://a.example")).await.unwrap();
        let second = supervisor.submit(params("https://b.example")).await.unwrap();

        let mut rx = supervisor.registry().subscribe(first.id).await.unwrap();
        rx.wait_for(|s| *s == JobState::Running).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            supervisor.registry().get(second.id).await.unwrap().state,
            JobState::Queued
        );

        gate.notify_one();
        let mut rx = supervisor.registry().subscribe(second.id).await.unwrap();
        rx.wait_for(|s| *s == JobState::Running).await.unwrap();
        gate.notify_one();

        for id in [first.id, second.id] {
            let job = supervisor
                .wait(id, Duration::from_secs(10))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(job.state, JobState::Done);
        }
    }

    #[tokio::test]
    async fn test_admission_limit() {
        let config = ServiceConfig {
            max_concurrent_jobs: 1,
            max_queued_jobs: 1,
            max_duration: Duration::from_secs(60),
            ..test_config()
        };
        let (_dir, supervisor) = setup(Behavior::Hang, config);

        supervisor.submit(params("https://a.example")).await.unwrap();
        supervisor.submit(params("https://b.example")).await.unwrap();

        let err = supervisor
            .submit(params("https://c.example"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AtCapacity);
    }

    #[tokio::test]
    async fn test_concurrent_jobs_are_isolated() {
        let (_dir, supervisor) = setup(Behavior::Mirror { padding: 0 }, test_config());

        let (a, b) = tokio::join!(
            run_to_end(&supervisor, "https://a.example"),
            run_to_end(&supervisor, "https://b.example"),
        );

        assert_ne!(a.id, b.id);
        assert_ne!(a.artifact_path, b.artifact_path);
        assert_eq!(
            read_entry(a.artifact_path.as_ref().unwrap(), "example.com/index.html"),
            "https://a.example"
        );
        assert_eq!(
            read_entry(b.artifact_path.as_ref().unwrap(), "example.com/index.html"),
            "https://b.example"
        );
    }

    #[tokio::test]
    async fn test_wait_deadline_leaves_job_running() {
        let config = ServiceConfig {
            max_duration: Duration::from_secs(60),
            ..test_config()
        };
        let (_dir, supervisor) = setup(Behavior::Hang, config);

        let job = supervisor.submit(params("https://example.com")).await.unwrap();
        let waited = supervisor
            .wait(job.id, Duration::from_millis(50))
            .await
            .unwrap();

        assert!(waited.is_none());
        assert!(!supervisor.registry().get(job.id).await.unwrap().is_finished());
    }

    #[tokio::test]
    async fn test_reclaim_removes_record_and_archive() {
        let (_dir, supervisor) = setup(Behavior::Mirror { padding: 0 }, test_config());
        let job = run_to_end(&supervisor, "https://example.com").await;
        let artifact = job.artifact_path.unwrap();

        supervisor.reclaim(job.id).await.unwrap();

        assert!(!artifact.exists());
        assert_eq!(
            supervisor.registry().get(job.id).await.unwrap_err().kind(),
            ErrorKind::UnknownJob
        );
    }

    #[tokio::test]
    async fn test_reap_applies_retention() {
        let config = ServiceConfig {
            retention: crate::RetentionPolicy {
                max_age: Duration::from_secs(3600),
                max_finished: 0,
            },
            ..test_config()
        };
        let (_dir, supervisor) = setup(Behavior::Mirror { padding: 0 }, config);
        let job = run_to_end(&supervisor, "https://example.com").await;
        let artifact = job.artifact_path.unwrap();

        assert_eq!(supervisor.reap().await, 1);
        assert!(!artifact.exists());
        assert!(supervisor.registry().get(job.id).await.is_err());
        assert_eq!(supervisor.reap().await, 0);
    }

    #[tokio::test]
    async fn test_rejected_outcome_discards_archive() {
        let (_dir, supervisor) = setup(Behavior::Mirror { padding: 0 }, test_config());
        let job = run_to_end(&supervisor, "https://example.com").await;
        let artifact = job.artifact_path.unwrap();
        assert!(artifact.exists());

        let failure = JobFailure::new(ErrorKind::InternalError, "late failure");
        record_outcome(&supervisor.inner, job.id, Transition::Fail(failure)).await;

        assert!(!artifact.exists());
        let job = supervisor.registry().get(job.id).await.unwrap();
        assert_eq!(job.state, JobState::Done);
        assert!(job.failure.is_none());
    }

    #[test]
    fn test_tail_lines() {
        assert_eq!(tail_lines("a\nb\nc\n", 2), "b\nc");
        assert_eq!(tail_lines("a", 5), "a");
        assert_eq!(tail_lines("", 5), "");
    }
}
