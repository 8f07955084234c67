//! Deployer-controlled limits and defaults.

use crate::RetentionPolicy;
use sitesnap_types::CrawlDefaults;
use std::time::Duration;

/// Limits and defaults for the job engine.
///
/// None of these are exposed to callers; request fields can only pick
/// values within what the deployer allows.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Wall-clock ceiling for one fetch.
    pub max_duration: Duration,
    /// Extra time granted past `max_duration` before the supervisor
    /// abandons a fetcher that ignored its deadline.
    pub kill_grace: Duration,
    /// Ceiling on a job's captured output, in bytes.
    pub max_output_bytes: u64,
    /// Defaults for the blocking submit-and-wait mode.
    pub sync_defaults: CrawlDefaults,
    /// Defaults for the submit-and-poll mode.
    pub async_defaults: CrawlDefaults,
    /// Number of jobs that may run at once.
    pub max_concurrent_jobs: usize,
    /// Number of jobs that may wait for a worker.
    pub max_queued_jobs: usize,
    /// How long finished jobs stay resolvable.
    pub retention: RetentionPolicy,
    /// How long a blocking submit waits before giving up.
    pub sync_request_timeout: Duration,
    /// Whether a successful download reclaims the artifact and the record.
    pub reclaim_on_download: bool,
}

impl ServiceConfig {
    /// Default fetch duration ceiling (50 minutes).
    pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(3000);

    /// Default output ceiling (500 MB).
    pub const DEFAULT_MAX_OUTPUT_BYTES: u64 = sitesnap_archive::DEFAULT_MAX_BYTES;

    /// Total number of jobs admitted at once, running or queued.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.max_concurrent_jobs.saturating_add(self.max_queued_jobs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_duration: Self::DEFAULT_MAX_DURATION,
            kill_grace: Duration::from_secs(10),
            max_output_bytes: Self::DEFAULT_MAX_OUTPUT_BYTES,
            sync_defaults: CrawlDefaults::synchronous(),
            async_defaults: CrawlDefaults::asynchronous(),
            max_concurrent_jobs: 4,
            max_queued_jobs: 16,
            retention: RetentionPolicy::default(),
            sync_request_timeout: Self::DEFAULT_MAX_DURATION + Duration::from_secs(30),
            reclaim_on_download: true,
        }
    }
}
