//! Command-line and environment configuration.

use anyhow::{Context, Result};
use clap::Args;
use sitesnap_lib::{FetcherConfig, RetentionPolicy, ServiceConfig, Storage};
use std::path::PathBuf;
use std::time::Duration;

/// Slack added to the crawl limit for the blocking download route.
const SYNC_DEADLINE_SLACK: Duration = Duration::from_secs(30);

/// Settings shared by every command that runs jobs.
#[derive(Debug, Clone, Args)]
pub(crate) struct EngineArgs {
    /// Directory for work directories and archives [default: platform cache dir]
    #[arg(long, env = "SITESNAP_STORAGE_DIR")]
    pub(crate) storage_dir: Option<PathBuf>,

    /// Crawler executable
    #[arg(long, env = "SITESNAP_WGET", default_value = "wget")]
    pub(crate) wget: PathBuf,

    /// Keep page requisites on the target host
    #[arg(long, env = "SITESNAP_NO_SPAN_HOSTS")]
    pub(crate) no_span_hosts: bool,

    /// Maximum crawl duration in seconds
    #[arg(long, env = "SITESNAP_MAX_DURATION", default_value_t = 3000)]
    pub(crate) max_duration: u64,

    /// Maximum size of a crawl's output in bytes
    #[arg(long, env = "SITESNAP_MAX_BYTES", default_value_t = 500_000_000)]
    pub(crate) max_bytes: u64,

    /// Default delay between requests in seconds
    #[arg(long, env = "SITESNAP_DEFAULT_WAIT", default_value_t = 0.5, value_parser = parse_seconds)]
    pub(crate) default_wait: f64,
}

impl EngineArgs {
    /// Builds the engine configuration from these arguments.
    pub(crate) fn service_config(&self) -> ServiceConfig {
        let max_duration = Duration::from_secs(self.max_duration);
        let mut config = ServiceConfig {
            max_duration,
            max_output_bytes: self.max_bytes,
            sync_request_timeout: max_duration.saturating_add(SYNC_DEADLINE_SLACK),
            ..ServiceConfig::default()
        };
        config.sync_defaults.wait_seconds = self.default_wait;
        config.async_defaults.wait_seconds = self.default_wait;
        config
    }

    /// Builds the fetcher configuration from these arguments.
    pub(crate) fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            program: self.wget.clone(),
            span_hosts: !self.no_span_hosts,
            ..FetcherConfig::default()
        }
    }

    /// Resolves the crawler executable on `PATH`.
    pub(crate) fn resolve_wget(&self) -> Result<PathBuf> {
        which::which(&self.wget)
            .with_context(|| format!("Crawler executable '{}' not found", self.wget.display()))
    }

    /// Opens storage at the configured root or the platform default.
    pub(crate) fn storage(&self) -> Result<Storage> {
        let root = self.storage_dir.clone().unwrap_or_else(Storage::default_path);
        Storage::new(root.clone())
            .with_context(|| format!("Failed to prepare storage at {}", root.display()))
    }
}

/// Arguments for `sitesnap serve`.
#[derive(Debug, Clone, Args)]
pub(crate) struct ServeArgs {
    /// Address to bind
    #[arg(long, env = "SITESNAP_HOST", default_value = "0.0.0.0")]
    pub(crate) host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub(crate) port: u16,

    /// Jobs allowed to run at once
    #[arg(long, env = "SITESNAP_WORKERS", default_value_t = 4)]
    pub(crate) workers: usize,

    /// Jobs allowed to wait for a worker
    #[arg(long, env = "SITESNAP_QUEUE", default_value_t = 16)]
    pub(crate) queue: usize,

    /// Default crawl depth for POST /download
    #[arg(long, env = "SITESNAP_SYNC_DEPTH", default_value_t = 4)]
    pub(crate) sync_depth: u32,

    /// Default crawl depth for POST /jobs
    #[arg(long, env = "SITESNAP_ASYNC_DEPTH", default_value_t = 2)]
    pub(crate) async_depth: u32,

    /// Seconds POST /download waits for a result [default: max duration + 30]
    #[arg(long, env = "SITESNAP_REQUEST_TIMEOUT")]
    pub(crate) request_timeout: Option<u64>,

    /// Seconds a finished job stays available
    #[arg(long, env = "SITESNAP_RETENTION", default_value_t = 3600)]
    pub(crate) retention: u64,

    /// Finished jobs kept at most
    #[arg(long, env = "SITESNAP_MAX_FINISHED", default_value_t = 256)]
    pub(crate) max_finished: usize,

    /// Seconds between retention sweeps
    #[arg(long, env = "SITESNAP_REAP_INTERVAL", default_value_t = 60)]
    pub(crate) reap_interval: u64,

    /// Keep archives and job records after they are downloaded
    #[arg(long, env = "SITESNAP_KEEP_DOWNLOADED")]
    pub(crate) keep_downloaded: bool,

    #[command(flatten)]
    pub(crate) engine: EngineArgs,
}

impl ServeArgs {
    /// Builds the engine configuration for the HTTP service.
    pub(crate) fn service_config(&self) -> ServiceConfig {
        let mut config = self.engine.service_config();
        config.sync_defaults.depth = self.sync_depth;
        config.async_defaults.depth = self.async_depth;
        config.max_concurrent_jobs = self.workers.max(1);
        config.max_queued_jobs = self.queue;
        config.retention = RetentionPolicy {
            max_age: Duration::from_secs(self.retention),
            max_finished: self.max_finished,
        };
        if let Some(secs) = self.request_timeout {
            config.sync_request_timeout = Duration::from_secs(secs);
        }
        config.reclaim_on_download = !self.keep_downloaded;
        config
    }

    /// Address to bind, as `host:port`.
    pub(crate) fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Arguments for `sitesnap snapshot`.
#[derive(Debug, Clone, Args)]
pub(crate) struct SnapshotArgs {
    /// Site to mirror (http:// or https://)
    pub(crate) url: String,

    /// Recursion depth [default: 4]
    #[arg(short, long)]
    pub(crate) depth: Option<u32>,

    /// Delay between requests in seconds [default: --default-wait]
    #[arg(short, long, value_parser = parse_seconds)]
    pub(crate) wait: Option<f64>,

    /// Honor robots.txt
    #[arg(long)]
    pub(crate) obey_robots: bool,

    /// Output file. Defaults to ./site_snapshot_<id>.zip
    #[arg(short, long)]
    pub(crate) output: Option<PathBuf>,

    #[command(flatten)]
    pub(crate) engine: EngineArgs,
}

fn parse_seconds(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|_| format!("'{s}' is not a number"))?;
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(format!("'{s}' must be a non-negative number of seconds"))
    }
}
