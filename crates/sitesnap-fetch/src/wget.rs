//! `wget`-backed fetcher.

use crate::fetcher::{FetchError, FetchOutcome, Fetcher};
use crate::output::{OutputTail, capture};
use async_trait::async_trait;
use sitesnap_types::CrawlParameters;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long to wait for output readers after the process is gone.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Configuration for the `wget` fetcher.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Program to execute.
    pub program: PathBuf,
    /// Arguments placed before the generated `wget` arguments.
    ///
    /// Used for wrappers (`nice -n 10 wget ...` becomes program `nice`
    /// with leading args `["-n", "10", "wget"]`).
    pub leading_args: Vec<OsString>,
    /// Whether page requisites may be fetched from other hosts.
    pub span_hosts: bool,
    /// Maximum number of output bytes retained for diagnostics.
    pub output_limit: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("wget"),
            leading_args: Vec::new(),
            span_hosts: true,
            output_limit: 64 * 1024,
        }
    }
}

/// Runs `wget` as an external mirroring process.
#[derive(Debug, Clone, Default)]
pub struct WgetFetcher {
    config: FetcherConfig,
}

impl WgetFetcher {
    /// Creates a fetcher with the given configuration.
    #[must_use]
    pub const fn new(config: FetcherConfig) -> Self {
        Self { config }
    }

    /// Returns the fetcher configuration.
    #[must_use]
    pub const fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Builds the full argument list for one run, excluding the program.
    ///
    /// Link conversion, requisite capture, safe file names and the
    /// no-parent restriction are always on; callers only choose depth,
    /// wait and robots handling. A depth of zero fetches the target page
    /// and its requisites without recursing.
    #[must_use]
    pub fn command_args(&self, params: &CrawlParameters, work_dir: &Path) -> Vec<OsString> {
        let robots = if params.obey_robots() { "on" } else { "off" };

        let mut args = self.config.leading_args.clone();
        // wget reads `--level=0` as unlimited, so depth 0 fetches one page.
        if params.depth() > 0 {
            args.push("--recursive".into());
            args.push(format!("--level={}", params.depth()).into());
        }
        args.extend(
            [
                "--no-parent".to_string(),
                "--page-requisites".to_string(),
                "--convert-links".to_string(),
                "--adjust-extension".to_string(),
                "--restrict-file-names=windows".to_string(),
                format!("--wait={}", params.wait_seconds()),
                "-e".to_string(),
                format!("robots={robots}"),
                "--no-verbose".to_string(),
            ]
            .map(OsString::from),
        );
        if self.config.span_hosts {
            args.push("--span-hosts".into());
        }
        args.push("--directory-prefix".into());
        args.push(work_dir.as_os_str().to_owned());
        args.push(params.target_url().into());
        args
    }

    fn command(&self, params: &CrawlParameters, work_dir: &Path) -> Command {
        let mut command = Command::new(&self.config.program);
        command
            .args(self.command_args(params, work_dir))
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the fetch future (e.g. a supervisor backstop timeout)
            // must not leave the process running.
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl Fetcher for WgetFetcher {
    async fn fetch(
        &self,
        params: &CrawlParameters,
        work_dir: &Path,
        limit: Duration,
    ) -> Result<FetchOutcome, FetchError> {
        let started = Instant::now();
        debug!(
            program = %self.config.program.display(),
            url = params.target_url(),
            depth = params.depth(),
            "spawning fetcher"
        );

        let mut child = self
            .command(params, work_dir)
            .spawn()
            .map_err(|source| FetchError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        let tail = Arc::new(Mutex::new(OutputTail::new(self.config.output_limit)));
        let mut readers: Vec<JoinHandle<std::io::Result<()>>> = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(capture(stdout, Arc::clone(&tail))));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(capture(stderr, Arc::clone(&tail))));
        }

        let status = match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(
                    url = params.target_url(),
                    limit_secs = limit.as_secs(),
                    "fetcher exceeded duration limit, killing"
                );
                child.kill().await?;
                drain(readers).await;
                let output = tail.lock().await.to_string_lossy();
                return Err(FetchError::TimeoutExceeded { limit, output });
            }
        };

        drain(readers).await;
        let output = tail.lock().await.to_string_lossy();
        let elapsed = started.elapsed();

        if status.success() {
            info!(
                url = params.target_url(),
                elapsed_ms = elapsed.as_millis() as u64,
                "fetcher finished"
            );
            Ok(FetchOutcome { output, elapsed })
        } else {
            warn!(
                url = params.target_url(),
                code = ?status.code(),
                elapsed_ms = elapsed.as_millis() as u64,
                "fetcher failed"
            );
            Err(FetchError::ProcessFailed {
                code: status.code(),
                output,
            })
        }
    }
}

/// Waits for the output readers, abandoning them if a stray descendant
/// keeps a pipe open after the fetcher itself has exited.
async fn drain(readers: Vec<JoinHandle<std::io::Result<()>>>) {
    for reader in readers {
        let abort = reader.abort_handle();
        match tokio::time::timeout(READER_DRAIN_TIMEOUT, reader).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => debug!(error = %e, "error reading fetcher output"),
            Ok(Err(e)) => debug!(error = %e, "fetcher output reader panicked"),
            Err(_) => {
                debug!("fetcher output still open after exit, abandoning reader");
                abort.abort();
            }
        }
    }
}
