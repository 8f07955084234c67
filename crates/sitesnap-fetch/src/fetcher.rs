//! The fetcher capability and its failure modes.

use async_trait::async_trait;
use sitesnap_types::{CrawlParameters, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Result of a fetch that exited successfully.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Tail of the combined stdout/stderr stream.
    pub output: String,
    /// Wall-clock time the fetch took.
    pub elapsed: Duration,
}

/// Errors that can occur while running the fetcher.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The fetch was still running at the deadline and was killed.
    #[error("fetch exceeded the {}s duration limit", .limit.as_secs())]
    TimeoutExceeded {
        /// The limit that was exceeded.
        limit: Duration,
        /// Output captured before termination.
        output: String,
    },

    /// The fetcher exited unsuccessfully.
    #[error("{}", describe_exit(.code))]
    ProcessFailed {
        /// Exit code, or `None` if the process was killed by a signal.
        code: Option<i32>,
        /// Output captured from the process.
        output: String,
    },

    /// The fetcher program could not be started.
    #[error("failed to start fetcher '{}': {source}", .program.display())]
    Spawn {
        /// The program that could not be started.
        program: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Waiting on or killing the process failed.
    #[error("I/O error while supervising fetcher: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Classifies this error for the job record.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::TimeoutExceeded { .. } => ErrorKind::TimeoutExceeded,
            Self::ProcessFailed { .. } | Self::Spawn { .. } => ErrorKind::ProcessFailed,
            Self::Io(_) => ErrorKind::InternalError,
        }
    }

    /// Output captured from the process, if any.
    #[must_use]
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::TimeoutExceeded { output, .. } | Self::ProcessFailed { output, .. } => {
                Some(output)
            }
            Self::Spawn { .. } | Self::Io(_) => None,
        }
    }

    /// Description safe to show to clients: no paths, no process output.
    #[must_use]
    pub fn client_detail(&self) -> String {
        match self {
            Self::TimeoutExceeded { .. } | Self::ProcessFailed { .. } => self.to_string(),
            Self::Spawn { .. } => "failed to start fetcher".to_string(),
            Self::Io(_) => "fetcher supervision failed".to_string(),
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("fetcher exited with status {c}"),
        None => "fetcher was terminated by a signal".to_string(),
    }
}

/// Runs one recursive mirroring operation.
///
/// Implementations must confine all output to `work_dir` and must not run
/// past `limit`: once the limit elapses the underlying operation is
/// forcibly terminated and [`FetchError::TimeoutExceeded`] returned.
/// Partial output is left in `work_dir` for the caller to clean up.
#[async_trait]
pub trait Fetcher: Send + Sync + std::fmt::Debug {
    /// Mirrors `params.target_url()` into `work_dir`.
    async fn fetch(
        &self,
        params: &CrawlParameters,
        work_dir: &Path,
        limit: Duration,
    ) -> Result<FetchOutcome, FetchError>;
}
