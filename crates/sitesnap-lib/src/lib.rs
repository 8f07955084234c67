//! Offline website snapshots.
//!
//! This is a facade crate that re-exports functionality from the sitesnap
//! workspace crates for convenient access.

#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use sitesnap_types::*;

// Re-export the fetcher capability and its wget implementation
pub use sitesnap_fetch::{FetchError, FetchOutcome, Fetcher, FetcherConfig, WgetFetcher};

// Re-export quota and packaging
pub use sitesnap_archive::{ArchiveError, ArchiveSummary, Archiver, QuotaError, QuotaGuard};

// Re-export the job engine
pub use sitesnap_daemon::{
    Job, JobCounts, JobId, JobRegistry, RegistryError, RetentionPolicy, ServiceConfig, Storage,
    StorageError, Supervisor, artifact_file_name,
};

// Re-export the HTTP API
#[cfg(feature = "server")]
pub use sitesnap_server::{ApiError, AppState, router, serve};

/// Prelude module for convenient imports.
///
/// ```
/// use sitesnap_lib::prelude::*;
/// ```
pub mod prelude {
    pub use sitesnap_types::{CrawlDefaults, CrawlParameters, ErrorKind, JobFailure, JobState};

    pub use sitesnap_fetch::{Fetcher, FetcherConfig, WgetFetcher};

    pub use sitesnap_daemon::{Job, JobId, JobRegistry, ServiceConfig, Storage, Supervisor};

    #[cfg(feature = "server")]
    pub use sitesnap_server::{AppState, router, serve};
}
