//! External fetcher invocation for the sitesnap snapshot service.
//!
//! This crate wraps the recursive mirroring tool the service delegates to:
//!
//! - [`Fetcher`] - Capability trait for one bounded mirroring run
//! - [`WgetFetcher`] - `wget`-backed implementation with forced termination
//! - [`FetcherConfig`] - Program path, wrapper arguments and capture limits
//! - [`FetchError`] - Timeout, process and spawn failures

#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod fetcher;
mod output;
mod wget;

pub use fetcher::{FetchError, FetchOutcome, Fetcher};
pub use output::OutputTail;
pub use wget::{FetcherConfig, WgetFetcher};
