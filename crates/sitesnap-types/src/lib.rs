//! Core types for the sitesnap offline site snapshot service.
//!
//! This crate provides the fundamental data structures shared by every
//! other sitesnap crate:
//!
//! - [`CrawlParameters`] - Validated, immutable parameters for one crawl
//! - [`CrawlDefaults`] - Deployer-controlled defaults applied to requests
//! - [`JobState`] - Lifecycle state of a snapshot job
//! - [`ErrorKind`] - Classification of every failure the service reports
//! - [`JobFailure`] - Terminal failure recorded on a job

#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod params;
mod state;

pub use error::{ErrorKind, JobFailure, ParamsError, Result};
pub use params::{
    CrawlDefaults, CrawlParameters, DEFAULT_ASYNC_DEPTH, DEFAULT_SYNC_DEPTH, DEFAULT_WAIT_SECONDS,
};
pub use state::JobState;
