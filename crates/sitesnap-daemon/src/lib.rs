//! Job engine for the sitesnap snapshot service.
//!
//! - [`JobRegistry`] - In-memory map from job id to job record
//! - [`Job`] - One snapshot request and its lifecycle
//! - [`Supervisor`] - Worker pool that runs fetch, quota check and archive
//! - [`Storage`] - On-disk layout for work directories and archives
//! - [`ServiceConfig`] - Deployer-controlled limits and defaults

#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod job;
mod registry;
mod storage;
mod supervisor;

pub use config::ServiceConfig;
pub use job::{Job, JobId};
pub use registry::{JobCounts, JobRegistry, RegistryError, RetentionPolicy};
pub use storage::{Result, Storage, StorageError, artifact_file_name};
pub use supervisor::Supervisor;
