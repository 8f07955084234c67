//! Disk quota measurement and zip packaging for sitesnap snapshots.
//!
//! This crate turns a finished job's output directory into its artifact:
//!
//! - [`QuotaGuard`] - Measures a directory tree against a byte ceiling
//! - [`dir_size_bytes`] - Recursive size of all regular files in a tree
//! - [`Archiver`] - Packs a directory into a single zip file

#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod quota;
mod zip;

pub use crate::zip::{ArchiveError, ArchiveSummary, Archiver};
pub use quota::{DEFAULT_MAX_BYTES, QuotaError, QuotaGuard, dir_size_bytes};
