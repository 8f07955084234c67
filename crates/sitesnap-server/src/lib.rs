//! HTTP retrieval API for sitesnap.
//!
//! - [`router`] - Builds the `axum` router over an [`AppState`]
//! - [`serve`] - Runs the router on a listener with graceful shutdown
//! - [`ApiError`] - Client-facing failures and their status codes

#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod app;
mod error;
mod handlers;

pub use app::{AppState, MAX_REQUEST_BYTES, router, serve};
pub use error::{ApiError, status_for};
