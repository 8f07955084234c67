//! CLI command implementations.

pub(crate) mod serve;
pub(crate) mod snapshot;
