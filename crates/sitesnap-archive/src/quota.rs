//! Disk usage measurement and quota enforcement.

use sitesnap_types::ErrorKind;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default ceiling on a job's captured output, in bytes.
pub const DEFAULT_MAX_BYTES: u64 = 500_000_000;

/// Errors raised by the quota guard.
#[derive(Error, Debug)]
pub enum QuotaError {
    /// The directory holds more than the permitted number of bytes.
    #[error("download exceeded size limit ({size} > {limit} bytes)")]
    Exceeded {
        /// Measured size.
        size: u64,
        /// Configured ceiling.
        limit: u64,
    },

    /// The directory tree could not be measured.
    #[error("Failed to measure '{path}': {source}")]
    Measure {
        /// The path that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

impl QuotaError {
    /// Classifies this error for the job record.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Exceeded { .. } => ErrorKind::QuotaExceeded,
            Self::Measure { .. } => ErrorKind::InternalError,
        }
    }
}

/// Sums the size of every regular file under `root`.
///
/// Symbolic links are neither followed nor counted.
///
/// # Errors
///
/// Returns the first I/O error hit while walking the tree.
pub fn dir_size_bytes(root: &Path) -> Result<u64, QuotaError> {
    let measure_err = |path: &Path, source| QuotaError::Measure {
        path: path.to_path_buf(),
        source,
    };

    let mut total = 0u64;
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir).map_err(|e| measure_err(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| measure_err(&dir, e))?;
            let file_type = entry.file_type().map_err(|e| measure_err(&entry.path(), e))?;

            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                let meta = entry.metadata().map_err(|e| measure_err(&entry.path(), e))?;
                total = total.saturating_add(meta.len());
            }
        }
    }

    Ok(total)
}

/// Enforces a hard ceiling on a directory's total file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaGuard {
    max_bytes: u64,
}

impl QuotaGuard {
    /// Creates a guard with the given ceiling.
    #[must_use]
    pub const fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    /// Returns the configured ceiling.
    #[must_use]
    pub const fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Measures `dir` and returns its size if within the ceiling.
    ///
    /// A directory of exactly `max_bytes` is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaError::Exceeded`] if the tree is larger than the
    /// ceiling, or [`QuotaError::Measure`] if it cannot be walked.
    pub fn check(&self, dir: &Path) -> Result<u64, QuotaError> {
        let size = dir_size_bytes(dir)?;
        if size > self.max_bytes {
            return Err(QuotaError::Exceeded {
                size,
                limit: self.max_bytes,
            });
        }
        Ok(size)
    }
}

impl Default for QuotaGuard {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn populate(root: &Path) {
        fs::create_dir_all(root.join("example.com/css")).unwrap();
        fs::write(root.join("example.com/index.html"), vec![b'a'; 1000]).unwrap();
        fs::write(root.join("example.com/css/site.css"), vec![b'b'; 250]).unwrap();
        fs::create_dir_all(root.join("cdn.example.net/empty")).unwrap();
    }

    #[test]
    fn test_dir_size_sums_nested_files() {
        let dir = TempDir::new().unwrap();
        populate(dir.path());

        assert_eq!(dir_size_bytes(dir.path()).unwrap(), 1250);
    }

    #[test]
    fn test_empty_dir_is_zero() {
        let dir = TempDir::new().unwrap();
        assert_eq!(dir_size_bytes(dir.path()).unwrap(), 0);
    }

    #[test]
    fn test_missing_dir_is_measure_error() {
        let dir = TempDir::new().unwrap();
        let result = dir_size_bytes(&dir.path().join("gone"));
        assert!(matches!(result, Err(QuotaError::Measure { .. })));
    }

    #[test]
    fn test_check_boundary() {
        let dir = TempDir::new().unwrap();
        populate(dir.path());

        assert_eq!(QuotaGuard::new(1250).check(dir.path()).unwrap(), 1250);

        match QuotaGuard::new(1249).check(dir.path()) {
            Err(err @ QuotaError::Exceeded { size, limit }) => {
                assert_eq!(size, 1250);
                assert_eq!(limit, 1249);
                assert_eq!(err.kind(), ErrorKind::QuotaExceeded);
            }
            other => panic!("expected quota exceeded, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_not_followed() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("big.bin"), vec![0u8; 4096]).unwrap();
        fs::write(dir.path().join("page.html"), b"hi").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        assert_eq!(dir_size_bytes(dir.path()).unwrap(), 2);
    }

    #[test]
    fn test_default_limit() {
        assert_eq!(QuotaGuard::default().max_bytes(), 500_000_000);
    }
}
