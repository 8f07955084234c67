//! On-disk layout for job work directories and finished archives.

use crate::JobId;
use directories::ProjectDirs;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur during storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to create a directory.
    #[error("Failed to create directory '{path}': {source}")]
    CreateDir {
        /// The path that could not be created.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// Failed to delete a file or directory.
    #[error("Failed to delete '{path}': {source}")]
    Delete {
        /// The path that could not be deleted.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// Failed to read directory.
    #[error("Failed to read directory '{path}': {source}")]
    ReadDir {
        /// The path that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Owns the directories jobs write into.
///
/// Work directories live under `<base>/work/site_snap_<id>` and archives
/// under `<base>/artifacts/site_snapshot_<id>.zip`. Both are derived from
/// the job id, so two jobs never share a path.
#[derive(Debug, Clone)]
pub struct Storage {
    base_path: PathBuf,
    work_path: PathBuf,
    artifacts_path: PathBuf,
}

impl Storage {
    /// Creates storage rooted at `base_path`.
    ///
    /// Creates the necessary subdirectories if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created.
    pub fn new(base_path: PathBuf) -> Result<Self> {
        let work_path = base_path.join("work");
        let artifacts_path = base_path.join("artifacts");

        for path in [&base_path, &work_path, &artifacts_path] {
            fs::create_dir_all(path).map_err(|e| StorageError::CreateDir {
                path: path.clone(),
                source: e,
            })?;
        }

        Ok(Self {
            base_path,
            work_path,
            artifacts_path,
        })
    }

    /// Returns the default storage root.
    ///
    /// Uses the platform cache directory:
    /// - Linux: `~/.cache/sitesnap/`
    /// - macOS: `~/Library/Caches/sitesnap/`
    /// - Windows: `C:\Users\<User>\AppData\Local\sitesnap\cache\`
    ///
    /// Falls back to `sitesnap/` under the system temp directory if the
    /// platform location cannot be determined.
    #[must_use]
    pub fn default_path() -> PathBuf {
        ProjectDirs::from("", "", "sitesnap").map_or_else(
            || std::env::temp_dir().join("sitesnap"),
            |proj_dirs| proj_dirs.cache_dir().to_path_buf(),
        )
    }

    /// Creates storage at the default path.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created.
    pub fn with_default_path() -> Result<Self> {
        Self::new(Self::default_path())
    }

    /// Returns the storage root.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Returns the path of a job's work directory.
    #[must_use]
    pub fn work_dir(&self, job_id: JobId) -> PathBuf {
        self.work_path.join(format!("site_snap_{job_id}"))
    }

    /// Returns the path of a job's archive.
    #[must_use]
    pub fn artifact_path(&self, job_id: JobId) -> PathBuf {
        self.artifacts_path.join(artifact_file_name(job_id))
    }

    /// Creates a job's work directory.
    ///
    /// Fails if the directory already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists or cannot be created.
    pub fn create_work_dir(&self, job_id: JobId) -> Result<PathBuf> {
        let path = self.work_dir(job_id);
        fs::create_dir(&path).map_err(|e| StorageError::CreateDir {
            path: path.clone(),
            source: e,
        })?;
        Ok(path)
    }

    /// Removes a job's work directory and everything in it.
    ///
    /// A directory that is already gone is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be removed.
    pub fn remove_work_dir(&self, job_id: JobId) -> Result<()> {
        let path = self.work_dir(job_id);
        match fs::remove_dir_all(&path) {
            Ok(()) => {
                debug!(job_id = %job_id, "work directory removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Delete { path, source: e }),
        }
    }

    /// Removes a job's archive.
    ///
    /// A file that is already gone is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn remove_artifact(&self, job_id: JobId) -> Result<()> {
        let path = self.artifact_path(job_id);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(job_id = %job_id, "artifact removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Delete { path, source: e }),
        }
    }

    /// Deletes everything left over from a previous process.
    ///
    /// Job records are held in memory only, so at startup every work
    /// directory and archive on disk is orphaned.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be listed or an entry cannot
    /// be removed.
    pub fn purge_stale(&self) -> Result<usize> {
        let mut purged = 0;

        for root in [&self.work_path, &self.artifacts_path] {
            let entries = fs::read_dir(root).map_err(|e| StorageError::ReadDir {
                path: root.clone(),
                source: e,
            })?;

            for entry in entries {
                let entry = entry.map_err(|e| StorageError::ReadDir {
                    path: root.clone(),
                    source: e,
                })?;
                let path = entry.path();
                let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());

                let removed = if is_dir {
                    fs::remove_dir_all(&path)
                } else {
                    fs::remove_file(&path)
                };
                removed.map_err(|e| StorageError::Delete { path, source: e })?;
                purged += 1;
            }
        }

        if purged > 0 {
            info!(purged, "removed leftovers from a previous run");
        }
        Ok(purged)
    }
}

/// File name a job's archive is stored and offered under.
#[must_use]
pub fn artifact_file_name(job_id: JobId) -> String {
    format!("site_snapshot_{job_id}.zip")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use uuid::Uuid;

    #[test]
    fn test_storage_creation() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path().join("root")).unwrap();

        assert!(storage.base_path().exists());
        assert!(temp_dir.path().join("root/work").is_dir());
        assert!(temp_dir.path().join("root/artifacts").is_dir());
    }

    #[test]
    fn test_paths_derived_from_id() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path().to_path_buf()).unwrap();
        let id = Uuid::new_v4();

        assert_eq!(
            storage.work_dir(id),
            temp_dir.path().join(format!("work/site_snap_{id}"))
        );
        assert_eq!(
            storage.artifact_path(id),
            temp_dir.path().join(format!("artifacts/site_snapshot_{id}.zip"))
        );
        assert_ne!(storage.work_dir(id), storage.work_dir(Uuid::new_v4()));
    }

    #[test]
    fn test_create_work_dir_is_exclusive() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path().to_path_buf()).unwrap();
        let id = Uuid::new_v4();

        let path = storage.create_work_dir(id).unwrap();
        assert!(path.is_dir());
        assert!(matches!(
            storage.create_work_dir(id),
            Err(StorageError::CreateDir { .. })
        ));
    }

    #[test]
    fn test_removal_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path().to_path_buf()).unwrap();
        let id = Uuid::new_v4();

        let work = storage.create_work_dir(id).unwrap();
        fs::create_dir_all(work.join("example.com")).unwrap();
        fs::write(work.join("example.com/index.html"), "hi").unwrap();
        fs::write(storage.artifact_path(id), "zip").unwrap();

        storage.remove_work_dir(id).unwrap();
        storage.remove_artifact(id).unwrap();
        assert!(!work.exists());
        assert!(!storage.artifact_path(id).exists());

        storage.remove_work_dir(id).unwrap();
        storage.remove_artifact(id).unwrap();
    }

    #[test]
    fn test_purge_stale() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path().to_path_buf()).unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let work = storage.create_work_dir(a).unwrap();
        fs::write(work.join("page.html"), "hi").unwrap();
        fs::write(storage.artifact_path(b), "zip").unwrap();

        assert_eq!(storage.purge_stale().unwrap(), 2);
        assert!(!work.exists());
        assert!(!storage.artifact_path(b).exists());
        assert_eq!(storage.purge_stale().unwrap(), 0);
    }

    #[test]
    fn test_artifact_file_name() {
        let id = Uuid::nil();
        assert_eq!(
            artifact_file_name(id),
            "site_snapshot_00000000-0000-0000-0000-000000000000.zip"
        );
    }
}
