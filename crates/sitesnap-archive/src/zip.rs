//! Zip packaging of a job's output directory.

use ::zip::result::ZipError;
use ::zip::write::SimpleFileOptions;
use ::zip::{CompressionMethod, ZipWriter};
use sitesnap_types::ErrorKind;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while packaging a directory.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Reading the source tree or writing the archive failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The zip encoder failed.
    #[error("Zip error: {0}")]
    Zip(#[from] ZipError),
}

impl ArchiveError {
    /// Every packaging failure is an [`ErrorKind::ArchiveFailed`].
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::ArchiveFailed
    }
}

/// What an archive run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Final location of the archive.
    pub path: PathBuf,
    /// Number of regular files stored.
    pub files: usize,
    /// Number of directory entries stored.
    pub directories: usize,
    /// Uncompressed bytes stored.
    pub source_bytes: u64,
    /// Size of the archive on disk.
    pub archive_bytes: u64,
}

/// Packs a directory tree into a single zip file.
#[derive(Debug, Clone, Copy)]
pub struct Archiver {
    compression: CompressionMethod,
    level: Option<i64>,
}

impl Archiver {
    /// Creates an archiver using deflate at the default level.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            compression: CompressionMethod::Deflated,
            level: None,
        }
    }

    /// Sets the deflate level (0-9).
    #[must_use]
    pub const fn with_level(mut self, level: i64) -> Self {
        self.level = Some(level);
        self
    }

    /// Creates an archiver that stores entries without compression.
    #[must_use]
    pub const fn stored() -> Self {
        Self {
            compression: CompressionMethod::Stored,
            level: None,
        }
    }

    /// Archives every file and directory under `src_dir` into `dest`.
    ///
    /// Entry names are relative to `src_dir` and use `/` separators.
    /// The archive is written to `dest` with a `.part` suffix and renamed
    /// on success; on failure the partial file is removed. If `dest` lies
    /// inside `src_dir` it is not archived into itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be read or the archive cannot
    /// be written.
    pub fn archive(&self, src_dir: &Path, dest: &Path) -> Result<ArchiveSummary, ArchiveError> {
        let part = part_path(dest);

        match self.write_archive(src_dir, dest, &part) {
            Ok(mut summary) => {
                fs::rename(&part, dest).map_err(|e| io_err(dest, e))?;
                summary.archive_bytes = fs::metadata(dest).map_err(|e| io_err(dest, e))?.len();
                debug!(
                    files = summary.files,
                    source_bytes = summary.source_bytes,
                    archive_bytes = summary.archive_bytes,
                    "archive written"
                );
                Ok(summary)
            }
            Err(e) => {
                let _ = fs::remove_file(&part);
                Err(e)
            }
        }
    }

    fn write_archive(
        &self,
        src_dir: &Path,
        dest: &Path,
        part: &Path,
    ) -> Result<ArchiveSummary, ArchiveError> {
        let file = File::create(part).map_err(|e| io_err(part, e))?;
        let mut writer = ZipWriter::new(BufWriter::new(file));

        let root = fs::canonicalize(src_dir).map_err(|e| io_err(src_dir, e))?;
        // Both the final name and the in-progress file are excluded.
        let excluded = [
            fs::canonicalize(part).map_err(|e| io_err(part, e))?,
            canonical_sibling(dest),
        ];

        let options = SimpleFileOptions::default()
            .compression_method(self.compression)
            .compression_level(self.level);

        let mut summary = ArchiveSummary {
            path: dest.to_path_buf(),
            files: 0,
            directories: 0,
            source_bytes: 0,
            archive_bytes: 0,
        };

        let mut pending = vec![root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir)
                .map_err(|e| io_err(&dir, e))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| io_err(&dir, e))?;
            entries.sort_by_key(fs::DirEntry::file_name);

            for entry in entries {
                let path = entry.path();
                if excluded.iter().any(|x| *x == path) {
                    continue;
                }

                let file_type = entry.file_type().map_err(|e| io_err(&path, e))?;
                let name = entry_name(&root, &path);

                if file_type.is_dir() {
                    writer.add_directory(format!("{name}/"), options)?;
                    summary.directories += 1;
                    pending.push(path);
                } else if file_type.is_file() {
                    let mut source = File::open(&path).map_err(|e| io_err(&path, e))?;
                    let len = source.metadata().map_err(|e| io_err(&path, e))?.len();

                    writer.start_file(name, options.large_file(len >= u64::from(u32::MAX)))?;
                    std::io::copy(&mut source, &mut writer).map_err(|e| io_err(&path, e))?;

                    summary.files += 1;
                    summary.source_bytes += len;
                }
            }
        }

        let mut buffered = writer.finish()?;
        buffered.flush().map_err(|e| io_err(part, e))?;
        let file = buffered
            .into_inner()
            .map_err(|e| io_err(part, e.into_error()))?;
        file.sync_all().map_err(|e| io_err(part, e))?;

        Ok(summary)
    }
}

impl Default for Archiver {
    fn default() -> Self {
        Self::new()
    }
}

fn io_err(path: &Path, source: std::io::Error) -> ArchiveError {
    ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = OsString::from(dest.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

/// Canonical form of a path that may not exist yet.
fn canonical_sibling(path: &Path) -> PathBuf {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => fs::canonicalize(parent)
            .map_or_else(|_| path.to_path_buf(), |parent| parent.join(name)),
        _ => path.to_path_buf(),
    }
}

fn entry_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
