//! Blob storage for uploaded documents and their edited outputs.

pub mod filesystem;

use std::path::{Path, PathBuf};

use log::warn;

use crate::error::StorageError;
use crate::job::JobRecord;

pub use filesystem::FileBlobStore;

pub trait BlobStore: Send + Sync {
    /// Directory new blobs are written to.
    fn root(&self) -> &Path;

    /// Writes `content` under a fresh UUID-based name with `extension`.
    fn save(&self, content: &[u8], extension: &str) -> Result<PathBuf, StorageError>;

    fn read(&self, path: &Path) -> Result<Vec<u8>, StorageError>;

    /// Returns whether a file was removed. A missing file is not an error.
    fn remove(&self, path: &Path) -> Result<bool, StorageError>;

    fn exists(&self, path: &Path) -> bool;

    /// Removes every file under the root matching the glob `pattern`.
    fn purge(&self, pattern: &str) -> Result<usize, StorageError>;

    /// Removes the upload and the edited output of a job, if any.
    ///
    /// Best effort: failures are logged and skipped. Returns how many files
    /// were actually removed.
    fn remove_job_artifacts(&self, record: &JobRecord) -> usize {
        let paths = std::iter::once(record.input_path.as_path())
            .chain(record.output_path.as_deref());
        let mut removed = 0;
        for path in paths {
            match self.remove(path) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!(
                    "Failed to remove blob {} of job {}: {}",
                    blob_name(path),
                    record.job_id,
                    e
                ),
            }
        }
        removed
    }
}

/// Name of a blob without its directory, for logs and span fields.
///
/// Blob names are generated, so they carry nothing from the client and
/// nothing of the server's directory layout.
pub fn blob_name(path: &Path) -> &str {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
}
