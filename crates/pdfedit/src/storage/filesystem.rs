use std::io::Write;
use std::path::{Path, PathBuf};

use glob::Pattern;
use log::{debug, warn};
use uuid::Uuid;

use super::{blob_name, BlobStore};
use crate::error::StorageError;

/// Blobs as plain files in one upload directory.
pub struct FileBlobStore {
    upload_directory: PathBuf,
}

impl FileBlobStore {
    pub fn new<P: AsRef<Path>>(upload_directory: P) -> Self {
        Self {
            upload_directory: upload_directory.as_ref().to_path_buf(),
        }
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Creates the file with O_EXCL so two writers can never share a name.
    fn write_new(&self, path: &Path, content: &[u8]) -> Result<bool, StorageError> {
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(mut file) => {
                file.write_all(content)
                    .map_err(|e| StorageError::WriteFile {
                        path: path.to_path_buf(),
                        source: e,
                    })?;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(StorageError::WriteFile {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }
}

fn fresh_name(extension: &str) -> String {
    let extension = extension.trim_start_matches('.');
    if extension.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        format!("{}.{}", Uuid::new_v4(), extension.to_ascii_lowercase())
    }
}

impl BlobStore for FileBlobStore {
    fn root(&self) -> &Path {
        &self.upload_directory
    }

    fn save(&self, content: &[u8], extension: &str) -> Result<PathBuf, StorageError> {
        self.ensure_directory(&self.upload_directory)?;

        // A UUID collision is practically impossible, but never overwrite.
        for _ in 0..3 {
            let path = self.upload_directory.join(fresh_name(extension));
            if self.write_new(&path, content)? {
                debug!("Saved {} bytes as blob {}", content.len(), blob_name(&path));
                return Ok(path);
            }
        }

        Err(StorageError::FileExists(self.upload_directory.clone()))
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, StorageError> {
        std::fs::read(path).map_err(|e| StorageError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn remove(&self, path: &Path) -> Result<bool, StorageError> {
        match std::fs::remove_file(path) {
            Ok(()) => {
                debug!("Removed blob {}", blob_name(path));
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::RemoveFile {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn purge(&self, pattern: &str) -> Result<usize, StorageError> {
        let matcher = Pattern::new(pattern).map_err(|e| StorageError::Pattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        let entries = match std::fs::read_dir(&self.upload_directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(StorageError::ReadFile {
                    path: self.upload_directory.clone(),
                    source: e,
                })
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|name| matcher.matches(name))
                .unwrap_or(false);
            if !matches {
                continue;
            }
            match self.remove(&path) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!("Failed to purge {}: {}", blob_name(&path), e),
            }
        }

        Ok(removed)
    }
}
