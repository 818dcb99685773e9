//! Durable job record store.
//!
//! One namespaced key per job (`<prefix><job_id>`). Every update is a
//! whole-record write, so readers never observe a partially applied merge.

pub mod sqlite;

use thiserror::Error;

use crate::db::DatabaseError;
use crate::job::{JobPatch, JobRecord, JobStatus};

pub use sqlite::SqliteJobStore;

/// Key namespace shared by every process using the same database.
pub const DEFAULT_KEY_PREFIX: &str = "pdf_task:";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Job record '{0}' not found")]
    NotFound(String),

    #[error("Invalid status transition for job '{job_id}': {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Failed to encode or decode job record '{job_id}': {source}")]
    Serialization {
        job_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(DatabaseError::Sqlite(err))
    }
}

/// Lazily evaluated listing. Records are fetched one by one from a key
/// snapshot; keys deleted in the meantime are skipped.
pub type RecordIter<'a> = Box<dyn Iterator<Item = (String, JobRecord)> + 'a>;

pub trait JobRecordStore: Send + Sync {
    fn get(&self, job_id: &str) -> Result<JobRecord, StoreError>;

    /// Idempotent overwrite.
    fn put(&self, record: &JobRecord) -> Result<(), StoreError>;

    /// Writes the record only when no record exists under its key.
    /// Returns whether it was written.
    fn put_if_absent(&self, record: &JobRecord) -> Result<bool, StoreError>;

    /// Atomic read-modify-write. Concurrent merges on one key serialize.
    ///
    /// Fails with [`StoreError::NotFound`] when the record is absent, so a
    /// merge never recreates a deleted job.
    fn merge(&self, job_id: &str, patch: &JobPatch) -> Result<JobRecord, StoreError>;

    /// Returns whether a record was removed.
    fn delete(&self, job_id: &str) -> Result<bool, StoreError>;

    /// Atomically removes the record if `predicate` holds for its current value.
    fn remove_if(
        &self,
        job_id: &str,
        predicate: &dyn Fn(&JobRecord) -> bool,
    ) -> Result<Option<JobRecord>, StoreError>;

    fn exists(&self, job_id: &str) -> Result<bool, StoreError>;

    fn list(&self) -> Result<RecordIter<'_>, StoreError>;

    /// Removes every record in the namespace, returning how many were removed.
    fn clear(&self) -> Result<usize, StoreError>;
}
