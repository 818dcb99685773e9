//! Job queue transport between the dispatcher and the workers.
//!
//! Delivery is at-least-once: a consumed message stays claimed until it is
//! acked, and becomes visible again once its claim expires.

pub mod sqlite;

use std::time::Duration;

use thiserror::Error;

use crate::db::DatabaseError;
use crate::worker::JobRequest;

pub use sqlite::SqliteQueue;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Failed to encode job request for '{job_id}': {source}")]
    Serialization {
        job_id: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<rusqlite::Error> for QueueError {
    fn from(err: rusqlite::Error) -> Self {
        QueueError::Database(DatabaseError::Sqlite(err))
    }
}

/// A claimed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub message_id: String,
    pub request: JobRequest,
    /// How many times this message has been handed out, including this one.
    pub deliveries: u32,
}

pub trait JobQueue: Send + Sync {
    /// Enqueues for immediate delivery. Returns the message id.
    fn enqueue(&self, request: &JobRequest) -> Result<String, QueueError> {
        self.enqueue_after(request, Duration::ZERO)
    }

    /// Enqueues a message that becomes deliverable after `delay`.
    fn enqueue_after(&self, request: &JobRequest, delay: Duration) -> Result<String, QueueError>;

    /// Claims the next deliverable message, waiting up to `timeout`.
    ///
    /// Never hands out a message whose job already has an unexpired claim.
    fn consume(&self, worker: &str, timeout: Duration) -> Result<Option<Delivery>, QueueError>;

    fn ack(&self, message_id: &str) -> Result<(), QueueError>;

    /// Drops every message for `job_id`, claimed or not.
    fn purge_job(&self, job_id: &str) -> Result<usize, QueueError>;
}
