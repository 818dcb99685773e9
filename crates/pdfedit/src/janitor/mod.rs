//! Retention sweep for expired jobs.

pub mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, info_span, warn};

use crate::config::JanitorConfig;
use crate::job::JobRecord;
use crate::storage::BlobStore;
use crate::store::{JobRecordStore, StoreError};

pub use scheduler::JanitorScheduler;

pub struct Janitor {
    store: Arc<dyn JobRecordStore>,
    blobs: Arc<dyn BlobStore>,
    retention: chrono::Duration,
    active_grace: chrono::Duration,
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

impl Janitor {
    pub fn new(
        store: Arc<dyn JobRecordStore>,
        blobs: Arc<dyn BlobStore>,
        retention: Duration,
        active_grace: Duration,
    ) -> Self {
        Self {
            store,
            blobs,
            retention: to_chrono(retention),
            active_grace: to_chrono(active_grace),
        }
    }

    pub fn from_config(
        store: Arc<dyn JobRecordStore>,
        blobs: Arc<dyn BlobStore>,
        config: &JanitorConfig,
    ) -> Self {
        Self::new(store, blobs, config.retention(), config.active_grace())
    }

    /// Whether `record` may be reclaimed at `now`.
    ///
    /// Expired jobs that a worker touched within the grace window are left
    /// for a later sweep.
    pub fn is_expired(&self, record: &JobRecord, now: DateTime<Utc>) -> bool {
        if now.signed_duration_since(record.created_at) <= self.retention {
            return false;
        }
        let recently_active = record.status.is_in_flight()
            && now.signed_duration_since(record.updated_at) <= self.active_grace;
        !recently_active
    }

    /// Removes every expired job and its artifacts. Returns the removed ids.
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<Vec<String>, StoreError> {
        let _span = info_span!("janitor.sweep").entered();

        let mut removed = Vec::new();
        for (job_id, record) in self.store.list()? {
            if !self.is_expired(&record, now) {
                continue;
            }

            // Re-checked against the current value inside the store.
            let removed_record = match self
                .store
                .remove_if(&job_id, &|current: &JobRecord| self.is_expired(current, now))
            {
                Ok(Some(record)) => record,
                Ok(None) => {
                    debug!(job_id = %job_id, "job changed before removal, keeping it");
                    continue;
                }
                Err(e) => {
                    warn!(job_id = %job_id, "failed to remove expired job: {}", e);
                    continue;
                }
            };

            self.blobs.remove_job_artifacts(&removed_record);
            removed.push(job_id);
        }

        if !removed.is_empty() {
            info!(removed = removed.len(), "expired jobs removed");
        }
        Ok(removed)
    }
}
