use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::{JobRecordStore, RecordIter, StoreError, DEFAULT_KEY_PREFIX};
use crate::db::Database;
use crate::job::{JobPatch, JobRecord};

/// Job record store on the shared SQLite database.
///
/// Values are JSON documents in `job_records`; merges run in an immediate
/// transaction so the read and the write happen under one write lock.
#[derive(Clone)]
pub struct SqliteJobStore {
    db: Database,
    prefix: String,
}

impl SqliteJobStore {
    pub fn new(db: Database, prefix: impl Into<String>) -> Self {
        Self {
            db,
            prefix: prefix.into(),
        }
    }

    pub fn with_default_prefix(db: Database) -> Self {
        Self::new(db, DEFAULT_KEY_PREFIX)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn key(&self, job_id: &str) -> String {
        format!("{}{}", self.prefix, job_id)
    }

    fn encode(record: &JobRecord) -> Result<String, StoreError> {
        serde_json::to_string(record).map_err(|e| StoreError::Serialization {
            job_id: record.job_id.clone(),
            source: e,
        })
    }

    fn decode(job_id: &str, value: &str) -> Result<JobRecord, StoreError> {
        serde_json::from_str(value).map_err(|e| StoreError::Serialization {
            job_id: job_id.to_string(),
            source: e,
        })
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let keys = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT key FROM job_records
                 WHERE substr(key, 1, length(?1)) = ?1
                 ORDER BY key",
            )?;
            let keys = stmt
                .query_map(params![self.prefix], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(keys)
        })?;

        Ok(keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(&self.prefix).map(str::to_string))
            .collect())
    }
}

impl JobRecordStore for SqliteJobStore {
    fn get(&self, job_id: &str) -> Result<JobRecord, StoreError> {
        let key = self.key(job_id);
        let value: Option<String> = self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT value FROM job_records WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?)
        })?;

        match value {
            Some(value) => Self::decode(job_id, &value),
            None => Err(StoreError::NotFound(job_id.to_string())),
        }
    }

    fn put(&self, record: &JobRecord) -> Result<(), StoreError> {
        let key = self.key(&record.job_id);
        let value = Self::encode(record)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO job_records (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, record.updated_at.to_rfc3339()],
            )?;
            Ok(())
        })?;
        Ok(())
    }

    fn put_if_absent(&self, record: &JobRecord) -> Result<bool, StoreError> {
        let key = self.key(&record.job_id);
        let value = Self::encode(record)?;
        let inserted = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "INSERT OR IGNORE INTO job_records (key, value, updated_at) VALUES (?1, ?2, ?3)",
                params![key, value, record.updated_at.to_rfc3339()],
            )?)
        })?;
        Ok(inserted > 0)
    }

    fn merge(&self, job_id: &str, patch: &JobPatch) -> Result<JobRecord, StoreError> {
        let key = self.key(job_id);
        self.db.with_transaction(|tx| {
            let value: Option<String> = tx
                .query_row(
                    "SELECT value FROM job_records WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(value) = value else {
                return Err(StoreError::NotFound(job_id.to_string()));
            };

            let mut record = Self::decode(job_id, &value)?;
            let now = Utc::now();
            record
                .apply(patch, now)
                .map_err(|e| StoreError::InvalidTransition {
                    job_id: job_id.to_string(),
                    from: e.from,
                    to: e.to,
                })?;

            let encoded = Self::encode(&record)?;
            tx.execute(
                "UPDATE job_records SET value = ?2, updated_at = ?3 WHERE key = ?1",
                params![key, encoded, now.to_rfc3339()],
            )?;
            Ok(record)
        })
    }

    fn delete(&self, job_id: &str) -> Result<bool, StoreError> {
        let key = self.key(job_id);
        let removed = self.db.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM job_records WHERE key = ?1", params![key])?)
        })?;
        Ok(removed > 0)
    }

    fn remove_if(
        &self,
        job_id: &str,
        predicate: &dyn Fn(&JobRecord) -> bool,
    ) -> Result<Option<JobRecord>, StoreError> {
        let key = self.key(job_id);
        self.db.with_transaction(|tx| {
            let value: Option<String> = tx
                .query_row(
                    "SELECT value FROM job_records WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(value) = value else {
                return Ok(None);
            };

            let record = Self::decode(job_id, &value)?;
            if !predicate(&record) {
                return Ok(None);
            }

            tx.execute("DELETE FROM job_records WHERE key = ?1", params![key])?;
            Ok(Some(record))
        })
    }

    fn exists(&self, job_id: &str) -> Result<bool, StoreError> {
        let key = self.key(job_id);
        let exists = self.db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM job_records WHERE key = ?1)",
                params![key],
                |row| row.get::<_, bool>(0),
            )?)
        })?;
        Ok(exists)
    }

    fn list(&self) -> Result<RecordIter<'_>, StoreError> {
        let job_ids = self.keys()?;
        Ok(Box::new(job_ids.into_iter().filter_map(move |job_id| {
            match self.get(&job_id) {
                Ok(record) => Some((job_id, record)),
                Err(StoreError::NotFound(_)) => None,
                Err(e) => {
                    log::warn!("Skipping unreadable job record {}: {}", job_id, e);
                    None
                }
            }
        })))
    }

    fn clear(&self) -> Result<usize, StoreError> {
        let removed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM job_records WHERE substr(key, 1, length(?1)) = ?1",
                params![self.prefix],
            )?)
        })?;
        log::info!("Cleared {} job records", removed);
        Ok(removed)
    }
}
