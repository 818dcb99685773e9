use std::time::{Duration, Instant};

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::{Delivery, JobQueue, QueueError};
use crate::db::Database;
use crate::worker::JobRequest;

/// Durations beyond the column's range saturate instead of wrapping negative.
fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Durable queue in the `job_queue` table of the shared database.
///
/// Times are stored as Unix milliseconds. A claim sets `claimed_at`; a
/// message whose claim is older than the visibility timeout is handed out
/// again.
#[derive(Clone)]
pub struct SqliteQueue {
    db: Database,
    visibility_timeout: Duration,
    poll_interval: Duration,
}

impl SqliteQueue {
    pub fn new(db: Database, visibility_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            db,
            visibility_timeout,
            poll_interval,
        }
    }

    /// Messages not yet acked, claimed or not.
    pub fn pending(&self) -> Result<usize, QueueError> {
        let count = self.db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM job_queue", [], |r| r.get::<_, i64>(0))?)
        })?;
        Ok(count as usize)
    }

    fn try_claim(&self, worker: &str) -> Result<Option<Delivery>, QueueError> {
        let now = Utc::now().timestamp_millis();
        let expired_before = now.saturating_sub(millis(self.visibility_timeout));

        self.db.with_transaction(|tx| {
            let row = tx
                .query_row(
                    "SELECT id, job_id, payload, deliveries FROM job_queue q
                     WHERE available_at <= ?1
                       AND (claimed_at IS NULL OR claimed_at <= ?2)
                       AND NOT EXISTS (
                           SELECT 1 FROM job_queue o
                           WHERE o.job_id = q.job_id
                             AND o.id != q.id
                             AND o.claimed_at IS NOT NULL
                             AND o.claimed_at > ?2
                       )
                     ORDER BY available_at, enqueued_at
                     LIMIT 1",
                    params![now, expired_before],
                    |r| {
                        Ok((
                            r.get::<_, String>(0)?,
                            r.get::<_, String>(1)?,
                            r.get::<_, String>(2)?,
                            r.get::<_, u32>(3)?,
                        ))
                    },
                )
                .optional()?;

            let Some((message_id, job_id, payload, deliveries)) = row else {
                return Ok(None);
            };

            let request: JobRequest = match serde_json::from_str(&payload) {
                Ok(request) => request,
                Err(e) => {
                    // Dead letter; it would never decode on redelivery either.
                    log::error!(
                        "Dropping undecodable queue message {} for job {}: {}",
                        message_id,
                        job_id,
                        e
                    );
                    tx.execute("DELETE FROM job_queue WHERE id = ?1", params![message_id])?;
                    return Ok(None);
                }
            };

            tx.execute(
                "UPDATE job_queue
                 SET claimed_by = ?2, claimed_at = ?3, deliveries = deliveries + 1
                 WHERE id = ?1",
                params![message_id, worker, now],
            )?;

            if deliveries > 0 {
                log::warn!(
                    "Redelivering message {} for job {} (delivery {})",
                    message_id,
                    job_id,
                    deliveries + 1
                );
            }

            Ok(Some(Delivery {
                message_id,
                request,
                deliveries: deliveries + 1,
            }))
        })
    }
}

impl JobQueue for SqliteQueue {
    fn enqueue_after(&self, request: &JobRequest, delay: Duration) -> Result<String, QueueError> {
        let payload = serde_json::to_string(request).map_err(|e| QueueError::Serialization {
            job_id: request.job_id.clone(),
            source: e,
        })?;
        let message_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().timestamp_millis();
        let available_at = now.saturating_add(millis(delay));

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO job_queue (id, job_id, payload, enqueued_at, available_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![message_id, request.job_id, payload, now, available_at],
            )?;
            Ok(())
        })?;

        log::debug!(
            "Enqueued message {} for job {} (attempt {}, delay {:?})",
            message_id,
            request.job_id,
            request.attempt,
            delay
        );
        Ok(message_id)
    }

    fn consume(&self, worker: &str, timeout: Duration) -> Result<Option<Delivery>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(delivery) = self.try_claim(worker)? {
                return Ok(Some(delivery));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            std::thread::sleep(self.poll_interval.min(deadline - now));
        }
    }

    fn ack(&self, message_id: &str) -> Result<(), QueueError> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM job_queue WHERE id = ?1", params![message_id])?;
            Ok(())
        })?;
        Ok(())
    }

    fn purge_job(&self, job_id: &str) -> Result<usize, QueueError> {
        let removed = self.db.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM job_queue WHERE job_id = ?1", params![job_id])?)
        })?;
        Ok(removed)
    }
}
