use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Uploaded,
    Processing,
    Retrying,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Uploaded => "uploaded",
            JobStatus::Processing => "processing",
            JobStatus::Retrying => "retrying",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether a worker may currently be moving this job between states.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, JobStatus::Processing | JobStatus::Retrying)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid status transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Durable state of one job. Stored as a flat JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub status: JobStatus,
    pub input_path: PathBuf,
    pub original_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_pages: Option<Vec<u32>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages_kept: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages_deleted: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_ref: Option<String>,
}

impl JobRecord {
    /// A freshly uploaded job.
    pub fn new(
        job_id: impl Into<String>,
        input_path: impl Into<PathBuf>,
        original_name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            status: JobStatus::Uploaded,
            input_path: input_path.into(),
            original_name: original_name.into(),
            requested_pages: None,
            created_at: now,
            updated_at: now,
            total_pages: None,
            output_path: None,
            pages_kept: None,
            pages_deleted: None,
            error: None,
            retry_count: 0,
            worker_ref: None,
        }
    }

    /// Whether the record may move to `next`.
    ///
    /// A metadata-only completion has no output artifact and can be reopened
    /// by a later page-deletion request. Every other terminal record is frozen.
    pub fn can_transition(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self.status, next) {
            (Uploaded, Processing | Completed | Failed) => true,
            (Processing, Processing | Retrying | Completed | Failed) => true,
            (Retrying, Processing | Failed) => true,
            (Completed, Processing | Completed | Failed) => self.output_path.is_none(),
            _ => false,
        }
    }

    /// Terminal and no longer reopenable.
    pub fn is_settled(&self) -> bool {
        match self.status {
            JobStatus::Failed => true,
            JobStatus::Completed => self.output_path.is_some(),
            _ => false,
        }
    }

    /// Applies a partial update, enforcing the record invariants.
    pub fn apply(&mut self, patch: &JobPatch, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        if let Some(next) = patch.status {
            if !self.can_transition(next) {
                return Err(InvalidTransition {
                    from: self.status,
                    to: next,
                });
            }
            self.status = next;
        }

        if let Some(pages) = &patch.requested_pages {
            self.requested_pages = Some(pages.clone());
        }
        if let Some(total) = patch.total_pages {
            match self.total_pages {
                None => self.total_pages = Some(total),
                Some(existing) if existing != total => {
                    tracing::warn!(
                        job_id = %self.job_id,
                        existing,
                        ignored = total,
                        "total_pages already recorded, ignoring conflicting value"
                    );
                }
                Some(_) => {}
            }
        }
        if let Some(path) = &patch.output_path {
            self.output_path = Some(path.clone());
        }
        if let Some(kept) = patch.pages_kept {
            self.pages_kept = Some(kept);
        }
        if let Some(deleted) = patch.pages_deleted {
            self.pages_deleted = Some(deleted);
        }
        if let Some(error) = &patch.error {
            self.error = Some(error.clone());
        }
        if let Some(count) = patch.retry_count {
            self.retry_count = count;
        }
        if let Some(worker_ref) = &patch.worker_ref {
            self.worker_ref = Some(worker_ref.clone());
        }

        if self.status != JobStatus::Completed {
            self.output_path = None;
            self.pages_kept = None;
            self.pages_deleted = None;
        }
        if !matches!(self.status, JobStatus::Failed | JobStatus::Retrying) {
            self.error = None;
        }
        self.updated_at = now;

        Ok(())
    }
}

/// Partial update merged into a stored [`JobRecord`]. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub requested_pages: Option<Vec<u32>>,
    pub total_pages: Option<u32>,
    pub output_path: Option<PathBuf>,
    pub pages_kept: Option<u32>,
    pub pages_deleted: Option<u32>,
    pub error: Option<String>,
    pub retry_count: Option<u32>,
    pub worker_ref: Option<String>,
}

impl JobPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn requested_pages(mut self, pages: Vec<u32>) -> Self {
        self.requested_pages = Some(pages);
        self
    }

    pub fn total_pages(mut self, total: u32) -> Self {
        self.total_pages = Some(total);
        self
    }

    pub fn output(mut self, path: PathBuf, pages_kept: u32, pages_deleted: u32) -> Self {
        self.output_path = Some(path);
        self.pages_kept = Some(pages_kept);
        self.pages_deleted = Some(pages_deleted);
        self
    }

    pub fn page_counts(mut self, pages_kept: u32, pages_deleted: u32) -> Self {
        self.pages_kept = Some(pages_kept);
        self.pages_deleted = Some(pages_deleted);
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn retry_count(mut self, count: u32) -> Self {
        self.retry_count = Some(count);
        self
    }

    pub fn worker_ref(mut self, worker_ref: impl Into<String>) -> Self {
        self.worker_ref = Some(worker_ref.into());
        self
    }
}
