use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::job::{JobRecord, JobStatus, PageSet};

/// Queue payload: everything a worker needs to run one attempt, even if the
/// record has to be re-initialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub job_id: String,
    pub input_path: PathBuf,
    pub original_name: String,
    #[serde(default)]
    pub pages: Vec<u32>,
    /// Zero-based attempt index. Redeliveries scheduled by the retry policy
    /// carry the next index.
    #[serde(default)]
    pub attempt: u32,
}

impl JobRequest {
    pub fn new(record: &JobRecord, pages: &PageSet) -> Self {
        Self {
            job_id: record.job_id.clone(),
            input_path: record.input_path.clone(),
            original_name: record.original_name.clone(),
            pages: pages.to_vec(),
            attempt: 0,
        }
    }

    pub fn page_set(&self) -> PageSet {
        PageSet::from_pages(self.pages.iter().copied())
    }

    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }

    /// Record used when a worker claims a job whose record is absent.
    pub fn initial_record(&self) -> JobRecord {
        let mut record = JobRecord::new(&self.job_id, &self.input_path, &self.original_name);
        record.status = JobStatus::Processing;
        if !self.pages.is_empty() {
            record.requested_pages = Some(self.pages.clone());
        }
        record.retry_count = self.attempt;
        record
    }
}

/// What a worker reports after handling one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub job_id: String,
    pub attempt: u32,
    /// Status the record was left in, or `None` when the delivery was
    /// discarded because the job no longer exists.
    pub status: Option<JobStatus>,
    pub error: Option<String>,
}

impl JobResult {
    pub fn new(request: &JobRequest, status: Option<JobStatus>, error: Option<String>) -> Self {
        Self {
            job_id: request.job_id.clone(),
            attempt: request.attempt,
            status,
            error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Some(JobStatus::Completed)
    }
}
