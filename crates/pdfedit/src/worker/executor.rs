//! Runs one delivered job attempt and interprets its outcome.
//!
//! [`JobExecutor::execute`] performs a single attempt and reports a typed
//! [`JobFailure`]; [`JobExecutor::run`] wraps it with the claim step and the
//! retry policy.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, info_span, warn};

use crate::config::RetryConfig;
use crate::error::PdfEditError;
use crate::job::{JobPatch, JobRecord, JobStatus};
use crate::queue::JobQueue;
use crate::storage::blob_name;
use crate::store::{JobRecordStore, StoreError};
use crate::transform::{PageTransform, TransformError};
use crate::worker::job::JobRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_secs(config.base_delay_secs))
    }

    /// Delay before re-running after the failure of zero-based `attempt`:
    /// `base_delay * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

/// Why an attempt did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobFailure {
    /// The request itself is bad (missing input, page out of range). Never retried.
    Input(String),
    /// Anything else that may succeed on a later attempt.
    Transient(String),
    /// The store accepted the completion write but does not read back `completed`.
    Consistency(String),
    /// The record disappeared while the attempt was running.
    Deleted,
}

impl From<TransformError> for JobFailure {
    fn from(err: TransformError) -> Self {
        if err.is_permanent() {
            JobFailure::Input(err.to_string())
        } else {
            JobFailure::Transient(err.to_string())
        }
    }
}

/// Final word on one delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(JobRecord),
    Retrying { record: JobRecord, delay: Duration },
    Failed(JobRecord),
    /// Duplicate delivery of a job that already settled; nothing was written.
    Skipped(JobRecord),
    /// The job was deleted; any produced output was removed.
    Discarded,
}

impl JobOutcome {
    pub fn status(&self) -> Option<JobStatus> {
        match self {
            JobOutcome::Completed(r) | JobOutcome::Failed(r) | JobOutcome::Skipped(r) => {
                Some(r.status)
            }
            JobOutcome::Retrying { record, .. } => Some(record.status),
            JobOutcome::Discarded => None,
        }
    }

    pub fn error(&self) -> Option<String> {
        match self {
            JobOutcome::Failed(r) => r.error.clone(),
            JobOutcome::Retrying { record, .. } => record.error.clone(),
            _ => None,
        }
    }
}

enum Claim {
    Ready,
    Settled(JobRecord),
    Gone,
}

pub struct JobExecutor {
    store: Arc<dyn JobRecordStore>,
    transform: Arc<dyn PageTransform>,
    queue: Arc<dyn JobQueue>,
    retry: RetryPolicy,
}

impl JobExecutor {
    pub fn new(
        store: Arc<dyn JobRecordStore>,
        transform: Arc<dyn PageTransform>,
        queue: Arc<dyn JobQueue>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            transform,
            queue,
            retry,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Claims the job, runs one attempt and applies the retry policy.
    ///
    /// `Err` means the outcome could not be recorded (store or queue
    /// unavailable); the delivery should be left unacked for redelivery.
    /// [`PdfEditError::Consistency`] is the exception: it is final.
    pub fn run(&self, request: &JobRequest) -> Result<JobOutcome, PdfEditError> {
        let _span = info_span!(
            "job.run",
            job_id = %request.job_id,
            attempt = request.attempt,
            file = %blob_name(&request.input_path)
        )
        .entered();

        match self.claim(request)? {
            Claim::Ready => {}
            Claim::Settled(record) => {
                debug!(status = %record.status, "job already settled, skipping delivery");
                return Ok(JobOutcome::Skipped(record));
            }
            Claim::Gone => {
                info!("job no longer exists, discarding delivery");
                return Ok(JobOutcome::Discarded);
            }
        }

        match self.execute(request) {
            Ok(record) => {
                info!(
                    total_pages = ?record.total_pages,
                    pages_kept = ?record.pages_kept,
                    "job completed"
                );
                Ok(JobOutcome::Completed(record))
            }
            Err(failure) => self.handle_failure(request, failure),
        }
    }

    /// Moves the record to `processing`, initializing it from the request
    /// when absent.
    ///
    /// An absent record whose input file is also gone was deleted; it is not
    /// recreated.
    fn claim(&self, request: &JobRequest) -> Result<Claim, PdfEditError> {
        let job_id = &request.job_id;
        match self.store.get(job_id) {
            Ok(record) if record.is_settled() => Ok(Claim::Settled(record)),
            Ok(_) => self.mark_processing(job_id),
            Err(StoreError::NotFound(_)) => {
                if !request.input_path.exists() {
                    return Ok(Claim::Gone);
                }
                if self.store.put_if_absent(&request.initial_record())? {
                    info!("initialized missing job record");
                    Ok(Claim::Ready)
                } else {
                    self.mark_processing(job_id)
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    fn mark_processing(&self, job_id: &str) -> Result<Claim, PdfEditError> {
        match self
            .store
            .merge(job_id, &JobPatch::new().status(JobStatus::Processing))
        {
            Ok(_) => Ok(Claim::Ready),
            Err(StoreError::NotFound(_)) => Ok(Claim::Gone),
            // Settled between the read and the merge.
            Err(StoreError::InvalidTransition { .. }) => match self.store.get(job_id) {
                Ok(record) => Ok(Claim::Settled(record)),
                Err(StoreError::NotFound(_)) => Ok(Claim::Gone),
                Err(e) => Err(e.into()),
            },
            Err(e) => Err(e.into()),
        }
    }

    /// One attempt on a claimed job. Returns the completed record.
    pub fn execute(&self, request: &JobRequest) -> Result<JobRecord, JobFailure> {
        let job_id = &request.job_id;
        let pages = request.page_set();

        let total_pages = match self.transform.page_count(&request.input_path) {
            Ok(total) => {
                match self.store.merge(job_id, &JobPatch::new().total_pages(total)) {
                    Ok(_) => {}
                    Err(StoreError::NotFound(_)) => return Err(JobFailure::Deleted),
                    Err(e) => warn!("failed to record total_pages: {}", e),
                }
                Ok(total)
            }
            Err(e) => {
                warn!("could not determine page count: {}", e);
                Err(e)
            }
        };

        if pages.is_empty() {
            let total = total_pages.map_err(JobFailure::from)?;
            let patch = JobPatch::new()
                .status(JobStatus::Completed)
                .total_pages(total)
                .page_counts(total, 0);
            return self.finish(job_id, &patch, None);
        }

        let output = self
            .transform
            .remove_pages(&request.input_path, &pages)
            .map_err(JobFailure::from)?;

        let patch = JobPatch::new()
            .status(JobStatus::Completed)
            .total_pages(output.total_pages)
            .output(
                output.output_path.clone(),
                output.pages_kept,
                pages.len() as u32,
            );
        self.finish(job_id, &patch, Some(&output.output_path))
    }

    fn finish(
        &self,
        job_id: &str,
        patch: &JobPatch,
        output_path: Option<&Path>,
    ) -> Result<JobRecord, JobFailure> {
        match self.store.merge(job_id, patch) {
            Ok(record) if record.status == JobStatus::Completed => Ok(record),
            Ok(record) => Err(JobFailure::Consistency(format!(
                "job '{}' reads {} after completion update",
                job_id, record.status
            ))),
            Err(StoreError::NotFound(_)) => {
                if let Some(path) = output_path {
                    remove_artifact(path);
                }
                Err(JobFailure::Deleted)
            }
            Err(StoreError::InvalidTransition { from, to, .. }) => {
                Err(JobFailure::Consistency(format!(
                    "job '{}' moved to {} during execution, cannot record {}",
                    job_id, from, to
                )))
            }
            Err(e) => Err(JobFailure::Transient(e.to_string())),
        }
    }

    fn handle_failure(
        &self,
        request: &JobRequest,
        failure: JobFailure,
    ) -> Result<JobOutcome, PdfEditError> {
        match failure {
            JobFailure::Deleted => {
                info!("job deleted during execution, result discarded");
                Ok(JobOutcome::Discarded)
            }
            JobFailure::Consistency(message) => {
                error!("{}", message);
                Err(PdfEditError::Consistency(message))
            }
            JobFailure::Input(message) => {
                warn!("job failed, not retrying: {}", message);
                self.fail(request, JobPatch::new().error(message))
            }
            JobFailure::Transient(message) => {
                let failures = request.attempt + 1;
                if failures >= self.retry.max_attempts {
                    warn!("job failed after {} attempts: {}", failures, message);
                    return self.fail(
                        request,
                        JobPatch::new()
                            .error(format!(
                                "processing failed after {} attempts: {}",
                                failures, message
                            ))
                            .retry_count(failures),
                    );
                }

                let delay = self.retry.delay_for(request.attempt);
                warn!(
                    retry_count = failures,
                    ?delay,
                    "job attempt failed, will retry: {}", message
                );

                let patch = JobPatch::new()
                    .status(JobStatus::Retrying)
                    .error(message)
                    .retry_count(failures);
                let record = match self.store.merge(&request.job_id, &patch) {
                    Ok(record) => record,
                    Err(StoreError::NotFound(_)) => return Ok(JobOutcome::Discarded),
                    Err(e) => return Err(e.into()),
                };

                let message_id = self.queue.enqueue_after(&request.next_attempt(), delay)?;
                let record = match self
                    .store
                    .merge(&request.job_id, &JobPatch::new().worker_ref(message_id))
                {
                    Ok(updated) => updated,
                    Err(e) => {
                        warn!("failed to record retry message id: {}", e);
                        record
                    }
                };

                Ok(JobOutcome::Retrying { record, delay })
            }
        }
    }

    fn fail(&self, request: &JobRequest, patch: JobPatch) -> Result<JobOutcome, PdfEditError> {
        match self
            .store
            .merge(&request.job_id, &patch.status(JobStatus::Failed))
        {
            Ok(record) => Ok(JobOutcome::Failed(record)),
            Err(StoreError::NotFound(_)) => Ok(JobOutcome::Discarded),
            Err(e) => Err(e.into()),
        }
    }
}

fn remove_artifact(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(file = %blob_name(path), "removed orphaned output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(file = %blob_name(path), "failed to remove orphaned output: {}", e),
    }
}
