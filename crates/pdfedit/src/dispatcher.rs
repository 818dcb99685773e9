//! Accepts uploads and processing requests.
//!
//! Metadata-only requests (no pages) are answered inline; page deletions are
//! handed to the queue and picked up by the worker pool.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::error::{PdfEditError, Result};
use crate::job::{JobPatch, JobRecord, JobStatus, PageSet};
use crate::queue::JobQueue;
use crate::storage::{blob_name, BlobStore};
use crate::store::JobRecordStore;
use crate::transform::PageTransform;
use crate::worker::JobRequest;

const PDF_MIME: &str = "application/pdf";

/// Immediate answer to a processing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingTicket {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages_kept: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages_deleted: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_pages: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_ref: Option<String>,
}

impl From<&JobRecord> for ProcessingTicket {
    fn from(record: &JobRecord) -> Self {
        Self {
            job_id: record.job_id.clone(),
            status: record.status,
            total_pages: record.total_pages,
            pages_kept: record.pages_kept,
            pages_deleted: record.pages_deleted,
            requested_pages: record.requested_pages.clone(),
            error: record.error.clone(),
            worker_ref: record.worker_ref.clone(),
        }
    }
}

pub struct Dispatcher {
    store: Arc<dyn JobRecordStore>,
    blobs: Arc<dyn BlobStore>,
    transform: Arc<dyn PageTransform>,
    queue: Arc<dyn JobQueue>,
    max_upload_bytes: u64,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn JobRecordStore>,
        blobs: Arc<dyn BlobStore>,
        transform: Arc<dyn PageTransform>,
        queue: Arc<dyn JobQueue>,
        max_upload_bytes: u64,
    ) -> Self {
        Self {
            store,
            blobs,
            transform,
            queue,
            max_upload_bytes,
        }
    }

    /// Stores an uploaded PDF and creates its record. Returns the new job id.
    pub fn submit(&self, content: &[u8], filename: &str) -> Result<String> {
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(PdfEditError::InvalidArgument(
                "no file selected".to_string(),
            ));
        }
        if !is_pdf_name(filename) {
            return Err(PdfEditError::InvalidArgument(format!(
                "unsupported file type '{}', only PDF files are accepted",
                filename
            )));
        }
        if content.len() as u64 > self.max_upload_bytes {
            return Err(PdfEditError::InvalidArgument(format!(
                "upload of {} bytes exceeds the limit of {} bytes",
                content.len(),
                self.max_upload_bytes
            )));
        }

        let extension = Path::new(filename)
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        let input_path = self.blobs.save(content, &extension)?;

        let job_id = Uuid::new_v4().to_string();
        let record = JobRecord::new(&job_id, &input_path, filename);
        if let Err(e) = self.store.put(&record) {
            if let Err(cleanup) = self.blobs.remove(&input_path) {
                warn!("failed to remove orphaned upload: {}", cleanup);
            }
            return Err(e.into());
        }

        info!(
            job_id = %job_id,
            file = %blob_name(&input_path),
            bytes = content.len(),
            "upload accepted"
        );
        Ok(job_id)
    }

    /// Validates a processing request and either answers it inline (no pages)
    /// or enqueues it.
    pub fn request_processing(&self, job_id: &str, pages: &[i64]) -> Result<ProcessingTicket> {
        let _span = info_span!("job.dispatch", job_id = %job_id).entered();

        let pages = PageSet::parse(pages)?;
        let record = self.store.get(job_id)?;

        if pages.is_empty() {
            return self.probe(record);
        }

        // A queued or retrying job already owns a message; a second one would
        // replace its pages and reset its retry budget.
        if record.status.is_in_flight() || !record.can_transition(JobStatus::Processing) {
            return Err(PdfEditError::InvalidState {
                job_id: job_id.to_string(),
                status: record.status,
            });
        }

        let record = self.store.merge(
            job_id,
            &JobPatch::new()
                .status(JobStatus::Processing)
                .requested_pages(pages.to_vec()),
        )?;

        let message_id = match self.queue.enqueue(&JobRequest::new(&record, &pages)) {
            Ok(id) => id,
            Err(e) => {
                warn!("enqueue failed: {}", e);
                let patch = JobPatch::new()
                    .status(JobStatus::Failed)
                    .error(format!("failed to schedule processing: {}", e));
                if let Err(merge_err) = self.store.merge(job_id, &patch) {
                    warn!("failed to mark job failed: {}", merge_err);
                }
                return Err(e.into());
            }
        };

        let record = match self
            .store
            .merge(job_id, &JobPatch::new().worker_ref(&message_id))
        {
            Ok(record) => record,
            // The worker may have settled or the client deleted the job already.
            Err(e) => {
                debug!("could not record worker_ref {}: {}", message_id, e);
                let mut record = record;
                record.worker_ref = Some(message_id.clone());
                record
            }
        };

        info!(
            pages = pages.len(),
            message_id = %message_id,
            "processing enqueued"
        );
        Ok(ProcessingTicket::from(&record))
    }

    /// Metadata-only request: reads the page count and settles the job inline.
    fn probe(&self, record: JobRecord) -> Result<ProcessingTicket> {
        let job_id = record.job_id.clone();
        if record.status.is_in_flight() || !record.can_transition(JobStatus::Completed) {
            return Err(PdfEditError::InvalidState {
                job_id,
                status: record.status,
            });
        }

        let patch = match self.transform.page_count(&record.input_path) {
            Ok(total) => JobPatch::new()
                .status(JobStatus::Completed)
                .total_pages(total)
                .page_counts(total, 0),
            Err(e) => {
                warn!("page count failed: {}", e);
                JobPatch::new()
                    .status(JobStatus::Failed)
                    .error(format!("error reading PDF page count: {}", e))
            }
        };

        let record = self.store.merge(&job_id, &patch)?;
        info!(status = %record.status, total_pages = ?record.total_pages, "metadata request answered");
        Ok(ProcessingTicket::from(&record))
    }

    /// Removes the record, its artifacts and any queued messages.
    pub fn delete(&self, job_id: &str) -> Result<()> {
        let record = self
            .store
            .remove_if(job_id, &|_: &JobRecord| true)?
            .ok_or_else(|| PdfEditError::NotFound(job_id.to_string()))?;

        self.blobs.remove_job_artifacts(&record);
        if let Err(e) = self.queue.purge_job(job_id) {
            warn!(job_id = %job_id, "failed to purge queued messages: {}", e);
        }

        info!(job_id = %job_id, "job deleted");
        Ok(())
    }

    /// Deletes every job. Returns how many were deleted.
    pub fn delete_all(&self) -> Result<usize> {
        let job_ids: Vec<String> = self.store.list()?.map(|(id, _)| id).collect();

        let mut deleted = 0;
        for job_id in job_ids {
            match self.delete(&job_id) {
                Ok(()) => deleted += 1,
                Err(PdfEditError::NotFound(_)) => {}
                Err(e) => warn!(job_id = %job_id, "failed to delete job: {}", e),
            }
        }
        Ok(deleted)
    }
}

fn is_pdf_name(filename: &str) -> bool {
    mime_guess::from_path(filename)
        .first()
        .map(|m| m.essence_str() == PDF_MIME)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::queue::SqliteQueue;
    use crate::storage::FileBlobStore;
    use crate::store::SqliteJobStore;
    use crate::transform::pdf::test_support::build_pdf;
    use crate::transform::LopdfTransform;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: Arc<SqliteJobStore>,
        queue: Arc<SqliteQueue>,
        dispatcher: Dispatcher,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        let store = Arc::new(SqliteJobStore::with_default_prefix(db.clone()));
        let queue = Arc::new(SqliteQueue::new(
            db,
            Duration::from_secs(60),
            Duration::from_millis(5),
        ));
        let dispatcher = Dispatcher::new(
            store.clone(),
            Arc::new(FileBlobStore::new(dir.path())),
            Arc::new(LopdfTransform::new()),
            queue.clone(),
            1024 * 1024,
        );
        Fixture {
            _dir: dir,
            store,
            queue,
            dispatcher,
        }
    }

    #[test]
    fn test_submit_creates_uploaded_record() {
        let fx = fixture();
        let job_id = fx.dispatcher.submit(&build_pdf(3), "Report.PDF").unwrap();

        assert!(Uuid::parse_str(&job_id).is_ok());
        let record = fx.store.get(&job_id).unwrap();
        assert_eq!(record.status, JobStatus::Uploaded);
        assert_eq!(record.original_name, "Report.PDF");
        assert!(record.input_path.exists());
        assert_ne!(record.input_path.file_name().unwrap(), "Report.PDF");
    }

    #[test]
    fn test_submit_rejects_bad_uploads() {
        let fx = fixture();
        for name in ["", "   ", "notes.txt", "pdf"] {
            assert!(
                matches!(
                    fx.dispatcher.submit(b"x", name),
                    Err(PdfEditError::InvalidArgument(_))
                ),
                "accepted {:?}",
                name
            );
        }

        let oversize = vec![0u8; 1024 * 1024 + 1];
        assert!(matches!(
            fx.dispatcher.submit(&oversize, "big.pdf"),
            Err(PdfEditError::InvalidArgument(_))
        ));
        assert_eq!(fx.store.list().unwrap().count(), 0);
    }

    #[test]
    fn test_metadata_request_completes_inline() {
        let fx = fixture();
        let job_id = fx.dispatcher.submit(&build_pdf(4), "a.pdf").unwrap();

        let ticket = fx.dispatcher.request_processing(&job_id, &[]).unwrap();
        assert_eq!(ticket.status, JobStatus::Completed);
        assert_eq!(ticket.total_pages, Some(4));
        assert_eq!(ticket.pages_kept, Some(4));
        assert_eq!(ticket.pages_deleted, Some(0));
        assert_eq!(fx.queue.pending().unwrap(), 0);

        // A probe completion can still be turned into a page deletion.
        let ticket = fx.dispatcher.request_processing(&job_id, &[2]).unwrap();
        assert_eq!(ticket.status, JobStatus::Processing);
        assert_eq!(ticket.total_pages, Some(4));
    }

    #[test]
    fn test_metadata_request_on_unreadable_pdf_fails_inline() {
        let fx = fixture();
        let job_id = fx.dispatcher.submit(b"not a pdf", "a.pdf").unwrap();

        let ticket = fx.dispatcher.request_processing(&job_id, &[]).unwrap();
        assert_eq!(ticket.status, JobStatus::Failed);
        assert!(ticket.error.unwrap().contains("page count"));
    }

    #[test]
    fn test_request_enqueues_and_records_worker_ref() {
        let fx = fixture();
        let job_id = fx.dispatcher.submit(&build_pdf(5), "a.pdf").unwrap();

        let ticket = fx
            .dispatcher
            .request_processing(&job_id, &[4, 2, 2])
            .unwrap();
        assert_eq!(ticket.status, JobStatus::Processing);
        assert_eq!(ticket.requested_pages, Some(vec![2, 4]));
        assert!(ticket.worker_ref.is_some());

        let record = fx.store.get(&job_id).unwrap();
        assert_eq!(record.worker_ref, ticket.worker_ref);

        let delivery = fx.queue.consume("w", Duration::ZERO).unwrap().unwrap();
        assert_eq!(delivery.message_id, ticket.worker_ref.unwrap());
        assert_eq!(delivery.request.pages, vec![2, 4]);
    }

    #[test]
    fn test_second_request_on_in_flight_job_is_rejected() {
        let fx = fixture();
        let job_id = fx.dispatcher.submit(&build_pdf(5), "a.pdf").unwrap();
        fx.dispatcher.request_processing(&job_id, &[1]).unwrap();

        for status in [JobStatus::Processing, JobStatus::Retrying] {
            let mut patch = JobPatch::new().status(status);
            if status == JobStatus::Retrying {
                patch = patch.error("write failed");
            }
            let before = fx.store.merge(&job_id, &patch).unwrap();

            let result = fx.dispatcher.request_processing(&job_id, &[2]);
            assert!(
                matches!(result, Err(PdfEditError::InvalidState { status: s, .. }) if s == status),
                "{:?}: {:?}",
                status,
                result
            );
            assert_eq!(fx.store.get(&job_id).unwrap(), before);
            assert_eq!(fx.queue.pending().unwrap(), 1);
        }
    }

    #[test]
    fn test_non_positive_page_is_rejected_without_mutation() {
        let fx = fixture();
        let job_id = fx.dispatcher.submit(&build_pdf(2), "a.pdf").unwrap();
        let before = fx.store.get(&job_id).unwrap();

        for pages in [&[0][..], &[1, -3][..]] {
            assert!(matches!(
                fx.dispatcher.request_processing(&job_id, pages),
                Err(PdfEditError::InvalidArgument(_))
            ));
        }
        assert_eq!(fx.store.get(&job_id).unwrap(), before);
        assert_eq!(fx.queue.pending().unwrap(), 0);
    }

    #[test]
    fn test_unknown_job() {
        let fx = fixture();
        assert!(matches!(
            fx.dispatcher.request_processing("missing", &[1]),
            Err(PdfEditError::NotFound(_))
        ));
    }

    #[test]
    fn test_failed_job_cannot_be_reprocessed() {
        let fx = fixture();
        let job_id = fx.dispatcher.submit(&build_pdf(2), "a.pdf").unwrap();
        fx.store
            .merge(
                &job_id,
                &JobPatch::new().status(JobStatus::Failed).error("boom"),
            )
            .unwrap();

        let result = fx.dispatcher.request_processing(&job_id, &[1]);
        assert!(matches!(
            result,
            Err(PdfEditError::InvalidState {
                status: JobStatus::Failed,
                ..
            })
        ));
    }

    #[test]
    fn test_delete_removes_record_artifacts_and_messages() {
        let fx = fixture();
        let job_id = fx.dispatcher.submit(&build_pdf(2), "a.pdf").unwrap();
        fx.dispatcher.request_processing(&job_id, &[1]).unwrap();
        let input = fx.store.get(&job_id).unwrap().input_path;

        fx.dispatcher.delete(&job_id).unwrap();

        assert!(!fx.store.exists(&job_id).unwrap());
        assert!(!input.exists());
        assert_eq!(fx.queue.pending().unwrap(), 0);
        assert!(matches!(
            fx.dispatcher.delete(&job_id),
            Err(PdfEditError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_all() {
        let fx = fixture();
        for _ in 0..3 {
            fx.dispatcher.submit(&build_pdf(1), "a.pdf").unwrap();
        }
        assert_eq!(fx.dispatcher.delete_all().unwrap(), 3);
        assert_eq!(fx.store.list().unwrap().count(), 0);
        assert_eq!(fx.dispatcher.delete_all().unwrap(), 0);
    }
}
