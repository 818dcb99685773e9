//! Client-facing view of a job record.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::job::{JobPatch, JobRecord, JobStatus};
use crate::store::JobRecordStore;
use crate::transform::PageTransform;

const UNKNOWN_ERROR: &str = "unknown error";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusPayload {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages_kept: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages_deleted: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
}

pub fn download_url(job_id: &str) -> String {
    format!("/download/{}", job_id)
}

pub struct StatusProjector {
    store: Arc<dyn JobRecordStore>,
    transform: Arc<dyn PageTransform>,
}

impl StatusProjector {
    pub fn new(store: Arc<dyn JobRecordStore>, transform: Arc<dyn PageTransform>) -> Self {
        Self { store, transform }
    }

    pub fn project(&self, record: &JobRecord) -> StatusPayload {
        let mut payload = StatusPayload {
            job_id: record.job_id.clone(),
            status: record.status,
            total_pages: record.total_pages.or_else(|| self.backfill_total_pages(record)),
            pages_kept: None,
            pages_deleted: None,
            download_url: None,
            error: None,
            retry_count: None,
        };

        match record.status {
            JobStatus::Completed => {
                payload.pages_kept = Some(record.pages_kept.unwrap_or(0));
                payload.pages_deleted = Some(record.pages_deleted.unwrap_or(0));
                if record.output_path.as_deref().is_some_and(|p| p.is_file()) {
                    payload.download_url = Some(download_url(&record.job_id));
                }
            }
            JobStatus::Failed => {
                payload.error = Some(error_or_unknown(record));
            }
            JobStatus::Retrying => {
                payload.error = Some(error_or_unknown(record));
                payload.retry_count = Some(record.retry_count);
            }
            JobStatus::Uploaded | JobStatus::Processing => {}
        }

        payload
    }

    /// Reads the page count from the input when the record has none yet and
    /// writes it back. Any failure just leaves the count out.
    fn backfill_total_pages(&self, record: &JobRecord) -> Option<u32> {
        if !record.input_path.is_file() {
            return None;
        }

        let total = match self.transform.page_count(&record.input_path) {
            Ok(total) => total,
            Err(e) => {
                debug!(job_id = %record.job_id, "page count backfill failed: {}", e);
                return None;
            }
        };

        if let Err(e) = self
            .store
            .merge(&record.job_id, &JobPatch::new().total_pages(total))
        {
            debug!(job_id = %record.job_id, "could not store backfilled page count: {}", e);
        }
        Some(total)
    }
}

fn error_or_unknown(record: &JobRecord) -> String {
    record
        .error
        .clone()
        .unwrap_or_else(|| UNKNOWN_ERROR.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::store::SqliteJobStore;
    use crate::transform::pdf::test_support::build_pdf;
    use crate::transform::LopdfTransform;
    use tempfile::TempDir;

    fn projector() -> (Arc<SqliteJobStore>, StatusProjector) {
        let store = Arc::new(SqliteJobStore::with_default_prefix(
            Database::open_in_memory().unwrap(),
        ));
        let projector = StatusProjector::new(store.clone(), Arc::new(LopdfTransform::new()));
        (store, projector)
    }

    #[test]
    fn test_uploaded_backfills_total_pages() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.pdf");
        std::fs::write(&input, build_pdf(6)).unwrap();
        let (store, projector) = projector();
        let record = JobRecord::new("a", &input, "in.pdf");
        store.put(&record).unwrap();

        let payload = projector.project(&record);
        assert_eq!(payload.status, JobStatus::Uploaded);
        assert_eq!(payload.total_pages, Some(6));
        assert_eq!(store.get("a").unwrap().total_pages, Some(6));
    }

    #[test]
    fn test_backfill_without_input_is_skipped() {
        let (store, projector) = projector();
        let record = JobRecord::new("a", "/nonexistent/in.pdf", "in.pdf");
        store.put(&record).unwrap();

        let payload = projector.project(&record);
        assert_eq!(payload.total_pages, None);
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            serde_json::json!({"job_id": "a", "status": "uploaded"})
        );
    }

    #[test]
    fn test_completed_with_output() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("in_edit.pdf");
        std::fs::write(&output, build_pdf(2)).unwrap();
        let (_store, projector) = projector();

        let mut record = JobRecord::new("a", dir.path().join("in.pdf"), "in.pdf");
        record.status = JobStatus::Completed;
        record.total_pages = Some(3);
        record.output_path = Some(output);
        record.pages_kept = Some(2);
        record.pages_deleted = Some(1);

        let payload = projector.project(&record);
        assert_eq!(payload.total_pages, Some(3));
        assert_eq!(payload.pages_kept, Some(2));
        assert_eq!(payload.pages_deleted, Some(1));
        assert_eq!(payload.download_url.as_deref(), Some("/download/a"));
        assert_eq!(payload.error, None);
    }

    #[test]
    fn test_completed_without_artifact_has_no_download() {
        let (_store, projector) = projector();
        let mut record = JobRecord::new("a", "/nonexistent/in.pdf", "in.pdf");
        record.status = JobStatus::Completed;
        record.total_pages = Some(3);
        record.pages_kept = Some(3);
        record.pages_deleted = Some(0);

        let payload = projector.project(&record);
        assert_eq!(payload.pages_kept, Some(3));
        assert_eq!(payload.download_url, None);
    }

    #[test]
    fn test_failed_defaults_error() {
        let (_store, projector) = projector();
        let mut record = JobRecord::new("a", "/nonexistent/in.pdf", "in.pdf");
        record.status = JobStatus::Failed;

        assert_eq!(
            projector.project(&record).error.as_deref(),
            Some(UNKNOWN_ERROR)
        );
    }

    #[test]
    fn test_retrying_reports_error_and_count() {
        let (_store, projector) = projector();
        let mut record = JobRecord::new("a", "/nonexistent/in.pdf", "in.pdf");
        record.status = JobStatus::Retrying;
        record.error = Some("disk full".to_string());
        record.retry_count = 2;

        let payload = projector.project(&record);
        assert_eq!(payload.error.as_deref(), Some("disk full"));
        assert_eq!(payload.retry_count, Some(2));
    }
}
