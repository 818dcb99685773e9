//! Test harness for isolated test execution.
//!
//! The `TestHarness` struct wires a complete pdfedit service on a temporary
//! directory: SQLite database file, upload directory and queue. Jobs can be
//! executed one delivery at a time, or by a real worker pool.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use pdfedit::config::Config;
use pdfedit::db::Database;
use pdfedit::job::PageSet;
use pdfedit::transform::TransformOutput;
use pdfedit::{
    FileBlobStore, JobOutcome, JobQueue, JobRecord, JobRecordStore, LopdfTransform,
    PageTransform, PdfEditService, SqliteJobStore, SqliteQueue, TransformError,
};

use super::builders::{pdf_with_pages, ConfigBuilder};

/// Fails the first `failures` calls to `remove_pages` with a transient error,
/// then delegates to lopdf.
pub struct FlakyTransform {
    inner: LopdfTransform,
    failures_left: AtomicU32,
    calls: AtomicU32,
}

impl FlakyTransform {
    pub fn new(failures: u32) -> Self {
        Self {
            inner: LopdfTransform::new(),
            failures_left: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        }
    }

    pub fn remove_calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PageTransform for FlakyTransform {
    fn page_count(&self, path: &Path) -> Result<u32, TransformError> {
        self.inner.page_count(path)
    }

    fn remove_pages(
        &self,
        input: &Path,
        pages: &PageSet,
    ) -> Result<TransformOutput, TransformError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(TransformError::Pdf {
                path: input.to_path_buf(),
                reason: "simulated write failure".to_string(),
            });
        }
        self.inner.remove_pages(input, pages)
    }
}

/// Test harness providing isolated execution environment for integration tests.
pub struct TestHarness {
    /// Temporary directory holding the database and the uploads.
    temp_dir: TempDir,
    pub upload_dir: PathBuf,
    pub config: Config,
    pub store: Arc<SqliteJobStore>,
    pub queue: Arc<SqliteQueue>,
    pub service: PdfEditService,
}

impl TestHarness {
    /// Harness with the lopdf transform and default test settings.
    pub fn new() -> Self {
        Self::build(|b| b, Arc::new(LopdfTransform::new()))
    }

    pub fn with_transform(transform: Arc<dyn PageTransform>) -> Self {
        Self::build(|b| b, transform)
    }

    pub fn with_config(configure: impl FnOnce(ConfigBuilder) -> ConfigBuilder) -> Self {
        Self::build(configure, Arc::new(LopdfTransform::new()))
    }

    pub fn build(
        configure: impl FnOnce(ConfigBuilder) -> ConfigBuilder,
        transform: Arc<dyn PageTransform>,
    ) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = configure(ConfigBuilder::new(temp_dir.path())).build();
        let upload_dir = config.upload_path();

        let db = Database::open(&config.database_file()).expect("Failed to open database");
        let store = Arc::new(SqliteJobStore::new(db.clone(), config.key_prefix.clone()));
        let queue = Arc::new(SqliteQueue::new(
            db,
            config.queue.visibility_timeout(),
            config.queue.poll_interval(),
        ));
        let service = PdfEditService::from_parts(
            config.clone(),
            store.clone(),
            Arc::new(FileBlobStore::new(&upload_dir)),
            transform,
            queue.clone(),
        );

        Self {
            temp_dir,
            upload_dir,
            config,
            store,
            queue,
            service,
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Submits a generated PDF with `pages` pages.
    pub fn submit_pdf(&self, pages: u32) -> String {
        self.service
            .submit(&pdf_with_pages(pages), "document.pdf")
            .expect("Failed to submit PDF")
    }

    pub fn store_record(&self, job_id: &str) -> JobRecord {
        self.store.get(job_id).expect("Job record missing")
    }

    /// Runs the next deliverable message, if any.
    pub fn run_next(&self) -> Option<JobOutcome> {
        let delivery = self
            .queue
            .consume("harness", Duration::from_millis(200))
            .expect("Failed to consume from queue")?;
        let outcome = self
            .service
            .executor()
            .run(&delivery.request)
            .expect("Executor failed to record outcome");
        self.queue.ack(&delivery.message_id).expect("Failed to ack");
        Some(outcome)
    }

    /// Runs deliveries until the queue is empty. Returns the outcomes in order.
    pub fn drain(&self) -> Vec<JobOutcome> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.run_next() {
            outcomes.push(outcome);
            assert!(outcomes.len() < 50, "queue did not drain");
        }
        outcomes
    }
}
