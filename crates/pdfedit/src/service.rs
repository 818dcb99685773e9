//! One entry point for every client-facing operation.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use secrecy::SecretString;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::dispatcher::{Dispatcher, ProcessingTicket};
use crate::error::{PdfEditError, Result};
use crate::janitor::Janitor;
use crate::job::JobStatus;
use crate::queue::{JobQueue, SqliteQueue};
use crate::secrets::{resolve_secret_optional, secret_matches};
use crate::status::{StatusPayload, StatusProjector};
use crate::storage::{BlobStore, FileBlobStore};
use crate::store::{JobRecordStore, SqliteJobStore};
use crate::transform::{download_name_for, LopdfTransform, PageTransform};
use crate::worker::{JobExecutor, RetryPolicy};

/// Pattern of the files removed by [`PdfEditService::purge_uploads`].
const UPLOAD_PATTERN: &str = "*.pdf";

/// Where to read an edited document from and what to call it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRef {
    pub path: PathBuf,
    pub download_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub files_removed: usize,
    pub records_cleared: usize,
}

pub struct PdfEditService {
    config: Config,
    store: Arc<dyn JobRecordStore>,
    blobs: Arc<dyn BlobStore>,
    queue: Arc<dyn JobQueue>,
    dispatcher: Dispatcher,
    projector: StatusProjector,
    janitor: Arc<Janitor>,
    executor: Arc<JobExecutor>,
}

impl PdfEditService {
    /// Opens the shared database and wires the default implementations.
    pub fn open(config: Config) -> Result<Self> {
        let db = Database::open(&config.database_file())?;
        let store = Arc::new(SqliteJobStore::new(db.clone(), config.key_prefix.clone()));
        let queue = Arc::new(SqliteQueue::new(
            db,
            config.queue.visibility_timeout(),
            config.queue.poll_interval(),
        ));
        let blobs = Arc::new(FileBlobStore::new(config.upload_path()));
        let transform = Arc::new(LopdfTransform::new());

        info!(
            workers = config.worker_count,
            "pdfedit service opened"
        );
        Ok(Self::from_parts(config, store, blobs, transform, queue))
    }

    pub fn from_parts(
        config: Config,
        store: Arc<dyn JobRecordStore>,
        blobs: Arc<dyn BlobStore>,
        transform: Arc<dyn PageTransform>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        let dispatcher = Dispatcher::new(
            Arc::clone(&store),
            Arc::clone(&blobs),
            Arc::clone(&transform),
            Arc::clone(&queue),
            config.max_upload_bytes,
        );
        let projector = StatusProjector::new(Arc::clone(&store), Arc::clone(&transform));
        let janitor = Arc::new(Janitor::from_config(
            Arc::clone(&store),
            Arc::clone(&blobs),
            &config.janitor,
        ));
        let executor = Arc::new(JobExecutor::new(
            Arc::clone(&store),
            transform,
            Arc::clone(&queue),
            RetryPolicy::from_config(&config.retry),
        ));

        Self {
            config,
            store,
            blobs,
            queue,
            dispatcher,
            projector,
            janitor,
            executor,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn executor(&self) -> Arc<JobExecutor> {
        Arc::clone(&self.executor)
    }

    pub fn queue(&self) -> Arc<dyn JobQueue> {
        Arc::clone(&self.queue)
    }

    pub fn janitor(&self) -> Arc<Janitor> {
        Arc::clone(&self.janitor)
    }

    pub fn submit(&self, content: &[u8], filename: &str) -> Result<String> {
        self.dispatcher.submit(content, filename)
    }

    pub fn request_processing(&self, job_id: &str, pages: &[i64]) -> Result<ProcessingTicket> {
        self.dispatcher.request_processing(job_id, pages)
    }

    pub fn get_status(&self, job_id: &str) -> Result<StatusPayload> {
        let record = self.store.get(job_id)?;
        Ok(self.projector.project(&record))
    }

    /// The edited document of a completed job.
    pub fn download_ref(&self, job_id: &str) -> Result<DownloadRef> {
        let record = self.store.get(job_id)?;
        if record.status != JobStatus::Completed {
            return Err(PdfEditError::Unavailable(job_id.to_string()));
        }
        match record.output_path {
            Some(path) if self.blobs.exists(&path) => Ok(DownloadRef {
                path,
                download_name: download_name_for(&record.original_name),
            }),
            _ => Err(PdfEditError::Unavailable(job_id.to_string())),
        }
    }

    pub fn delete(&self, job_id: &str) -> Result<()> {
        self.dispatcher.delete(job_id)
    }

    pub fn delete_all(&self) -> Result<usize> {
        self.dispatcher.delete_all()
    }

    /// Runs a janitor sweep now. Returns the removed job ids.
    pub fn sweep_now(&self) -> Result<Vec<String>> {
        Ok(self.janitor.sweep(Utc::now())?)
    }

    /// Removes every uploaded and edited PDF and clears all job records.
    ///
    /// `password` must match the configured clean password.
    pub fn purge_uploads(&self, password: &str) -> Result<PurgeReport> {
        let source = &self.config.clean_password;
        let secret: SecretString = resolve_secret_optional(
            source.value.as_deref(),
            source.file.as_deref(),
            source.env_var.as_deref(),
        )?
        .ok_or_else(|| {
            PdfEditError::Configuration("clean password is not configured".to_string())
        })?;

        if !secret_matches(&secret, password) {
            warn!("upload purge rejected: password mismatch");
            return Err(PdfEditError::Unauthorized);
        }

        let files_removed = self.blobs.purge(UPLOAD_PATTERN)?;
        let records_cleared = self.store.clear()?;

        info!(files_removed, records_cleared, "uploads purged");
        Ok(PurgeReport {
            files_removed,
            records_cleared,
        })
    }
}
