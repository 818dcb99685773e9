pub mod config;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod janitor;
pub mod job;
pub mod queue;
pub mod secrets;
pub mod service;
pub mod status;
pub mod storage;
pub mod store;
pub mod telemetry;
pub mod transform;
pub mod worker;

pub use config::{load_config, Config, LogFormat};
pub use dispatcher::{Dispatcher, ProcessingTicket};
pub use error::{ConfigError, PdfEditError, Result, StorageError};
pub use janitor::{Janitor, JanitorScheduler};
pub use job::{JobPatch, JobRecord, JobStatus, PageSet};
pub use queue::{JobQueue, SqliteQueue};
pub use service::{DownloadRef, PdfEditService, PurgeReport};
pub use status::{StatusPayload, StatusProjector};
pub use storage::{BlobStore, FileBlobStore};
pub use store::{JobRecordStore, SqliteJobStore, StoreError};
pub use transform::{LopdfTransform, PageTransform, TransformError};
pub use worker::{JobExecutor, JobOutcome, JobRequest, RetryPolicy, WorkerPool};
