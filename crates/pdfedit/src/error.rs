use std::path::PathBuf;
use thiserror::Error;

use crate::db::DatabaseError;
use crate::job::{JobStatus, PageSetError};
use crate::queue::QueueError;
use crate::secrets::SecretError;
use crate::store::StoreError;
use crate::transform::TransformError;

#[derive(Error, Debug)]
pub enum PdfEditError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Job '{job_id}' cannot be processed while {status}")]
    InvalidState { job_id: String, status: JobStatus },

    #[error("Output of job '{0}' is not available")]
    Unavailable(String),

    #[error("Password mismatch, not allowed to clean uploads")]
    Unauthorized,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Store consistency error: {0}")]
    Consistency(String),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Secret error: {0}")]
    Secret(#[from] SecretError),
}

impl From<StoreError> for PdfEditError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(job_id) => PdfEditError::NotFound(job_id),
            StoreError::InvalidTransition { job_id, from, .. } => PdfEditError::InvalidState {
                job_id,
                status: from,
            },
            other => PdfEditError::Store(other),
        }
    }
}

impl From<PageSetError> for PdfEditError {
    fn from(err: PageSetError) -> Self {
        PdfEditError::InvalidArgument(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove file '{path}': {source}")]
    RemoveFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid glob pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("File already exists: {0}")]
    FileExists(PathBuf),
}

pub type Result<T> = std::result::Result<T, PdfEditError>;
