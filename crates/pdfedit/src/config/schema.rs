use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::store::DEFAULT_KEY_PREFIX;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub upload_directory: String,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub janitor: JanitorConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub clean_password: SecretConfig,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Config {
    /// Defaults for everything except the upload directory.
    pub fn with_upload_directory(upload_directory: impl Into<String>) -> Self {
        Self {
            version: "1.0".to_string(),
            upload_directory: upload_directory.into(),
            database_path: default_database_path(),
            key_prefix: default_key_prefix(),
            worker_count: default_worker_count(),
            max_upload_bytes: default_max_upload_bytes(),
            retry: RetryConfig::default(),
            janitor: JanitorConfig::default(),
            queue: QueueConfig::default(),
            clean_password: SecretConfig::default(),
            log_format: LogFormat::default(),
        }
    }

    pub fn upload_path(&self) -> PathBuf {
        PathBuf::from(&self.upload_directory)
    }

    pub fn database_file(&self) -> PathBuf {
        PathBuf::from(&self.database_path)
    }
}

fn default_database_path() -> String {
    crate::db::default_database_path()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| "pdfedit.db".to_string())
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_max_upload_bytes() -> u64 {
    16 * 1024 * 1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_secs() -> u64 {
    5
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JanitorConfig {
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_active_grace_secs")]
    pub active_grace_secs: u64,
}

fn default_retention_secs() -> u64 {
    24 * 60 * 60
}

fn default_interval_secs() -> u64 {
    24 * 60 * 60
}

fn default_active_grace_secs() -> u64 {
    60 * 60
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
            interval_secs: default_interval_secs(),
            active_grace_secs: default_active_grace_secs(),
        }
    }
}

impl JanitorConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn active_grace(&self) -> Duration {
        Duration::from_secs(self.active_grace_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_visibility_timeout_secs() -> u64 {
    600
}

fn default_poll_interval_ms() -> u64 {
    50
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            visibility_timeout_secs: default_visibility_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl QueueConfig {
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Where to find a shared secret. Resolved with [`crate::secrets::resolve_secret`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default = "default_password_env_var")]
    pub env_var: Option<String>,
}

fn default_password_env_var() -> Option<String> {
    Some("CLEAN_PASSWORD".to_string())
}

impl Default for SecretConfig {
    fn default() -> Self {
        Self {
            value: None,
            file: None,
            env_var: default_password_env_var(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}
