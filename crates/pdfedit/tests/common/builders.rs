//! Builders for test configurations and PDF fixtures.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use lopdf::{dictionary, Document, Object};
use pdfedit::config::{Config, JanitorConfig, QueueConfig, RetryConfig};

/// Builder for creating `Config` instances.
pub struct ConfigBuilder {
    upload_directory: PathBuf,
    database_path: PathBuf,
    worker_count: usize,
    max_upload_bytes: u64,
    retry: RetryConfig,
    janitor: JanitorConfig,
    clean_password: Option<String>,
}

impl ConfigBuilder {
    /// Sensible defaults for tests: one worker and no retry delay.
    pub fn new(base: &Path) -> Self {
        Self {
            upload_directory: base.join("uploads"),
            database_path: base.join("pdfedit.db"),
            worker_count: 1,
            max_upload_bytes: 16 * 1024 * 1024,
            retry: RetryConfig {
                max_attempts: 3,
                base_delay_secs: 0,
            },
            janitor: JanitorConfig::default(),
            clean_password: None,
        }
    }

    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.retry.max_attempts = attempts;
        self
    }

    pub fn retention_secs(mut self, secs: u64) -> Self {
        self.janitor.retention_secs = secs;
        self
    }

    pub fn active_grace_secs(mut self, secs: u64) -> Self {
        self.janitor.active_grace_secs = secs;
        self
    }

    pub fn clean_password(mut self, password: &str) -> Self {
        self.clean_password = Some(password.to_string());
        self
    }

    pub fn build(self) -> Config {
        let mut config =
            Config::with_upload_directory(self.upload_directory.to_string_lossy().into_owned());
        config.database_path = self.database_path.to_string_lossy().into_owned();
        config.worker_count = self.worker_count;
        config.max_upload_bytes = self.max_upload_bytes;
        config.retry = self.retry;
        config.janitor = self.janitor;
        config.queue = QueueConfig {
            visibility_timeout_secs: 60,
            poll_interval_ms: 5,
        };
        config.clean_password.value = self.clean_password;
        config.clean_password.env_var = None;
        config
    }
}

/// Builds an N-page PDF whose page N has a MediaBox width of `100 + N`.
pub fn pdf_with_pages(page_count: u32) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let kids: Vec<Object> = (1..=page_count)
        .map(|n| {
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), (100 + i64::from(n)).into(), 200.into()],
            })
            .into()
        })
        .collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => i64::from(page_count),
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("Failed to serialize test PDF");
    bytes
}

/// Original page numbers of every page in a PDF built by [`pdf_with_pages`].
pub fn original_pages(path: &Path) -> Vec<i64> {
    let doc = Document::load(path).expect("Failed to load output PDF");
    doc.get_pages()
        .values()
        .map(|id| {
            let page = doc.get_object(*id).unwrap().as_dict().unwrap();
            let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
            media_box[2].as_i64().unwrap() - 100
        })
        .collect()
}
