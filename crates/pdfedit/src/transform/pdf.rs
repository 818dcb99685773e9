use std::path::Path;

use lopdf::Document;

use super::{output_path_for, PageTransform, TransformError, TransformOutput};
use crate::job::PageSet;
use crate::storage::blob_name;

/// [`PageTransform`] backed by lopdf.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfTransform;

impl LopdfTransform {
    pub fn new() -> Self {
        Self
    }

    fn load(path: &Path) -> Result<Document, TransformError> {
        let bytes = std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TransformError::NotFound(path.to_path_buf())
            } else {
                TransformError::Io {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;

        Document::load_mem(&bytes).map_err(|e| TransformError::Pdf {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

impl PageTransform for LopdfTransform {
    fn page_count(&self, path: &Path) -> Result<u32, TransformError> {
        let _span = tracing::debug_span!("transform.page_count", file = %blob_name(path)).entered();
        let doc = Self::load(path)?;
        Ok(doc.get_pages().len() as u32)
    }

    fn remove_pages(
        &self,
        input: &Path,
        pages: &PageSet,
    ) -> Result<TransformOutput, TransformError> {
        let _span = tracing::info_span!(
            "transform.remove_pages",
            file = %blob_name(input),
            pages = pages.len()
        )
        .entered();

        let mut doc = Self::load(input)?;
        let total_pages = doc.get_pages().len() as u32;

        if let Some(page) = pages.as_slice().iter().copied().find(|&p| p > total_pages) {
            return Err(TransformError::InvalidPage {
                page,
                total: total_pages,
            });
        }

        let output_path = output_path_for(input);
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| TransformError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        doc.delete_pages(pages.as_slice());
        doc.save(&output_path).map_err(|e| TransformError::Pdf {
            path: output_path.clone(),
            reason: e.to_string(),
        })?;

        let pages_kept = total_pages - pages.len() as u32;
        tracing::debug!(total_pages, pages_kept, "pages removed");

        Ok(TransformOutput {
            output_path,
            total_pages,
            pages_kept,
        })
    }
}
