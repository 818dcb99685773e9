//! Page-count and page-removal routine behind a trait.

pub mod pdf;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::job::PageSet;

pub use pdf::LopdfTransform;

/// Inserted before the extension of the input file to name the output.
pub const OUTPUT_SUFFIX: &str = "_edit";

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Input file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid page number {page}. PDF has {total} pages")]
    InvalidPage { page: u32, total: u32 },

    #[error("Failed to process PDF '{path}': {reason}")]
    Pdf { path: PathBuf, reason: String },

    #[error("IO error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TransformError {
    /// Permanent errors are caused by the request itself and are never retried.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            TransformError::NotFound(_) | TransformError::InvalidPage { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutput {
    pub output_path: PathBuf,
    pub total_pages: u32,
    pub pages_kept: u32,
}

pub trait PageTransform: Send + Sync {
    fn page_count(&self, path: &Path) -> Result<u32, TransformError>;

    /// Writes a copy of `input` without `pages` to [`output_path_for`]`(input)`.
    ///
    /// Callers never pass an empty set.
    fn remove_pages(&self, input: &Path, pages: &PageSet)
        -> Result<TransformOutput, TransformError>;
}

/// `dir/name.pdf` becomes `dir/name_edit.pdf`.
pub fn output_path_for(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{}{}.{}", stem, OUTPUT_SUFFIX, ext.to_string_lossy()),
        None => format!("{}{}", stem, OUTPUT_SUFFIX),
    };
    input.with_file_name(name)
}

/// Client-facing download name derived from the original upload name.
pub fn download_name_for(original_name: &str) -> String {
    output_path_for(Path::new(original_name))
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("document{}.pdf", OUTPUT_SUFFIX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_inserts_suffix() {
        assert_eq!(
            output_path_for(Path::new("/uploads/abc.pdf")),
            PathBuf::from("/uploads/abc_edit.pdf")
        );
        assert_eq!(
            output_path_for(Path::new("relative/file.tar.pdf")),
            PathBuf::from("relative/file.tar_edit.pdf")
        );
        assert_eq!(
            output_path_for(Path::new("/uploads/noext")),
            PathBuf::from("/uploads/noext_edit")
        );
    }

    #[test]
    fn test_download_name() {
        assert_eq!(download_name_for("Report 2024.pdf"), "Report 2024_edit.pdf");
        assert_eq!(download_name_for(""), "document_edit.pdf");
    }

    #[test]
    fn test_error_classification() {
        assert!(TransformError::NotFound(PathBuf::from("x")).is_permanent());
        assert!(TransformError::InvalidPage { page: 9, total: 3 }.is_permanent());
        assert!(!TransformError::Pdf {
            path: PathBuf::from("x"),
            reason: "broken xref".to_string()
        }
        .is_permanent());
    }
}
