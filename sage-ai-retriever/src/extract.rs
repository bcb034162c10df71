//! Text extraction boundary.
//!
//! Document parsing is an external concern. The pipeline only needs raw
//! text plus a source identifier, so the trait here is the whole contract;
//! the built-in implementation handles plain-text formats and anything
//! richer (PDF, DOCX, OCR) can slot in behind the same trait.

use std::path::Path;

use async_trait::async_trait;

use crate::error::{KnowledgeError, Result};

/// Extensions the built-in extractor accepts.
pub const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "rst"];

/// Files larger than this are rejected rather than chunked. A megabyte of
/// plain text is far beyond any personal document worth indexing whole.
pub const MAX_FILE_BYTES: u64 = 1 << 20;

/// Turns a file into raw text for chunking.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Whether this extractor handles the given path at all.
    fn supports(&self, path: &Path) -> bool;

    /// Read and decode the file. Fails with `UnsupportedFormat` for paths
    /// `supports` rejects and `Extraction` for unreadable or binary files.
    async fn extract(&self, path: &Path) -> Result<String>;
}

/// Extractor for UTF-8 plain-text formats.
#[derive(Debug, Clone, Default)]
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    fn supports(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                TEXT_EXTENSIONS.contains(&ext.as_str())
            })
            .unwrap_or(false)
    }

    async fn extract(&self, path: &Path) -> Result<String> {
        if !self.supports(path) {
            return Err(KnowledgeError::unsupported_format(path));
        }

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| KnowledgeError::extraction(path, e))?;
        if metadata.len() > MAX_FILE_BYTES {
            return Err(KnowledgeError::extraction(
                path,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("file is {} bytes, larger than the {MAX_FILE_BYTES} byte limit", metadata.len()),
                ),
            ));
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| KnowledgeError::extraction(path, e))?;
        if bytes.contains(&0) {
            return Err(KnowledgeError::extraction(
                path,
                std::io::Error::new(std::io::ErrorKind::InvalidData, "file contains binary data"),
            ));
        }
        String::from_utf8(bytes).map_err(|e| {
            KnowledgeError::extraction(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })
    }
}
