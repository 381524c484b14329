//! PDF to per-page text.

use std::panic::{AssertUnwindSafe, catch_unwind};

use mucklan_core::error::{MucklanError, Result};
use mucklan_core::traits::DocumentReader;

/// `DocumentReader` backed by `pdf-extract`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfReader;

impl PdfReader {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentReader for PdfReader {
    fn pages(&self, bytes: &[u8]) -> Result<Vec<String>> {
        if !bytes.starts_with(b"%PDF") {
            return Err(MucklanError::document("not a PDF (missing %PDF header)"));
        }
        // pdf-extract panics on some malformed files instead of returning an error.
        let extracted = catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(bytes)
        }))
        .map_err(|_| MucklanError::document("PDF parser panicked"))?;

        let pages = extracted.map_err(|e| MucklanError::document(format!("PDF read failed: {e}")))?;
        tracing::debug!("📄 Read {} page(s) from PDF ({} bytes)", pages.len(), bytes.len());
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_pdf() {
        let err = PdfReader::new().pages(b"GIF89a....").unwrap_err();
        assert!(matches!(err, MucklanError::Document(_)));
    }

    #[test]
    fn test_truncated_pdf_is_an_error() {
        let result = PdfReader::new().pages(b"%PDF-1.4\n%broken");
        assert!(matches!(result, Err(MucklanError::Document(_))));
    }
}
