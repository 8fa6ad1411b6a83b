//! investiq-text
//!
//! Text extraction for ingestion. Each extractor implements
//! [`investiq_core::traits::TextExtractor`]; [`DocumentExtractor`] dispatches
//! on file extension and is what folder sync uses.
pub mod pdf;
pub mod plain;

use std::path::Path;

use investiq_core::traits::TextExtractor;
use investiq_core::{Error, Result};

pub use pdf::PdfExtractor;
pub use plain::PlainTextExtractor;

pub(crate) fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|want| ext.eq_ignore_ascii_case(want)))
}

pub struct DocumentExtractor {
    pdf: PdfExtractor,
    plain: Option<PlainTextExtractor>,
}

impl DocumentExtractor {
    /// PDFs plus `.txt`/`.md`.
    pub fn new() -> Self { Self { pdf: PdfExtractor, plain: Some(PlainTextExtractor) } }

    /// PDFs only.
    pub fn pdf_only() -> Self { Self { pdf: PdfExtractor, plain: None } }
}

impl Default for DocumentExtractor {
    fn default() -> Self { Self::new() }
}

impl TextExtractor for DocumentExtractor {
    fn supports(&self, path: &Path) -> bool {
        self.pdf.supports(path) || self.plain.as_ref().is_some_and(|p| p.supports(path))
    }

    fn extract_text(&self, path: &Path) -> Result<String> {
        if self.pdf.supports(path) { return self.pdf.extract_text(path); }
        match &self.plain {
            Some(plain) if plain.supports(path) => plain.extract_text(path),
            _ => Err(Error::extraction(path, "unsupported document type")),
        }
    }
}
