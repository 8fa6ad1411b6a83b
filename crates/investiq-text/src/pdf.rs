use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use tracing::debug;

use investiq_core::traits::TextExtractor;
use investiq_core::{Error, Result};

use crate::has_extension;

/// Extracts the text layer of every page, concatenated and trimmed.
///
/// pdf-extract panics on some malformed inputs; the panic is contained and
/// reported as an extraction error so a bad file never takes down a sync.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn supports(&self, path: &Path) -> bool { has_extension(path, &["pdf"]) }

    fn extract_text(&self, path: &Path) -> Result<String> {
        if !path.is_file() { return Err(Error::extraction(path, "not a readable file")); }
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text(path)));
        match outcome {
            Ok(Ok(text)) => {
                debug!(path = %path.display(), chars = text.len(), "extracted pdf text");
                Ok(text.trim().to_string())
            }
            Ok(Err(e)) => Err(Error::extraction(path, e)),
            Err(_) => Err(Error::extraction(path, "pdf parser panicked")),
        }
    }
}
