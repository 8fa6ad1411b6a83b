use std::fs;
use std::path::Path;

use investiq_core::traits::TextExtractor;
use investiq_core::{Error, Result};

use crate::has_extension;

/// `.txt` and `.md` files. Invalid UTF-8 is decoded lossily rather than rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn supports(&self, path: &Path) -> bool { has_extension(path, &["txt", "md"]) }

    fn extract_text(&self, path: &Path) -> Result<String> {
        let bytes = fs::read(path).map_err(|e| Error::extraction(path, e))?;
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        };
        Ok(text.trim().to_string())
    }
}
