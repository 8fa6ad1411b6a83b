//! Fixed-size character windowing.
//!
//! Documents are cut into consecutive, non-overlapping windows of N Unicode
//! scalar values. Bulk folder sync and ad-hoc uploads use different window
//! sizes; both are carried by [`ChunkingConfig`] rather than hard-coded.

use crate::error::{Error, Result};
use crate::types::Chunk;

pub const BULK_SYNC_WINDOW_CHARS: usize = 300;
pub const UPLOAD_WINDOW_CHARS: usize = 800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    window_chars: usize,
}

impl ChunkingConfig {
    pub fn new(window_chars: usize) -> Result<Self> {
        if window_chars == 0 {
            return Err(Error::InvalidConfig("chunk window must be at least one character".to_string()));
        }
        Ok(Self { window_chars })
    }

    pub fn bulk_sync() -> Self { Self { window_chars: BULK_SYNC_WINDOW_CHARS } }

    pub fn upload() -> Self { Self { window_chars: UPLOAD_WINDOW_CHARS } }

    pub fn window_chars(&self) -> usize { self.window_chars }

    /// Split `text` into windows of at most `window_chars` characters.
    /// Only the last window may be shorter. Empty text yields no windows.
    pub fn split(&self, text: &str) -> Vec<String> {
        let mut windows = Vec::new();
        let mut start = 0usize;
        let mut count = 0usize;
        for (byte_idx, _) in text.char_indices() {
            if count == self.window_chars {
                windows.push(text[start..byte_idx].to_string());
                start = byte_idx;
                count = 0;
            }
            count += 1;
        }
        if start < text.len() {
            windows.push(text[start..].to_string());
        }
        windows
    }

    pub fn chunk(&self, text: &str, source_filename: &str) -> Vec<Chunk> {
        self.split(text).into_iter().map(|window| Chunk::new(window, source_filename)).collect()
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self { Self::bulk_sync() }
}
