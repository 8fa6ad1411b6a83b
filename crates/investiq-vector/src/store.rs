use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use investiq_core::types::Chunk;

/// Chunks in ingestion order; position `i` pairs with vector `i` of the index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentStore {
    entries: Vec<Chunk>,
}

impl DocumentStore {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn get(&self, position: usize) -> Option<&Chunk> { self.entries.get(position) }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk> { self.entries.iter() }

    pub(crate) fn append(&mut self, chunks: Vec<Chunk>) { self.entries.extend(chunks); }
}

/// Filenames whose chunks are already in the index. Guards bulk sync only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestionTracker {
    files: HashSet<String>,
}

impl IngestionTracker {
    pub fn new() -> Self { Self::default() }

    pub fn mark_ingested(&mut self, filename: impl Into<String>) -> bool { self.files.insert(filename.into()) }

    pub fn is_ingested(&self, filename: &str) -> bool { self.files.contains(filename) }

    pub fn len(&self) -> usize { self.files.len() }

    pub fn is_empty(&self) -> bool { self.files.is_empty() }

    /// Filenames in lexical order.
    pub fn sorted(&self) -> Vec<String> {
        let mut files: Vec<String> = self.files.iter().cloned().collect();
        files.sort();
        files
    }
}

impl FromIterator<String> for IngestionTracker {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self { Self { files: iter.into_iter().collect() } }
}
