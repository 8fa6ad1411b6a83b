//! Domain types shared by the index, the retriever and the extractors.

use serde::{Deserialize, Serialize};

/// A bounded slice of a source document's text together with its provenance.
///
/// Chunks are immutable once created; the document store owns them after
/// ingestion and never rewrites them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source_filename: String,
}

impl Chunk {
    pub fn new(text: impl Into<String>, source_filename: impl Into<String>) -> Self {
        Self { text: text.into(), source_filename: source_filename.into() }
    }
}

/// One ranked retrieval result.
///
/// `similarity` is `1 - d²/2` where `d` is the squared L2 distance reported
/// by the index. It ranges down to -1 for orthogonal unit vectors and is not
/// a cosine similarity. Higher is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub source_filename: String,
    pub similarity: f32,
}
