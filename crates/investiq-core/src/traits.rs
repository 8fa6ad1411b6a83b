use std::path::Path;

pub trait Embedder: Send + Sync {
    /// Width of every vector this embedder returns.
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    /// One vector per input text, in input order.
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

pub trait TextExtractor: Send + Sync {
    /// Whether bulk sync should consider this file at all.
    fn supports(&self, path: &Path) -> bool;
    fn extract_text(&self, path: &Path) -> crate::Result<String>;
}
