//! The knowledge base: vector index, document store and ingestion tracker
//! owned together, with explicit load/save.
//!
//! The snapshot is loaded lazily: the first `retrieve` or ingestion on a
//! knowledge base that has not been loaded reads it from disk.
//!
//! Concurrency contract: at most one ingestion (`ingest`, `ingest_upload`,
//! `sync_folder`) may be in flight at a time; callers sharing a
//! `KnowledgeBase` across threads must wrap it in a lock. Once loaded,
//! `retrieve_loaded` takes `&self` and is safe to run concurrently while
//! nothing is ingesting. There are no timeouts: a caller that abandons an
//! ingestion midway must not retry it blindly, because earlier files of a
//! sync may already be committed.

use std::path::{Path, PathBuf};

use indicatif::ProgressBar;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use investiq_core::chunker::ChunkingConfig;
use investiq_core::config::RagSettings;
use investiq_core::traits::{Embedder, TextExtractor};
use investiq_core::types::{Chunk, RetrievedChunk};
use investiq_core::{Error, Result};

use crate::flat::FlatL2Index;
use crate::snapshot;
use crate::store::{DocumentStore, IngestionTracker};

pub const DEFAULT_TOP_K: usize = 3;

/// Similarity score `1 - d²/2` for a distance `d` as returned by
/// [`FlatL2Index::search`], which is already the squared L2 distance.
///
/// Identical vectors score 1, orthogonal unit vectors -1. The score falls
/// monotonically with distance, so ordering by it matches nearest-first.
pub fn similarity_from_squared_l2(squared_distance: f32) -> f32 {
    1.0 - squared_distance * squared_distance / 2.0
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncFailure {
    pub filename: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Newly ingested files, in processing order.
    pub ingested: Vec<String>,
    /// Files skipped because they were already in the tracker.
    pub skipped: usize,
    /// Files that failed; they stay untracked and are retried next sync.
    pub failed: Vec<SyncFailure>,
    pub chunks_added: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnowledgeBaseStats {
    pub chunks: usize,
    pub files: usize,
    pub dimension: usize,
}

pub struct KnowledgeBase {
    index: FlatL2Index,
    documents: DocumentStore,
    ingested: IngestionTracker,
    embedder: Box<dyn Embedder>,
    snapshot_dir: PathBuf,
    bulk_chunking: ChunkingConfig,
    upload_chunking: ChunkingConfig,
    loaded: bool,
}

impl KnowledgeBase {
    /// An empty, not yet loaded knowledge base persisting to `snapshot_dir`.
    pub fn new(embedder: Box<dyn Embedder>, snapshot_dir: impl Into<PathBuf>, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::InvalidConfig("index dimension must be positive".to_string()));
        }
        if embedder.dim() != dimension {
            return Err(Error::DimensionMismatch { expected: dimension, actual: embedder.dim() });
        }
        Ok(Self {
            index: FlatL2Index::new(dimension),
            documents: DocumentStore::new(),
            ingested: IngestionTracker::new(),
            embedder,
            snapshot_dir: snapshot_dir.into(),
            bulk_chunking: ChunkingConfig::bulk_sync(),
            upload_chunking: ChunkingConfig::upload(),
            loaded: false,
        })
    }

    /// Build from `[rag]` settings; relative directories resolve against `base`.
    pub fn from_settings(settings: &RagSettings, base: &Path, embedder: Box<dyn Embedder>) -> Result<Self> {
        settings.validate()?;
        let kb = Self::new(embedder, settings.index_path(base), settings.dimension)?;
        Ok(kb.with_chunking(settings.bulk_chunking()?, settings.upload_chunking()?))
    }

    pub fn with_chunking(mut self, bulk: ChunkingConfig, upload: ChunkingConfig) -> Self {
        self.bulk_chunking = bulk;
        self.upload_chunking = upload;
        self
    }

    pub fn len(&self) -> usize { self.documents.len() }

    pub fn is_empty(&self) -> bool { self.documents.is_empty() }

    pub fn dimension(&self) -> usize { self.index.dim() }

    pub fn snapshot_dir(&self) -> &Path { &self.snapshot_dir }

    pub fn index(&self) -> &FlatL2Index { &self.index }

    pub fn documents(&self) -> &DocumentStore { &self.documents }

    pub fn ingested(&self) -> &IngestionTracker { &self.ingested }

    pub fn is_loaded(&self) -> bool { self.loaded }

    pub fn stats(&self) -> KnowledgeBaseStats {
        KnowledgeBaseStats { chunks: self.documents.len(), files: self.ingested.len(), dimension: self.index.dim() }
    }

    /// Replace the in-memory state with the snapshot on disk.
    ///
    /// Returns `Ok(false)` when no snapshot exists. On error the state is
    /// reset to empty, never left half-loaded.
    pub fn load(&mut self) -> Result<bool> {
        self.loaded = true;
        match snapshot::load(&self.snapshot_dir, self.index.dim()) {
            Ok(Some(snap)) => {
                self.index = snap.index;
                self.documents = snap.documents;
                self.ingested = snap.ingested;
                Ok(true)
            }
            Ok(None) => {
                self.reset();
                Ok(false)
            }
            Err(e) => {
                self.reset();
                Err(e)
            }
        }
    }

    /// Like [`load`](Self::load), but a broken snapshot only logs a warning
    /// and leaves a fresh, empty knowledge base.
    pub fn load_or_fresh(&mut self) -> bool {
        match self.load() {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "snapshot unreadable, starting with an empty index");
                false
            }
        }
    }

    /// Load the snapshot the first time this is called; later calls are no-ops.
    pub fn ensure_loaded(&mut self) {
        if !self.loaded { self.load_or_fresh(); }
    }

    pub fn save(&self) -> Result<()> {
        snapshot::save(&self.snapshot_dir, &self.index, &self.documents, &self.ingested)
    }

    /// Embed `chunks` and append them to the index and the document store in
    /// one step. Nothing is committed unless every vector is valid.
    pub fn ingest(&mut self, chunks: Vec<Chunk>) -> Result<usize> {
        self.ensure_loaded();
        self.ingest_inner(chunks, None)
    }

    /// Ad-hoc upload: chunk with the upload window, ingest, then save.
    /// Uploads bypass the ingestion tracker.
    pub fn ingest_upload(&mut self, text: &str, filename: &str) -> Result<usize> {
        self.ensure_loaded();
        let chunks = self.upload_chunking.chunk(text, filename);
        let added = self.ingest(chunks)?;
        self.save()?;
        info!(filename, chunks = added, "ingested upload");
        Ok(added)
    }

    pub fn sync_folder(&mut self, folder: &Path, extractor: &dyn TextExtractor) -> Result<SyncReport> {
        self.sync_folder_with_progress(folder, extractor, &ProgressBar::hidden())
    }

    /// Ingest every supported file directly inside `folder` that is not yet
    /// tracked, then save once. A file that fails is logged, reported and left
    /// untracked; the remaining files are still processed.
    pub fn sync_folder_with_progress(
        &mut self,
        folder: &Path,
        extractor: &dyn TextExtractor,
        progress: &ProgressBar,
    ) -> Result<SyncReport> {
        self.ensure_loaded();
        let candidates = list_documents(folder, extractor)?;
        progress.set_length(candidates.len() as u64);
        let mut report = SyncReport::default();
        for path in candidates {
            let filename = match path.file_name() {
                Some(name) => name.to_string_lossy().into_owned(),
                None => continue,
            };
            progress.set_message(filename.clone());
            if self.ingested.is_ingested(&filename) {
                report.skipped += 1;
            } else {
                match self.ingest_file(&path, &filename, extractor) {
                    Ok(added) => {
                        debug!(filename = %filename, chunks = added, "ingested file");
                        report.chunks_added += added;
                        report.ingested.push(filename);
                    }
                    Err(e) => {
                        warn!(filename = %filename, error = %e, "skipping file, will retry on next sync");
                        report.failed.push(SyncFailure { filename, reason: e.to_string() });
                    }
                }
            }
            progress.inc(1);
        }
        self.save()?;
        info!(
            folder = %folder.display(),
            ingested = report.ingested.len(),
            skipped = report.skipped,
            failed = report.failed.len(),
            chunks = report.chunks_added,
            "folder sync complete"
        );
        Ok(report)
    }

    /// Top `top_k` chunks for `query`, most similar first. Loads the snapshot
    /// first if this knowledge base has not been loaded yet.
    pub fn retrieve(&mut self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>> {
        self.ensure_loaded();
        self.retrieve_loaded(query, top_k)
    }

    /// Shared-reference retrieval over an already loaded knowledge base.
    ///
    /// An empty knowledge base returns no results without calling the
    /// embedder. Neighbor ids outside the document store are dropped.
    pub fn retrieve_loaded(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>> {
        if !self.loaded {
            return Err(Error::Operation("knowledge base queried before its snapshot was loaded".to_string()));
        }
        if self.documents.is_empty() { return Ok(Vec::new()); }
        let mut vectors = self.embedder.embed_batch(&[query.to_string()]).map_err(embedding_error)?;
        if vectors.len() != 1 {
            return Err(Error::Embedding(format!("expected one query vector, got {}", vectors.len())));
        }
        let query_vec = vectors.remove(0);
        let neighbors = self.index.search(&query_vec, top_k)?;
        let mut results = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            match self.documents.get(neighbor.id) {
                Some(chunk) => results.push(RetrievedChunk {
                    text: chunk.text.clone(),
                    source_filename: chunk.source_filename.clone(),
                    similarity: similarity_from_squared_l2(neighbor.distance),
                }),
                None => warn!(id = neighbor.id, documents = self.documents.len(), "neighbor outside document store, dropped"),
            }
        }
        Ok(results)
    }

    fn ingest_file(&mut self, path: &Path, filename: &str, extractor: &dyn TextExtractor) -> Result<usize> {
        let text = extractor.extract_text(path)?;
        let chunks = self.bulk_chunking.chunk(&text, filename);
        self.ingest_inner(chunks, Some(filename))
    }

    fn ingest_inner(&mut self, chunks: Vec<Chunk>, mark: Option<&str>) -> Result<usize> {
        let vectors = if chunks.is_empty() { Vec::new() } else { self.embed_chunks(&chunks)? };
        self.commit(chunks, vectors, mark)
    }

    fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).map_err(embedding_error)?;
        if vectors.len() != chunks.len() {
            return Err(Error::Embedding(format!("embedder returned {} vectors for {} chunks", vectors.len(), chunks.len())));
        }
        self.index.check_dims(&vectors)?;
        Ok(vectors)
    }

    fn commit(&mut self, chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>, mark: Option<&str>) -> Result<usize> {
        let added = chunks.len();
        self.index.add(&vectors)?;
        self.documents.append(chunks);
        if let Some(filename) = mark { self.ingested.mark_ingested(filename); }
        debug_assert_eq!(self.index.len(), self.documents.len());
        Ok(added)
    }

    fn reset(&mut self) {
        self.index = FlatL2Index::new(self.index.dim());
        self.documents = DocumentStore::new();
        self.ingested = IngestionTracker::new();
    }
}

fn embedding_error(e: anyhow::Error) -> Error { Error::Embedding(format!("{e:#}")) }

/// Supported regular files directly inside `folder`, in filename order.
fn list_documents(folder: &Path, extractor: &dyn TextExtractor) -> Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        return Err(Error::Operation(format!("knowledge folder {} is not a directory", folder.display())));
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(folder).min_depth(1).max_depth(1).sort_by_file_name() {
        match entry {
            Ok(entry) if entry.path().is_file() && extractor.supports(entry.path()) => files.push(entry.into_path()),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "unreadable entry in knowledge folder"),
        }
    }
    Ok(files)
}
