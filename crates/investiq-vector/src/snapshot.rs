//! On-disk snapshot of the knowledge base.
//!
//! Three artifacts live side by side in one directory:
//! - `index.bin`: the [`FlatL2Index`], bincode-encoded (floats stay bit-exact)
//! - `documents.json`: the [`DocumentStore`] as an ordered JSON array
//! - `files.json`: the ingested filenames as a sorted JSON array
//!
//! Every save rewrites all three. Each file is written to a temporary file in
//! the same directory and renamed into place, but the three renames are
//! independent, so a crash between them can leave a mixed snapshot. `load`
//! detects that case through the length check and refuses the snapshot.
//! There is no format version; changing any of these encodings is breaking.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use investiq_core::{Error, Result};

use crate::flat::FlatL2Index;
use crate::store::{DocumentStore, IngestionTracker};

pub const INDEX_FILE: &str = "index.bin";
pub const DOCUMENTS_FILE: &str = "documents.json";
pub const FILES_FILE: &str = "files.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPaths {
    pub index: PathBuf,
    pub documents: PathBuf,
    pub files: PathBuf,
}

impl SnapshotPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self { index: dir.join(INDEX_FILE), documents: dir.join(DOCUMENTS_FILE), files: dir.join(FILES_FILE) }
    }

    /// A snapshot exists once both the index and the document store are on disk.
    pub fn exists(&self) -> bool { self.index.is_file() && self.documents.is_file() }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub index: FlatL2Index,
    pub documents: DocumentStore,
    pub ingested: IngestionTracker,
}

pub fn save(dir: &Path, index: &FlatL2Index, documents: &DocumentStore, ingested: &IngestionTracker) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| Error::persistence(dir, e))?;
    let paths = SnapshotPaths::in_dir(dir);

    let index_bytes = bincode::serialize(index).map_err(|e| Error::persistence(&paths.index, e))?;
    write_atomic(&paths.index, &index_bytes)?;

    let doc_bytes = serde_json::to_vec(documents).map_err(|e| Error::persistence(&paths.documents, e))?;
    write_atomic(&paths.documents, &doc_bytes)?;

    let file_bytes = serde_json::to_vec(&ingested.sorted()).map_err(|e| Error::persistence(&paths.files, e))?;
    write_atomic(&paths.files, &file_bytes)?;

    info!(dir = %dir.display(), chunks = documents.len(), files = ingested.len(), "saved snapshot");
    Ok(())
}

/// Read a snapshot, or `Ok(None)` when none has been saved yet.
///
/// Either the whole snapshot loads and validates or an error is returned;
/// nothing is ever partially applied.
pub fn load(dir: &Path, expected_dim: usize) -> Result<Option<Snapshot>> {
    let paths = SnapshotPaths::in_dir(dir);
    if !paths.exists() {
        debug!(dir = %dir.display(), "no snapshot on disk");
        return Ok(None);
    }

    let index: FlatL2Index = bincode::deserialize(&read(&paths.index)?).map_err(|e| Error::persistence(&paths.index, e))?;
    if !index.is_well_formed() {
        return Err(Error::persistence(&paths.index, "vector buffer is not a whole number of rows"));
    }
    if index.dim() != expected_dim {
        return Err(Error::persistence(
            &paths.index,
            format!("index dimension {} does not match configured {}", index.dim(), expected_dim),
        ));
    }

    let documents: DocumentStore =
        serde_json::from_slice(&read(&paths.documents)?).map_err(|e| Error::persistence(&paths.documents, e))?;
    if documents.len() != index.len() {
        return Err(Error::persistence(
            &paths.documents,
            format!("{} documents for {} vectors", documents.len(), index.len()),
        ));
    }

    let ingested = if paths.files.is_file() {
        let files: Vec<String> =
            serde_json::from_slice(&read(&paths.files)?).map_err(|e| Error::persistence(&paths.files, e))?;
        files.into_iter().collect()
    } else {
        IngestionTracker::new()
    };

    info!(dir = %dir.display(), chunks = documents.len(), files = ingested.len(), "loaded snapshot");
    Ok(Some(Snapshot { index, documents, ingested }))
}

fn read(path: &Path) -> Result<Vec<u8>> { fs::read(path).map_err(|e| Error::persistence(path, e)) }

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::persistence(path, e))?;
    tmp.write_all(bytes).map_err(|e| Error::persistence(path, e))?;
    tmp.as_file().sync_all().map_err(|e| Error::persistence(path, e))?;
    tmp.persist(path).map_err(|e| Error::persistence(path, e.error))?;
    Ok(())
}
