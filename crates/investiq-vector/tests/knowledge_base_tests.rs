use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use investiq_core::traits::{Embedder, TextExtractor};
use investiq_core::types::Chunk;
use investiq_core::Error;
use investiq_embed::FakeEmbedder;
use investiq_vector::snapshot::{self, SnapshotPaths};
use investiq_vector::{ContextDecision, KnowledgeBase, RelevancePolicy};
use tempfile::TempDir;

const DIM: usize = 384;

/// Counts `embed_batch` calls and the texts passed through them.
struct CountingEmbedder { inner: FakeEmbedder, calls: Arc<AtomicUsize> }

impl Embedder for CountingEmbedder {
    fn dim(&self) -> usize { self.inner.dim() }
    fn max_len(&self) -> usize { self.inner.max_len() }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed_batch(texts)
    }
}

fn counting_embedder() -> (Box<dyn Embedder>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    (Box::new(CountingEmbedder { inner: FakeEmbedder::new(DIM), calls: Arc::clone(&calls) }), calls)
}

/// Three axes: company earnings vocabulary, macro/rates vocabulary, everything else.
struct KeywordEmbedder;

impl Embedder for KeywordEmbedder {
    fn dim(&self) -> usize { 3 }
    fn max_len(&self) -> usize { 64 }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| {
            let mut v = vec![0f32; 3];
            for word in text.split_whitespace() {
                let word: String = word.chars().filter(|c| c.is_alphanumeric()).collect::<String>().to_lowercase();
                let axis = match word.as_str() {
                    "apple" | "earnings" | "profits" | "record" => 0,
                    "fed" | "interest" | "rates" | "raised" => 1,
                    _ => 2,
                };
                v[axis] += 1.0;
            }
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
            v.iter().map(|x| x / norm).collect()
        }).collect())
    }
}

/// Reads `.txt` files; any file whose content starts with `CORRUPT` fails.
struct TxtExtractor;

impl TextExtractor for TxtExtractor {
    fn supports(&self, path: &Path) -> bool { path.extension().is_some_and(|e| e == "txt") }
    fn extract_text(&self, path: &Path) -> investiq_core::Result<String> {
        let text = fs::read_to_string(path).map_err(|e| Error::extraction(path, e))?;
        if text.starts_with("CORRUPT") { return Err(Error::extraction(path, "corrupt document")); }
        Ok(text)
    }
}

fn chunks(file: &str, texts: &[&str]) -> Vec<Chunk> {
    texts.iter().map(|t| Chunk::new(*t, file)).collect()
}

#[test]
fn apple_query_ranks_earnings_chunk_first() {
    let tmp = TempDir::new().unwrap();
    let mut kb = KnowledgeBase::new(Box::new(KeywordEmbedder), tmp.path(), 3).expect("kb");
    kb.ingest(chunks("a.pdf", &["Apple reported record profits", "The Fed raised interest rates"])).expect("ingest");

    let results = kb.retrieve("Did Apple have good earnings?", 3).expect("retrieve");
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].text, "Apple reported record profits");
    assert_eq!(results[0].source_filename, "a.pdf");
    assert!(results[0].similarity > results[1].similarity);
    assert!(RelevancePolicy::default().assess(&results).is_trusted());
}

#[test]
fn two_ingestions_stay_aligned() {
    let tmp = TempDir::new().unwrap();
    let mut kb = KnowledgeBase::new(Box::new(FakeEmbedder::new(DIM)), tmp.path(), DIM).expect("kb");
    let dir = tmp.path().join("kb");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("q1.txt"), "a".repeat(900)).unwrap();
    fs::write(dir.join("q2.txt"), "b".repeat(600)).unwrap();

    let report = kb.sync_folder(&dir, &TxtExtractor).expect("sync");
    assert_eq!(report.chunks_added, 5, "3 windows + 2 windows of 300 chars");
    assert_eq!(kb.len(), 5);
    assert_eq!(kb.index().len(), kb.documents().len());
    assert!(kb.ingested().is_ingested("q1.txt"));
    assert!(kb.ingested().is_ingested("q2.txt"));
    let per_file: Vec<&str> = kb.documents().iter().map(|c| c.source_filename.as_str()).collect();
    assert_eq!(per_file, vec!["q1.txt", "q1.txt", "q1.txt", "q2.txt", "q2.txt"]);
}

#[test]
fn alignment_holds_after_every_ingest() {
    let tmp = TempDir::new().unwrap();
    let mut kb = KnowledgeBase::new(Box::new(FakeEmbedder::new(DIM)), tmp.path(), DIM).expect("kb");
    for (i, n) in [3usize, 0, 2, 7, 1].into_iter().enumerate() {
        let batch: Vec<Chunk> = (0..n).map(|j| Chunk::new(format!("chunk {j} of batch {i}"), format!("f{i}.pdf"))).collect();
        kb.ingest(batch).expect("ingest");
        assert_eq!(kb.index().len(), kb.documents().len());
    }
    assert_eq!(kb.len(), 13);
}

#[test]
fn retrieve_results_are_non_increasing() {
    let tmp = TempDir::new().unwrap();
    let mut kb = KnowledgeBase::new(Box::new(FakeEmbedder::new(DIM)), tmp.path(), DIM).expect("kb");
    kb.ingest(chunks("market.pdf", &[
        "stocks rallied on strong earnings",
        "bond yields fell after the announcement",
        "bitcoin price volatility remains high",
        "earnings season beat expectations for tech stocks",
        "oil prices dipped on supply news",
    ])).expect("ingest");

    let results = kb.retrieve("tech stocks earnings", 5).expect("retrieve");
    assert_eq!(results.len(), 5);
    for pair in results.windows(2) {
        assert!(pair[0].similarity >= pair[1].similarity, "{} < {}", pair[0].similarity, pair[1].similarity);
    }
}

#[test]
fn empty_knowledge_base_skips_embedder() {
    let tmp = TempDir::new().unwrap();
    let (embedder, calls) = counting_embedder();
    let mut kb = KnowledgeBase::new(embedder, tmp.path(), DIM).expect("kb");
    let results = kb.retrieve("What is the Bitcoin price prediction?", 3).expect("retrieve");
    assert!(results.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn second_sync_of_unchanged_folder_embeds_nothing() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("knowledge_base");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("a.txt"), "Apple reported record profits").unwrap();
    fs::write(dir.join("b.txt"), "The Fed raised interest rates").unwrap();
    fs::write(dir.join("chart.png"), [0u8, 1, 2]).unwrap();

    let (embedder, calls) = counting_embedder();
    let mut kb = KnowledgeBase::new(embedder, tmp.path().join("index"), DIM).expect("kb");
    let first = kb.sync_folder(&dir, &TxtExtractor).expect("first sync");
    assert_eq!(first.ingested, vec!["a.txt".to_string(), "b.txt".to_string()]);
    let after_first = calls.load(Ordering::SeqCst);
    assert_eq!(after_first, 2, "one embed call per new file");

    let second = kb.sync_folder(&dir, &TxtExtractor).expect("second sync");
    assert!(second.ingested.is_empty());
    assert_eq!(second.skipped, 2);
    assert_eq!(calls.load(Ordering::SeqCst), after_first);
    assert_eq!(kb.len(), 2);
}

#[test]
fn failed_file_is_skipped_and_retried_next_sync() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("knowledge_base");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("a.txt"), "CORRUPT bytes").unwrap();
    fs::write(dir.join("b.txt"), "The Fed raised interest rates").unwrap();

    let mut kb = KnowledgeBase::new(Box::new(FakeEmbedder::new(DIM)), tmp.path().join("index"), DIM).expect("kb");
    let report = kb.sync_folder(&dir, &TxtExtractor).expect("sync");
    assert_eq!(report.ingested, vec!["b.txt".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].filename, "a.txt");
    assert!(!kb.ingested().is_ingested("a.txt"));

    fs::write(dir.join("a.txt"), "Apple reported record profits").unwrap();
    let retry = kb.sync_folder(&dir, &TxtExtractor).expect("retry");
    assert_eq!(retry.ingested, vec!["a.txt".to_string()]);
    assert_eq!(retry.skipped, 1);
    assert!(kb.ingested().is_ingested("a.txt"));
}

#[test]
fn sync_saves_once_and_snapshot_round_trips() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("knowledge_base");
    let index_dir = tmp.path().join("faiss_index");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("outlook.txt"), "Analysts expect the Fed to hold rates. ".repeat(20)).unwrap();
    fs::write(dir.join("earnings.txt"), "Apple reported record profits in the quarter. ".repeat(12)).unwrap();

    let mut kb = KnowledgeBase::new(Box::new(FakeEmbedder::new(DIM)), &index_dir, DIM).expect("kb");
    kb.sync_folder(&dir, &TxtExtractor).expect("sync");
    assert!(SnapshotPaths::in_dir(&index_dir).exists());

    let mut restored = KnowledgeBase::new(Box::new(FakeEmbedder::new(DIM)), &index_dir, DIM).expect("kb");
    assert!(restored.load().expect("load"));
    assert_eq!(restored.documents(), kb.documents());
    assert_eq!(restored.ingested(), kb.ingested());
    for id in 0..kb.index().len() {
        let a: Vec<u32> = kb.index().vector(id).unwrap().iter().map(|x| x.to_bits()).collect();
        let b: Vec<u32> = restored.index().vector(id).unwrap().iter().map(|x| x.to_bits()).collect();
        assert_eq!(a, b, "vector {id} is bit-exact");
    }
    for query in ["Fed rates outlook", "Apple profits", "unrelated words entirely"] {
        assert_eq!(kb.retrieve(query, 4).expect("retrieve"), restored.retrieve(query, 4).expect("retrieve"));
    }
}

#[test]
fn missing_snapshot_loads_as_fresh() {
    let tmp = TempDir::new().unwrap();
    let mut kb = KnowledgeBase::new(Box::new(FakeEmbedder::new(DIM)), tmp.path().join("none"), DIM).expect("kb");
    assert!(!kb.load().expect("load"));
    assert!(kb.is_empty());
    assert!(kb.is_loaded());
}

#[test]
fn missing_files_artifact_loads_empty_tracker() {
    let tmp = TempDir::new().unwrap();
    let mut kb = KnowledgeBase::new(Box::new(FakeEmbedder::new(DIM)), tmp.path(), DIM).expect("kb");
    kb.ingest_upload("Bitcoin ETF inflows hit a record", "upload.pdf").expect("upload");
    fs::remove_file(SnapshotPaths::in_dir(tmp.path()).files).unwrap();

    let mut restored = KnowledgeBase::new(Box::new(FakeEmbedder::new(DIM)), tmp.path(), DIM).expect("kb");
    assert!(restored.load().expect("load"));
    assert_eq!(restored.len(), 1);
    assert!(restored.ingested().is_empty());
}

#[test]
fn corrupt_snapshot_falls_back_to_fresh_state() {
    let tmp = TempDir::new().unwrap();
    let paths = SnapshotPaths::in_dir(tmp.path());
    fs::write(&paths.index, b"not bincode").unwrap();
    fs::write(&paths.documents, b"[]").unwrap();

    let mut kb = KnowledgeBase::new(Box::new(FakeEmbedder::new(DIM)), tmp.path(), DIM).expect("kb");
    assert!(matches!(kb.load(), Err(Error::Persistence { .. })));
    assert!(kb.is_empty());
    assert!(!kb.load_or_fresh());
    assert!(kb.is_empty());
    assert!(kb.retrieve("anything", 3).expect("retrieve").is_empty());
}

#[test]
fn desynchronized_snapshot_is_rejected_whole() {
    let tmp = TempDir::new().unwrap();
    let mut kb = KnowledgeBase::new(Box::new(FakeEmbedder::new(DIM)), tmp.path(), DIM).expect("kb");
    kb.ingest(chunks("a.pdf", &["one", "two"])).expect("ingest");
    kb.save().expect("save");
    let paths = SnapshotPaths::in_dir(tmp.path());
    fs::write(&paths.documents, r#"[{"text":"one","source_filename":"a.pdf"}]"#).unwrap();

    assert!(matches!(snapshot::load(tmp.path(), DIM), Err(Error::Persistence { .. })));
    let mut restored = KnowledgeBase::new(Box::new(FakeEmbedder::new(DIM)), tmp.path(), DIM).expect("kb");
    assert!(restored.load().is_err());
    assert_eq!(restored.index().len(), 0);
    assert_eq!(restored.documents().len(), 0);
}

#[test]
fn snapshot_with_other_dimension_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let mut kb = KnowledgeBase::new(Box::new(FakeEmbedder::new(8)), tmp.path(), 8).expect("kb");
    kb.ingest(chunks("a.pdf", &["one"])).expect("ingest");
    kb.save().expect("save");
    assert!(matches!(snapshot::load(tmp.path(), DIM), Err(Error::Persistence { .. })));
}

#[test]
fn upload_bypasses_tracker_and_uses_upload_window() {
    let tmp = TempDir::new().unwrap();
    let mut kb = KnowledgeBase::new(Box::new(FakeEmbedder::new(DIM)), tmp.path(), DIM).expect("kb");
    let text = "x".repeat(1000);
    assert_eq!(kb.ingest_upload(&text, "memo.pdf").expect("upload"), 2, "800 + 200 chars");
    assert_eq!(kb.ingest_upload(&text, "memo.pdf").expect("upload again"), 2);
    assert_eq!(kb.len(), 4, "uploads are appended every time");
    assert!(!kb.ingested().is_ingested("memo.pdf"));
    assert!(SnapshotPaths::in_dir(tmp.path()).exists(), "upload saves the snapshot");
}

#[test]
fn sync_does_not_clobber_existing_snapshot() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("knowledge_base");
    let index_dir = tmp.path().join("faiss_index");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("a.txt"), "Apple reported record profits").unwrap();

    let mut first = KnowledgeBase::new(Box::new(FakeEmbedder::new(DIM)), &index_dir, DIM).expect("kb");
    first.sync_folder(&dir, &TxtExtractor).expect("sync");

    fs::write(dir.join("b.txt"), "The Fed raised interest rates").unwrap();
    let (embedder, calls) = counting_embedder();
    let mut second = KnowledgeBase::new(embedder, &index_dir, DIM).expect("kb");
    let report = second.sync_folder(&dir, &TxtExtractor).expect("sync");
    assert_eq!(report.ingested, vec!["b.txt".to_string()]);
    assert_eq!(calls.load(Ordering::SeqCst), 1, "only the new file is embedded");
    assert_eq!(second.len(), 2);
}

/// Claims `dim` but returns one short vector for any text containing "short".
struct MisreportingEmbedder { dim: usize }

impl Embedder for MisreportingEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { 16 }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| if t.contains("short") { vec![1.0; self.dim - 1] } else { vec![1.0; self.dim] }).collect())
    }
}

#[test]
fn dimension_mismatch_does_not_partially_ingest() {
    let tmp = TempDir::new().unwrap();
    let mut kb = KnowledgeBase::new(Box::new(MisreportingEmbedder { dim: 4 }), tmp.path(), 4).expect("kb");
    kb.ingest(chunks("ok.pdf", &["fine"])).expect("ingest");
    let err = kb.ingest(chunks("bad.pdf", &["fine too", "short one"])).expect_err("mismatch");
    assert!(matches!(err, Error::DimensionMismatch { expected: 4, actual: 3 }));
    assert_eq!(kb.index().len(), 1);
    assert_eq!(kb.documents().len(), 1);
}

#[test]
fn embedder_width_must_match_configured_dimension() {
    let err = KnowledgeBase::new(Box::new(FakeEmbedder::new(128)), "unused", DIM).err().expect("mismatch");
    assert!(matches!(err, Error::DimensionMismatch { expected: 384, actual: 128 }));
}

#[test]
fn low_similarity_falls_back() {
    let tmp = TempDir::new().unwrap();
    let mut kb = KnowledgeBase::new(Box::new(KeywordEmbedder), tmp.path(), 3).expect("kb");
    kb.ingest(chunks("macro.pdf", &["The Fed raised interest rates"])).expect("ingest");
    let results = kb.retrieve("Apple earnings", 3).expect("retrieve");
    assert_eq!(results.len(), 1);
    assert_eq!(RelevancePolicy::default().assess(&results), ContextDecision::Fallback);
}

#[test]
fn first_retrieve_loads_snapshot_from_disk() {
    let tmp = TempDir::new().unwrap();
    let mut writer = KnowledgeBase::new(Box::new(KeywordEmbedder), tmp.path(), 3).expect("kb");
    writer.ingest(chunks("a.pdf", &["Apple reported record profits"])).expect("ingest");
    writer.save().expect("save");

    let mut reader = KnowledgeBase::new(Box::new(KeywordEmbedder), tmp.path(), 3).expect("kb");
    assert!(!reader.is_loaded());
    let results = reader.retrieve("Apple earnings", 3).expect("retrieve");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].source_filename, "a.pdf");
    assert!(reader.is_loaded());
}

#[test]
fn first_ingest_keeps_existing_snapshot() {
    let tmp = TempDir::new().unwrap();
    let mut writer = KnowledgeBase::new(Box::new(FakeEmbedder::new(DIM)), tmp.path(), DIM).expect("kb");
    writer.ingest(chunks("a.pdf", &["one", "two"])).expect("ingest");
    writer.save().expect("save");

    let mut next = KnowledgeBase::new(Box::new(FakeEmbedder::new(DIM)), tmp.path(), DIM).expect("kb");
    next.ingest(chunks("b.pdf", &["three"])).expect("ingest");
    assert_eq!(next.len(), 3);
    assert_eq!(next.retrieve("three", 3).expect("retrieve").len(), 3, "later retrieve does not reload over new chunks");
}

#[test]
fn shared_retrieve_requires_a_loaded_knowledge_base() {
    let tmp = TempDir::new().unwrap();
    let mut kb = KnowledgeBase::new(Box::new(FakeEmbedder::new(DIM)), tmp.path(), DIM).expect("kb");
    assert!(matches!(kb.retrieve_loaded("anything", 3), Err(Error::Operation(_))));
    kb.ensure_loaded();
    assert!(kb.retrieve_loaded("anything", 3).expect("retrieve").is_empty());
}
