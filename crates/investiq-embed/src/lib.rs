//! Sentence embeddings for the retrieval index.
//!
//! `MiniLmEmbedder` runs all-MiniLM-L6-v2 (a 6-layer BERT, D = 384) with
//! candle and returns L2-normalized mean-pooled vectors. `FakeEmbedder` hashes
//! whitespace tokens into a fixed-width vector and is used in tests and when
//! `APP_USE_FAKE_EMBEDDINGS=1`.

pub mod device;
pub mod pool;
pub mod tokenize;

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use investiq_core::traits::Embedder;

pub use pool::masked_mean_l2;

/// Output width of all-MiniLM-L6-v2.
pub const EMBEDDING_DIM: usize = 384;
pub const MAX_SEQ_LEN: usize = 256;
const BATCH_SIZE: usize = 32;
const MODEL_NAME: &str = "all-MiniLM-L6-v2";

pub struct MiniLmEmbedder { model: BertModel, tokenizer: Tokenizer, device: Device, dim: usize }

impl MiniLmEmbedder {
    pub fn new() -> Result<Self> { Self::from_dir(&resolve_model_dir()?) }

    pub fn from_dir(model_dir: &Path) -> Result<Self> {
        let device = device::select_device();
        info!(model_dir = %model_dir.display(), "loading {}", MODEL_NAME);
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config_path = model_dir.join("config.json");
        let config: BertConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
        let weights = load_weights(model_dir, &device)?;
        let vb = VarBuilder::from_tensors(weights, DTYPE, &device);
        let model = BertModel::load(vb, &config)?;
        let dim = config.hidden_size;
        info!(dim, "{} loaded", MODEL_NAME);
        Ok(Self { model, tokenizer, device, dim })
    }

    fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let (input_ids, attention_mask) = tokenize::tokenize_batch(&self.tokenizer, texts, self.max_len(), &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let rows: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_vec2()?;
        Ok(rows)
    }
}

impl Embedder for MiniLmEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { MAX_SEQ_LEN }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(BATCH_SIZE) { out.extend(self.embed_chunk(batch)?); }
        debug!(texts = texts.len(), elapsed_ms = start.elapsed().as_millis() as u64, "embedded batch");
        Ok(out)
    }
}

/// Deterministic bag-of-tokens embedder: each lower-cased whitespace token is
/// hashed into one bucket, and the vector is L2-normalized. Like the model,
/// it only sees the first `max_len` tokens.
pub struct FakeEmbedder { dim: usize, max_len: usize }

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim, max_len: MAX_SEQ_LEN } }

    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }
}

impl Default for FakeEmbedder { fn default() -> Self { Self::new(EMBEDDING_DIM) } }

impl FakeEmbedder {
    fn embed_text(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().take(self.max_len).enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        v
    }
}

impl Embedder for FakeEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

pub fn get_default_embedder() -> Result<Box<dyn Embedder>> {
    let use_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
    if use_fake { info!("using FakeEmbedder"); return Ok(Box::new(FakeEmbedder::default())); }
    Ok(Box::new(MiniLmEmbedder::new()?))
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        return Ok(candle_core::safetensors::load(&safetensors, device)?);
    }
    let pickle = model_dir.join("pytorch_model.bin");
    if pickle.exists() {
        warn!("model.safetensors not found, falling back to {}", pickle.display());
        let weights = candle_core::pickle::read_all(&pickle)?;
        return Ok(weights.into_iter().collect());
    }
    Err(anyhow!("No model weights in {}", model_dir.display()))
}

fn resolve_model_dir() -> Result<PathBuf> {
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = PathBuf::from(&dir);
            if p.exists() { debug!("using {}: {}", var, p.display()); return Ok(p); }
        }
    }
    let root = PathBuf::from("../models").join(MODEL_NAME);
    if root.exists() { return Ok(root); }
    let local = PathBuf::from("models").join(MODEL_NAME);
    if local.exists() { return Ok(local); }
    Err(anyhow!("Could not locate {} model directory", MODEL_NAME))
}
