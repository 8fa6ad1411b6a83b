//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars.
//! Nested keys in the environment use `__`, e.g. `APP_RAG__TOP_K=5`.
//! Provides helpers to expand `~` and `${VAR}` and to resolve relative paths
//! against a known base directory.
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::chunker::ChunkingConfig;
use crate::error::Error;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.rag_settings()?;
        Ok(config)
    }

    /// Build a config from an inline TOML document, without files or env.
    pub fn from_toml_str(toml: &str) -> Self {
        Self { figment: Figment::new().merge(Toml::string(toml)) }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// The `[rag]` table, defaulted field by field and validated.
    pub fn rag_settings(&self) -> anyhow::Result<RagSettings> {
        let settings = if self.figment.contains("rag") {
            self.get::<RagSettings>("rag")?
        } else {
            debug!("no [rag] section configured, using defaults");
            RagSettings::default()
        };
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    /// Folder scanned by bulk sync.
    pub knowledge_dir: String,
    /// Folder holding the three snapshot artifacts.
    pub index_dir: String,
    pub dimension: usize,
    pub bulk_chunk_chars: usize,
    pub upload_chunk_chars: usize,
    pub top_k: usize,
    pub relevance_threshold: f32,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            knowledge_dir: "knowledge_base".to_string(),
            index_dir: "faiss_index".to_string(),
            dimension: 384,
            bulk_chunk_chars: crate::chunker::BULK_SYNC_WINDOW_CHARS,
            upload_chunk_chars: crate::chunker::UPLOAD_WINDOW_CHARS,
            top_k: 3,
            relevance_threshold: 0.5,
        }
    }
}

impl RagSettings {
    pub fn validate(&self) -> crate::Result<()> {
        if self.dimension == 0 {
            return Err(Error::InvalidConfig("rag.dimension must be positive".to_string()));
        }
        if self.bulk_chunk_chars == 0 || self.upload_chunk_chars == 0 {
            return Err(Error::InvalidConfig("rag chunk windows must be positive".to_string()));
        }
        if self.top_k == 0 {
            return Err(Error::InvalidConfig("rag.top_k must be positive".to_string()));
        }
        if !(-1.0..=1.0).contains(&self.relevance_threshold) {
            return Err(Error::InvalidConfig(format!(
                "rag.relevance_threshold must lie in [-1, 1], got {}",
                self.relevance_threshold
            )));
        }
        Ok(())
    }

    pub fn bulk_chunking(&self) -> crate::Result<ChunkingConfig> { ChunkingConfig::new(self.bulk_chunk_chars) }

    pub fn upload_chunking(&self) -> crate::Result<ChunkingConfig> { ChunkingConfig::new(self.upload_chunk_chars) }

    pub fn knowledge_path(&self, base: &Path) -> PathBuf { resolve_with_base(base, &self.knowledge_dir) }

    pub fn index_path(&self, base: &Path) -> PathBuf { resolve_with_base(base, &self.index_dir) }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
