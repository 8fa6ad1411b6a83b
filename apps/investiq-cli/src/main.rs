//! `investiq`: sync the knowledge folder, ingest single documents and query
//! the retrieval index from the command line.
mod cli;

use std::env;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

use investiq_core::config::{Config, RagSettings};
use investiq_core::traits::TextExtractor;
use investiq_embed::get_default_embedder;
use investiq_text::DocumentExtractor;
use investiq_vector::{build_prompt, ContextDecision, KnowledgeBase, RelevancePolicy};

use cli::{Cli, Command};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("loading configuration")?;
    let settings = config.rag_settings()?;
    let base = env::current_dir()?;

    match cli.command {
        Command::Sync { folder, pdf_only } => sync(&settings, &base, folder, pdf_only),
        Command::Ingest { file } => ingest(&settings, &base, &file),
        Command::Query { question, top_k, threshold, prompt } => {
            query(&settings, &base, &question, top_k.unwrap_or(settings.top_k), threshold.unwrap_or(settings.relevance_threshold), prompt)
        }
        Command::Status => status(&settings, &base),
    }
}

fn open_knowledge_base(settings: &RagSettings, base: &Path) -> anyhow::Result<KnowledgeBase> {
    let embedder = get_default_embedder()?;
    let mut kb = KnowledgeBase::from_settings(settings, base, embedder)?;
    kb.ensure_loaded();
    Ok(kb)
}

fn sync(settings: &RagSettings, base: &Path, folder: Option<PathBuf>, pdf_only: bool) -> anyhow::Result<()> {
    let folder = folder.unwrap_or_else(|| settings.knowledge_path(base));
    println!("📂 Syncing {}", folder.display());
    let mut kb = open_knowledge_base(settings, base)?;

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}")?
            .progress_chars("#>-"),
    );
    let extractor = if pdf_only { DocumentExtractor::pdf_only() } else { DocumentExtractor::new() };
    let report = kb.sync_folder_with_progress(&folder, &extractor, &pb)?;
    pb.finish_and_clear();

    for name in &report.ingested { println!("  ✅ {}", name); }
    for failure in &report.failed { println!("  ⚠️  {} ({})", failure.filename, failure.reason); }
    println!(
        "\n📊 {} new files, {} chunks added, {} already indexed, {} failed",
        report.ingested.len(),
        report.chunks_added,
        report.skipped,
        report.failed.len()
    );
    if !report.failed.is_empty() { println!("💡 Failed files stay pending and are retried on the next sync"); }
    Ok(())
}

fn ingest(settings: &RagSettings, base: &Path, file: &Path) -> anyhow::Result<()> {
    let extractor = DocumentExtractor::new();
    if !extractor.supports(file) {
        anyhow::bail!("unsupported document type: {}", file.display());
    }
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("{} has no file name", file.display()))?;
    let text = extractor.extract_text(file)?;
    let mut kb = open_knowledge_base(settings, base)?;
    let added = kb.ingest_upload(&text, &filename)?;
    println!("✅ Added {} chunks from {} ({} chunks total)", added, filename, kb.len());
    Ok(())
}

fn query(settings: &RagSettings, base: &Path, question: &str, top_k: usize, threshold: f32, prompt: bool) -> anyhow::Result<()> {
    let mut kb = open_knowledge_base(settings, base)?;
    let results = kb.retrieve(question, top_k)?;
    info!(results = results.len(), top_k, "retrieved");

    println!("🔍 {}", question);
    for (i, r) in results.iter().enumerate() {
        println!("\n  {}. similarity={:.4}  source={}", i + 1, r.similarity, r.source_filename);
        println!("     📝 {}", r.text);
    }

    let decision = RelevancePolicy::new(threshold).assess(&results);
    match &decision {
        ContextDecision::Trusted { confidence, sources, .. } => {
            println!("\n📚 Confidence {:.2}% from {}", confidence, sources.join(", "));
        }
        ContextDecision::Fallback => println!("\n💭 No relevant context above {:.2}; answer from general knowledge", threshold),
    }
    if prompt { println!("\n{}", build_prompt(question, &decision)); }
    Ok(())
}

fn status(settings: &RagSettings, base: &Path) -> anyhow::Result<()> {
    let kb = open_knowledge_base(settings, base)?;
    let stats = kb.stats();
    println!("📁 Index directory: {}", kb.snapshot_dir().display());
    println!("📊 {} chunks from {} synced files (dimension {})", stats.chunks, stats.files, stats.dimension);
    Ok(())
}
