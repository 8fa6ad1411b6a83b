use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "investiq", version, about = "Document retrieval for the InvestIQ assistant")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Ingest every new document in the knowledge folder
    Sync {
        /// Folder to scan instead of the configured `rag.knowledge_dir`
        #[arg(long)]
        folder: Option<PathBuf>,
        /// Only ingest `.pdf` files, skipping `.txt` and `.md`
        #[arg(long)]
        pdf_only: bool,
    },
    /// Ingest one document as an upload
    Ingest { file: PathBuf },
    /// Retrieve the chunks most similar to a question
    Query {
        question: String,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        threshold: Option<f32>,
        /// Also print the prompt that would be sent to the language model
        #[arg(long)]
        prompt: bool,
    },
    /// Show index size and synced files
    Status,
}
