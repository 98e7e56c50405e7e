//! `surveydb`: ingest survey reports and query them.
//!
//! ```bash
//! surveydb ingest --metadata data/processed/metadata.json
//! surveydb query "What was stunting in Kenya at endline?" -k 5
//! surveydb analyze "Phase II baseline 2014"
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use surveydb_core::config::{expand_path, Config, Settings};
use surveydb_hybrid::{analyze, load_catalog, Engine};

#[derive(Parser)]
#[command(name = "surveydb", version, about = "Hybrid retrieval over survey reports")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk, embed and index every document in the catalog
    Ingest {
        /// Catalog file (default: data.metadata_path)
        #[arg(long)]
        metadata: Option<PathBuf>,
        /// Directory markdown paths are relative to (default: data.markdown_root)
        #[arg(long)]
        markdown_root: Option<PathBuf>,
    },
    /// Retrieve the most relevant chunks for a question
    Query {
        text: String,
        #[arg(short, long)]
        k: Option<usize>,
        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the entities and filter extracted from a question
    Analyze { text: String },
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {e}");
        e
    })?;
    let settings = config.settings()?;
    init_tracing(&settings);

    match cli.command {
        Command::Analyze { text } => {
            let entities = analyze(&text);
            let out = serde_json::json!({ "entities": entities, "filter": entities.to_filter() });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Command::Ingest { metadata, markdown_root } => {
            let metadata = metadata.unwrap_or_else(|| expand_path(&settings.data.metadata_path));
            let markdown_root = markdown_root.unwrap_or_else(|| expand_path(&settings.data.markdown_root));
            let engine = Engine::open(settings).await?;
            let docs = load_catalog(&metadata)?;
            println!("Ingesting {} documents from {}", docs.len(), metadata.display());
            let report = engine.index_builder()?.ingest_catalog(&docs, &markdown_root).await;
            let total = engine.refresh_keyword_index().await?;
            println!(
                "indexed {}, unchanged {}, excluded {}, failed {} ({} chunks written, {} in index)",
                report.indexed, report.unchanged, report.excluded, report.failed, report.chunks_written, total
            );
            for (doc_id, error) in &report.failures {
                eprintln!("  {doc_id}: {error}");
            }
        }
        Command::Query { text, k, json } => {
            let k = k.unwrap_or(settings.retrieval.k_final);
            let engine = Engine::open(settings).await?;
            engine.refresh_keyword_index().await?;
            let outcome = engine.retriever()?.retrieve_detailed(&text, k).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
                return Ok(());
            }
            if outcome.semantic_degraded {
                eprintln!("(semantic search unavailable; keyword results only)");
            }
            if outcome.chunks.is_empty() {
                println!("No matching chunks.");
            }
            for (i, c) in outcome.chunks.iter().enumerate() {
                let m = &c.metadata;
                println!("{}. [{:.4}] {} ({}, {})", i + 1, c.score, m.title, m.country, c.chunk_id);
                if let Some(url) = &m.online_url {
                    println!("   {url}");
                }
                println!("   {}", c.text.replace('\n', " "));
            }
        }
    }
    Ok(())
}
