//! # reglens CLI
//!
//! The `reglens` binary is the primary interface to the regulatory
//! conflict analysis pipeline: index initialization, corpus ingestion,
//! retrieval inspection, full analysis runs, and the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! reglens --config ./config/reglens.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `reglens init` | Create the SQLite index and schema |
//! | `reglens ingest` | Rebuild the index from the policies directory |
//! | `reglens search "<query>"` | Print top-k policy excerpts with scores |
//! | `reglens analyze --file <path>` | Run the full analysis pipeline |
//! | `reglens serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the index
//! reglens init --config ./config/reglens.toml
//!
//! # Ingest the policy corpus
//! reglens ingest --config ./config/reglens.toml
//!
//! # Inspect retrieval for a query
//! reglens search "data deletion deadlines" --k 3
//!
//! # Analyze a regulation from a file
//! reglens analyze --file new_regulation.txt --date-of-law 2025-06-01 \
//!     --title "Data Deletion Act"
//!
//! # Start the HTTP server
//! reglens serve --config ./config/reglens.toml
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use reglens::config::{self, Config};
use reglens::embedding;
use reglens::index::PolicyIndex;
use reglens::ingest;
use reglens::oracle;
use reglens::pipeline::{AnalysisRequest, Analyzer};
use reglens::retrieve::Retriever;
use reglens::server;

/// reglens — regulatory conflict analysis over an internal policy corpus.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/reglens.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "reglens",
    about = "reglens — regulatory conflict analysis over an internal policy corpus",
    version,
    long_about = "reglens ingests a directory of company policy documents into a persistent \
    similarity index, retrieves the excerpts most relevant to a new regulation, classifies \
    each one's conflict risk via a reasoning oracle, and emits a schema-validated JSON report."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/reglens.toml`. Index, corpus, embedding,
    /// oracle, and server settings are read from this file.
    #[arg(long, global = true, default_value = "./config/reglens.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the index schema.
    ///
    /// Creates the SQLite database file and all required tables. This
    /// command is idempotent — running it multiple times is safe.
    Init,

    /// Ingest the policy corpus into the index.
    ///
    /// Scans the policies directory, chunks every document, embeds the
    /// chunks, and atomically replaces the index contents. Re-running
    /// replaces, never appends.
    Ingest {
        /// Show document and chunk counts without writing to the index.
        #[arg(long)]
        dry_run: bool,
    },

    /// Search the indexed policy corpus.
    ///
    /// Prints the top-k excerpts with similarity scores. Useful for
    /// inspecting retrieval quality before running a full analysis.
    Search {
        /// The search query string.
        query: String,

        /// Number of results to return.
        #[arg(long, default_value_t = 5)]
        k: usize,

        /// Emit results as a JSON array instead of human-readable text.
        #[arg(long)]
        json: bool,
    },

    /// Run the full analysis pipeline for one regulation.
    ///
    /// Retrieves the most relevant policy excerpts, classifies each one's
    /// conflict risk, and prints the resulting JSON report. The report is
    /// also persisted to the reports directory unless `--no-save` is given.
    Analyze {
        /// Read the regulation text from a file.
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,

        /// Pass the regulation text inline.
        #[arg(long)]
        text: Option<String>,

        /// Date the regulation takes effect (YYYY-MM-DD).
        #[arg(long)]
        date_of_law: Option<String>,

        /// Regulation title for the report header.
        #[arg(long)]
        title: Option<String>,

        /// Override the configured number of excerpts to analyze.
        #[arg(long)]
        top_k: Option<usize>,

        /// Do not persist the report to the reports directory.
        #[arg(long)]
        no_save: bool,

        /// Write the report JSON to this path instead of the reports
        /// directory naming scheme.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Start the HTTP API.
    ///
    /// Serves `POST /analyze`, `GET /health`, and `GET /ready` on the
    /// configured bind address.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    match cli.command {
        Commands::Init => {
            PolicyIndex::init(&cfg).await?;
            println!("Index initialized at {}", cfg.index.path.display());
        }
        Commands::Ingest { dry_run } => {
            PolicyIndex::init(&cfg).await?;
            let index = PolicyIndex::open(&cfg).await?;
            let embedder = embedding::create_provider(&cfg.embedding)?;
            ingest::ingest(&cfg, &index, embedder, dry_run).await?;
            index.close().await;
        }
        Commands::Search { query, k, json } => {
            let (index, embedder) = open_for_queries(&cfg).await?;
            let retriever = Retriever::new(index, embedder);
            let items = retriever.search(&query, k).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else {
                if items.is_empty() {
                    println!("No results (is the index ingested?)");
                }
                for (i, item) in items.iter().enumerate() {
                    println!(
                        "{}. [{:.4}] {} ({})",
                        i + 1,
                        item.score,
                        item.policy_id,
                        item.source
                    );
                    println!("   {}", item.excerpt.replace('\n', "\n   "));
                }
            }
        }
        Commands::Analyze {
            file,
            text,
            date_of_law,
            title,
            top_k,
            no_save,
            output,
        } => {
            let regulation_text = match (file, text) {
                (Some(path), None) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                (None, Some(text)) => text,
                _ => bail!("Provide the regulation via --file or --text"),
            };

            let analyzer = build_analyzer(&cfg).await?;
            let request = AnalysisRequest {
                regulation_text,
                date_of_law,
                regulation_title: title,
            };

            let outcome = analyzer.analyze(&request, top_k, !no_save).await?;

            println!("{}", serde_json::to_string_pretty(&outcome.report)?);
            if let Some(path) = &outcome.report_path {
                println!("Report saved to: {}", path.display());
            }
            if let Some(path) = output {
                let json = serde_json::to_string_pretty(&outcome.report)?;
                std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("Report saved to: {}", path.display());
            }
        }
        Commands::Serve => {
            let analyzer = Arc::new(build_analyzer(&cfg).await?);
            server::run_server(&cfg, analyzer).await?;
        }
    }

    Ok(())
}

/// Open the index for query serving and verify the embedding provider
/// matches the one the index was built with.
async fn open_for_queries(
    cfg: &Config,
) -> Result<(
    Arc<PolicyIndex>,
    Arc<dyn embedding::EmbeddingProvider>,
)> {
    let index = PolicyIndex::open(cfg).await?;
    let embedder = embedding::create_provider(&cfg.embedding)?;
    index
        .verify_provider(embedder.model_name(), embedder.dims())
        .await?;
    Ok((Arc::new(index), embedder))
}

/// Construct the shared analysis engine: index, embedder, and oracle.
async fn build_analyzer(cfg: &Config) -> Result<Analyzer> {
    let (index, embedder) = open_for_queries(cfg).await?;
    let oracle = oracle::create_oracle(&cfg.oracle)?;

    if !cfg.oracle.is_enabled() {
        eprintln!(
            "Warning: oracle provider is disabled; every classification \
             will take the manual-review fallback path"
        );
    }

    Ok(Analyzer::new(cfg.clone(), index, embedder, oracle))
}
