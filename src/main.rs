//! # Docket CLI
//!
//! The `docket` binary drives the ingestion-and-retrieval core: database
//! initialization, document registration, queue-driven processing, status
//! polling, destructive reprocessing, and search.
//!
//! ## Usage
//!
//! ```bash
//! docket --config ./docket.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docket init` | Create the SQLite database and run schema migrations |
//! | `docket register <path> --case <id>` | Register a PDF (or a folder of PDFs) for a case |
//! | `docket process` | Enqueue all pending documents and drain the queue |
//! | `docket status <document-id>` | Show a document's ingestion status |
//! | `docket reprocess <document-id>` | Delete extracted pages and re-run ingestion |
//! | `docket search "<query>"` | Search indexed pages |
//! | `docket tools` | Report availability of the external OCR tooling |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use docket::cases::SqliteCaseStore;
use docket::embedding::{create_provider, EmbeddingGenerator};
use docket::extract::PdfTextExtractor;
use docket::ingest::IngestionPipeline;
use docket::queue::{JobQueue, SerialJobQueue};
use docket::search::{SearchEngine, SearchMode, SearchWeights};
use docket::store::SqliteStore;
use docket::{config, db, migrate, ocr, register};

/// Docket: legal-document ingestion and hybrid search with exact page
/// citations.
#[derive(Parser)]
#[command(
    name = "docket",
    about = "Legal-document ingestion and hybrid search with exact page citations",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./docket.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (documents, page_content, page_fts, cases). Idempotent.
    Init,

    /// Register a PDF file, or every PDF under a directory, for a case.
    ///
    /// Registered documents start in the `pending` state and are picked up
    /// by `docket process`. Re-registering identical content is a no-op.
    Register {
        /// File or directory to register.
        path: PathBuf,

        /// Owning case identifier.
        #[arg(long)]
        case: String,
    },

    /// Enqueue all pending documents and drain the ingestion queue.
    ///
    /// Documents are processed strictly one at a time, in registration
    /// order. Extraction failures land in each document's status rather
    /// than aborting the run.
    Process {
        /// Maximum number of pending documents to process.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show a document's ingestion status.
    Status {
        /// Document UUID.
        id: String,
    },

    /// Delete a document's extracted pages and re-run ingestion.
    ///
    /// This is the only retry path: there is no automatic retry on failure.
    Reprocess {
        /// Document UUID.
        id: String,
    },

    /// Search indexed pages.
    Search {
        /// The search query string.
        query: String,

        /// Search mode: `lexical` (full-text), `semantic`, or `hybrid`.
        #[arg(long, default_value = "hybrid")]
        mode: String,

        /// Maximum number of results to return.
        #[arg(long, default_value = "10")]
        limit: usize,

        /// Override the lexical weight used in hybrid fusion.
        #[arg(long)]
        lexical_weight: Option<f64>,

        /// Override the semantic weight used in hybrid fusion.
        #[arg(long)]
        semantic_weight: Option<f64>,
    },

    /// Report availability of the external OCR tooling.
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    // Tool preflight needs no configuration
    if matches!(cli.command, Commands::Tools) {
        println!("external tools");
        for (tool, available) in ocr::check_tools() {
            let mark = if available { "found" } else { "missing" };
            println!("  {}: {}", tool, mark);
        }
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Register { path, case } => {
            let pool = db::connect(&cfg).await?;
            let store = SqliteStore::new(pool.clone());

            let registered = register::register_path(&store, &case, &path).await?;
            let new = registered.iter().filter(|r| !r.already_registered).count();

            println!("register {}", path.display());
            println!("  case: {}", case);
            println!("  files: {}", registered.len());
            println!("  newly registered: {}", new);
            for file in &registered {
                let note = if file.already_registered {
                    " (already registered)"
                } else {
                    ""
                };
                println!("    {} {}{}", file.document_id, file.file_name, note);
            }
            pool.close().await;
        }
        Commands::Process { limit } => {
            let pool = db::connect(&cfg).await?;
            let store = SqliteStore::new(pool.clone());

            let provider = create_provider(&cfg.embedding)?;
            let embedder = Arc::new(EmbeddingGenerator::new(provider, &cfg.embedding));
            let extractor = Arc::new(PdfTextExtractor::new(&cfg.extraction));
            let pipeline = IngestionPipeline::new(store.clone(), extractor, embedder, &cfg);
            let queue = SerialJobQueue::start(pipeline, store.clone());

            let mut pending = store.list_pending().await?;
            if let Some(limit) = limit {
                pending.truncate(limit);
            }

            if pending.is_empty() {
                println!("process");
                println!("  nothing pending");
                pool.close().await;
                return Ok(());
            }

            let mut job_ids = Vec::with_capacity(pending.len());
            for doc in &pending {
                job_ids.push(queue.enqueue(&doc.id).await?);
            }

            queue.drain().await;

            println!("process");
            println!("  enqueued: {}", job_ids.len());
            for job_id in job_ids {
                if let Some(job) = queue.job(job_id) {
                    match (&job.result, &job.error) {
                        (Some(summary), _) => println!(
                            "    {} {} -> {} ({} pages, {} failed, {} embedded)",
                            job.document_id,
                            job.file_name,
                            summary.status.as_str(),
                            summary.pages_total,
                            summary.pages_failed,
                            summary.pages_embedded
                        ),
                        (None, Some(error)) => {
                            println!("    {} {} -> job failed: {}", job.document_id, job.file_name, error)
                        }
                        (None, None) => {}
                    }
                }
            }
            let stats = queue.stats();
            println!(
                "  queue: {} completed, {} failed",
                stats.completed, stats.failed
            );
            pool.close().await;
        }
        Commands::Status { id } => {
            let pool = db::connect(&cfg).await?;
            let store = SqliteStore::new(pool.clone());

            match store.document_status(&id).await? {
                Some(status) => {
                    println!("document {}", id);
                    println!("  status: {}", status.status.as_str());
                    match status.page_count {
                        Some(count) => println!("  pages: {}", count),
                        None => println!("  pages: unknown"),
                    }
                    println!("  processed pages: {}", status.processed_pages);
                    if let Some(error) = status.error {
                        println!("  error: {}", error);
                    }
                }
                None => println!("document {} not found", id),
            }
            pool.close().await;
        }
        Commands::Reprocess { id } => {
            let pool = db::connect(&cfg).await?;
            let store = SqliteStore::new(pool.clone());

            let provider = create_provider(&cfg.embedding)?;
            let embedder = Arc::new(EmbeddingGenerator::new(provider, &cfg.embedding));
            let extractor = Arc::new(PdfTextExtractor::new(&cfg.extraction));
            let pipeline = IngestionPipeline::new(store.clone(), extractor, embedder, &cfg);
            let queue = SerialJobQueue::start(pipeline, store.clone());

            let job_id = queue.enqueue_reprocess(&id).await?;
            queue.drain().await;

            match queue.job(job_id) {
                Some(job) => match (&job.result, &job.error) {
                    (Some(summary), _) => println!(
                        "reprocess {} -> {} ({} pages, {} failed)",
                        id,
                        summary.status.as_str(),
                        summary.pages_total,
                        summary.pages_failed
                    ),
                    (None, Some(error)) => println!("reprocess {} -> failed: {}", id, error),
                    (None, None) => println!("reprocess {} -> no result recorded", id),
                },
                None => println!("reprocess {} -> job vanished", id),
            }
            pool.close().await;
        }
        Commands::Search {
            query,
            mode,
            limit,
            lexical_weight,
            semantic_weight,
        } => {
            let pool = db::connect(&cfg).await?;
            let store = SqliteStore::new(pool.clone());

            let provider = create_provider(&cfg.embedding)?;
            let embedder = Arc::new(EmbeddingGenerator::new(provider, &cfg.embedding));
            let cases = Arc::new(SqliteCaseStore::new(pool.clone()));
            let engine = SearchEngine::new(store, embedder, cases, cfg.retrieval.clone());

            let mode = SearchMode::parse(&mode)?;
            let weights = match (lexical_weight, semantic_weight) {
                (None, None) => None,
                (lex, sem) => {
                    let defaults = engine.default_weights();
                    Some(SearchWeights {
                        lexical: lex.unwrap_or(defaults.lexical),
                        semantic: sem.unwrap_or(defaults.semantic),
                    })
                }
            };

            let response = engine.search(&query, mode, limit, weights).await?;

            if response.results.is_empty() {
                println!("No results.");
                pool.close().await;
                return Ok(());
            }

            for (index, hit) in response.results.iter().enumerate() {
                let case_label = hit
                    .case
                    .as_ref()
                    .map(|case| format!("case {}", case.case_number))
                    .unwrap_or_else(|| format!("case {}", hit.case_id));
                println!(
                    "{}. [{:.4}] {} / {} p.{} ({})",
                    index + 1,
                    hit.score,
                    case_label,
                    hit.file_name,
                    hit.page_number,
                    hit.match_type.as_str()
                );
                if let Some(case) = &hit.case {
                    println!("    parties: {} v {}", case.appellant, case.respondent);
                    if let Some(outcome) = &case.outcome {
                        println!("    outcome: {}", outcome);
                    }
                }
                println!("    excerpt: \"{}\"", hit.content.replace('\n', " "));
                println!("    document: {}", hit.document_id);
                println!();
            }
            println!(
                "{} of {} results in {} ms",
                response.results.len(),
                response.total_results,
                response.execution_time_ms
            );
            pool.close().await;
        }
        Commands::Tools => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
