mod audit;
mod embed;
mod import;
mod search;
mod stats;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use canlex_store::DuckStore;

#[derive(Parser)]
#[command(
    name = "canlex",
    version,
    about = "Canadian federal legislation ingestion, embedding, and retrieval tools"
)]
struct Cli {
    /// Data directory: XML corpus under xml/, DuckDB file, LanceDB directory,
    /// progress log, and models/
    #[arg(long, default_value = "./data", global = true)]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse legislation XML and replace document row families in DuckDB
    ImportLegislation {
        /// Import at most N files
        #[arg(long)]
        limit: Option<usize>,

        /// Parse without writing
        #[arg(long)]
        dry_run: bool,

        /// Restrict to one document type
        #[arg(long, value_parser = ["act", "regulation"])]
        r#type: Option<String>,

        /// Restrict to one language
        #[arg(long, value_parser = ["en", "fr"])]
        lang: Option<String>,

        /// Comma-separated document ids (act ids expand to their regulations
        /// when importing regulations and lookup.xml is present)
        #[arg(long, value_delimiter = ',')]
        ids: Vec<String>,

        /// Import a small sample (first 5 matching files)
        #[arg(long)]
        sample: bool,

        /// Skip documents already present
        #[arg(long)]
        skip_existing: bool,

        /// Remove all rows before importing
        #[arg(long)]
        truncate: bool,

        /// Per-file status lines
        #[arg(long)]
        verbose: bool,
    },

    /// Chunk and embed documents, sections, and defined terms
    EmbedLegislation {
        /// Process at most N documents per source type
        #[arg(long)]
        limit: Option<usize>,

        /// Build chunks without embedding or writing
        #[arg(long)]
        dry_run: bool,

        /// Skip chunks already recorded in the progress tracker
        #[arg(long)]
        skip_existing: bool,

        /// Chunks per embedder call
        #[arg(long)]
        batch_size: Option<usize>,

        /// Restrict to one source type
        #[arg(long, value_parser = [
            "act", "regulation", "act_section", "regulation_section", "defined_term",
        ])]
        source_type: Option<String>,
    },

    /// Re-embed stored chunks with a different model
    Reembed {
        /// Select rows tagged with this model
        #[arg(long, conflicts_with = "null_models")]
        from_model: Option<String>,

        /// Select legacy rows with no model tag
        #[arg(long)]
        null_models: bool,

        /// Model tag to write
        #[arg(long)]
        to_model: Option<String>,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        batch_size: Option<usize>,

        #[arg(long)]
        dry_run: bool,

        /// List stored model tags and exit
        #[arg(long)]
        list_models: bool,
    },

    /// Hybrid search with intent-aware citation selection
    Search {
        /// Query text
        query: String,

        /// Retrieval intent tag
        #[arg(long, default_value = "general")]
        intent: String,

        /// Maximum citations
        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Display language
        #[arg(long, default_value = "en", value_parser = ["en", "fr"])]
        lang: String,

        /// Restrict to one source type
        #[arg(long)]
        source_type: Option<String>,
    },

    /// Show corpus summary statistics
    Stats,

    /// Report schema elements observed in the corpus that the parser does
    /// not handle
    CheckSchemaCoverage,

    /// Inventory every element and attribute tuple in the XML corpus
    AuditXmlSchema {
        /// Scan at most N files
        #[arg(long)]
        limit: Option<usize>,

        /// Write the inventory as JSON to this file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Print attribute tuples as well as elements
        #[arg(long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let data_dir = &cli.data_dir;

    let exit = match cli.command {
        Command::ImportLegislation {
            limit,
            dry_run,
            r#type,
            lang,
            ids,
            sample,
            skip_existing,
            truncate,
            verbose,
        } => {
            let store = open_duck(data_dir)?;
            import::run_import(
                &store,
                data_dir,
                &import::ImportOptions {
                    limit,
                    dry_run,
                    doc_type: r#type,
                    lang,
                    ids,
                    sample,
                    skip_existing,
                    truncate,
                    verbose,
                },
            )?
        }
        Command::EmbedLegislation {
            limit,
            dry_run,
            skip_existing,
            batch_size,
            source_type,
        } => {
            let store = open_duck(data_dir)?;
            embed::run_embed(
                &store,
                data_dir,
                limit,
                dry_run,
                skip_existing,
                batch_size,
                source_type,
            )
            .await?
        }
        Command::Reembed {
            from_model,
            null_models,
            to_model,
            limit,
            batch_size,
            dry_run,
            list_models,
        } => {
            let store = open_duck(data_dir)?;
            embed::run_reembed_cmd(
                &store,
                data_dir,
                from_model,
                null_models,
                to_model,
                limit,
                batch_size,
                dry_run,
                list_models,
            )
            .await?
        }
        Command::Search {
            query,
            intent,
            limit,
            lang,
            source_type,
        } => {
            let store = open_duck(data_dir)?;
            search::run_search(&store, data_dir, &query, &intent, limit, &lang, source_type)
                .await?
        }
        Command::Stats => {
            let store = open_duck(data_dir)?;
            stats::run_stats(&store)?
        }
        Command::CheckSchemaCoverage => audit::run_coverage(data_dir)?,
        Command::AuditXmlSchema {
            limit,
            output,
            verbose,
        } => audit::run_audit(data_dir, limit, output, verbose)?,
    };

    std::process::exit(exit);
}

fn open_duck(data_dir: &PathBuf) -> anyhow::Result<DuckStore> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data directory '{}'", data_dir.display()))?;
    let db_path = data_dir.join("canlex.duckdb");
    DuckStore::open_persistent(&db_path)
        .with_context(|| format!("opening database '{}'", db_path.display()))
}
