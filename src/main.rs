//! # local-rag CLI (`lrag`)
//!
//! Runs the two HTTP services and the one-shot Qdrant loader.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lrag serve embed` | Start the embedding service (`POST /embed`) |
//! | `lrag serve extract` | Start the extraction service (`POST /file`) |
//! | `lrag extract <file>` | Extract text from a local file and print the JSON |
//! | `lrag load` | Embed texts, upsert into Qdrant, run a test search |
//! | `lrag search "<query>"` | Search the Qdrant collection |
//!
//! ## Examples
//!
//! ```bash
//! lrag serve embed
//! lrag serve extract --config ./config/lrag.toml
//! lrag extract ./scan.png
//! QDRANT_API_KEY=... lrag load --text "The quick brown fox" --text "A lazy dog"
//! lrag search "fast fox" --limit 5
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use local_rag::{config, extract, loader, logging, server};

/// local-rag: local embedding, text extraction, and Qdrant loading.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means "use defaults". See `config/lrag.example.toml`.
#[derive(Parser)]
#[command(name = "lrag", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lrag.toml")]
    config: PathBuf,

    /// Debug-level logging (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start one of the HTTP services.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },

    /// Extract text from a local file and print the response JSON.
    ///
    /// Uses the same pipeline and truncation as `POST /file`.
    Extract {
        /// File to extract.
        path: PathBuf,
    },

    /// Embed texts through the embedding service and upsert them into Qdrant.
    ///
    /// Without `--text` or `--file`, loads a two-sentence sample. After
    /// upserting, runs a test search unless `--no-search` is given.
    Load {
        /// Text to load (repeatable).
        #[arg(long = "text")]
        texts: Vec<String>,

        /// File with one text per line (blank lines skipped).
        #[arg(long)]
        file: Option<PathBuf>,

        /// Query for the test search.
        #[arg(long, default_value = loader::DEFAULT_QUERY)]
        query: String,

        /// Number of search results.
        #[arg(long, default_value_t = loader::DEFAULT_LIMIT)]
        limit: usize,

        /// Id of the first point; later points count up from it.
        #[arg(long, default_value_t = 0)]
        start_id: u64,

        /// Skip the test search.
        #[arg(long)]
        no_search: bool,

        /// Qdrant API key.
        #[arg(long, env = "QDRANT_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },

    /// Search the configured Qdrant collection.
    Search {
        /// Query text.
        query: String,

        /// Number of results.
        #[arg(long, default_value_t = loader::DEFAULT_LIMIT)]
        limit: usize,

        /// Qdrant API key.
        #[arg(long, env = "QDRANT_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
}

/// Server subcommands.
#[derive(Subcommand)]
enum ServeService {
    /// Sentence embedding service: `POST /embed`.
    ///
    /// Loads the configured model (downloading it on first run), then binds
    /// to `[server].embed_bind`.
    Embed,
    /// File text extraction service: `POST /file`.
    ///
    /// Binds to `[server].extract_bind`.
    Extract,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env must be loaded before clap reads env-backed flags.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    logging::init_logger(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve { service } => match service {
            ServeService::Embed => server::run_embed_server(&cfg).await?,
            ServeService::Extract => server::run_extract_server(&cfg).await?,
        },
        Commands::Extract { path } => {
            let extracted = extract::extract_path(&path, &cfg.extract)
                .await
                .with_context(|| format!("Failed to extract {}", path.display()))?;
            println!("{}", serde_json::to_string_pretty(&extracted)?);
        }
        Commands::Load {
            texts,
            file,
            query,
            limit,
            start_id,
            no_search,
            api_key,
        } => {
            let opts = loader::LoadOptions {
                texts,
                file,
                query,
                limit,
                start_id,
                search: !no_search,
                api_key,
            };
            loader::run_load(&cfg, &opts).await?;
        }
        Commands::Search {
            query,
            limit,
            api_key,
        } => {
            loader::run_search(&cfg, &query, limit, api_key.as_deref()).await?;
        }
    }

    Ok(())
}
