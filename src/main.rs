mod cli;
mod server;
mod tools;

use mnemos::{config, db, error, orchestrator, types};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mnemos", version, about = "Session and note memory MCP server for AI agents")]
struct Cli {
    /// Config file (default: ~/.mnemos/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server
    Serve {
        /// Transport: stdio or http (default from config)
        #[arg(long)]
        transport: Option<String>,
    },
    /// Manage the embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
    /// Ingest session messages from a JSON file
    Ingest {
        /// File holding one session object or an array of them
        file: PathBuf,
    },
    /// Search sessions and notes
    Search {
        query: String,
        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
        /// all, session or memory
        #[arg(long = "type", default_value = "all")]
        search_type: types::SearchType,
    },
    /// Read a session chunk or a note
    Read {
        id: String,
        /// Zero-based session chunk
        #[arg(long)]
        chunk: Option<usize>,
    },
    /// Rebuild the search index from storage
    Reindex,
    /// Show storage and index statistics
    Stats,
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model to ~/.mnemos/models/
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::MnemosConfig::load_from(path)?,
        None => config::MnemosConfig::load()?,
    };

    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { transport } => {
            server::serve(config, transport.as_deref()).await?;
        }
        Command::Model { action } => match action {
            ModelAction::Download => {
                cli::model_download(&config.embedding).await?;
            }
        },
        Command::Ingest { file } => cli::ingest::ingest(&config, &file).await?,
        Command::Search {
            query,
            limit,
            search_type,
        } => cli::search::search(&config, &query, limit, search_type).await?,
        Command::Read { id, chunk } => cli::read::read(&config, &id, chunk).await?,
        Command::Reindex => cli::reindex::reindex(&config).await?,
        Command::Stats => cli::stats::stats(&config).await?,
    }

    Ok(())
}
