mod cli;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use xmemory::config::{self, XMemoryConfig};
use xmemory::memory::MemoryType;

#[derive(Parser)]
#[command(name = "xmemory", version, about = "Personal memory store with keyword, vector and hybrid search")]
struct Cli {
    /// Config file (defaults to ~/.xmemory/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the server (MCP over stdio, or REST + MCP over HTTP)
    Serve {
        /// stdio | http; overrides server.transport
        #[arg(long)]
        transport: Option<String>,
    },
    /// Write a starter config and create the memory index
    Init,
    /// Similarity search
    Search {
        query: String,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        k: Option<usize>,
    },
    /// List memories, newest first
    List {
        #[arg(long)]
        user: Option<String>,
        #[arg(long = "type")]
        memory_type: Option<MemoryType>,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 10)]
        page_size: usize,
    },
    /// Print one memory as JSON
    Get { id: String },
    /// Delete one memory
    Delete { id: String },
    /// Export memories as JSON to stdout
    Export {
        #[arg(long)]
        user: Option<String>,
    },
    /// Drop and recreate the memory index
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(config::default_config_path);

    let config = XMemoryConfig::load_from(&config_path)?;

    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { transport } => {
            let transport = transport.unwrap_or_else(|| config.server.transport.clone());
            match transport.as_str() {
                "stdio" => xmemory::server::serve_stdio(config).await?,
                "http" => xmemory::server::serve_http(config).await?,
                other => bail!("unknown transport {other:?}, expected stdio or http"),
            }
        }
        Command::Init => cli::init::init(&config_path).await?,
        Command::Search { query, user, k } => {
            cli::search::search(&config, &query, user.as_deref(), k).await?
        }
        Command::List {
            user,
            memory_type,
            page,
            page_size,
        } => cli::list::list(&config, user.as_deref(), memory_type, page, page_size).await?,
        Command::Get { id } => cli::get::get(&config, &id).await?,
        Command::Delete { id } => cli::delete::delete(&config, &id).await?,
        Command::Export { user } => cli::export::export(&config, user.as_deref()).await?,
        Command::Reset => cli::reset::reset(&config).await?,
    }

    Ok(())
}
