//! silent-cache - inspect and maintain a silent-cache store.
//!
//! Logs go to stderr; stdout carries only command output so it can be piped.

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use silent_cache::config::{CacheDefaults, PathsConfig};
use silent_cache::{CacheConfig, SilentCache, SqliteMedium};
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "silent-cache")]
#[command(about = "Inspect and maintain a stale-while-revalidate cache store")]
struct Args {
    /// Path to the cache database (defaults to the user cache directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Namespace to operate on
    #[arg(long, global = true, default_value = CacheDefaults::NAMESPACE)]
    namespace: String,

    /// Evict least recently used entries above this many bytes (0 = unbounded)
    #[arg(long, global = true, default_value_t = CacheDefaults::MAX_SIZE_BYTES)]
    max_size_bytes: u64,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the JSON stored under a key
    Get { key: String },
    /// Store a JSON value under a key
    Set { key: String, json: String },
    /// Delete a key
    Remove { key: String },
    /// Delete every key starting with a prefix
    RemovePrefix { prefix: String },
    /// List keys
    Keys {
        /// Only list keys starting with this prefix
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Show entry count and size
    Stats,
    /// Delete every key in the namespace
    Clear,
    /// Serve a key from cache and revalidate it against a JSON URL
    Watch {
        key: String,
        url: String,
        /// Extra request header as NAME:VALUE (repeatable)
        #[arg(long = "header", value_name = "NAME:VALUE")]
        headers: Vec<String>,
        /// Request timeout in seconds
        #[arg(long, default_value_t = 15)]
        timeout_secs: u64,
    },
}

fn default_db_path() -> Result<PathBuf> {
    let base = dirs::cache_dir().context("Could not determine the user cache directory")?;
    Ok(base
        .join(PathsConfig::APP_DIR_NAME)
        .join(PathsConfig::DB_FILE_NAME))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let db_path = match args.db {
        Some(path) => path,
        None => default_db_path()?,
    };
    debug!("Cache database: {}", db_path.display());

    let config = CacheConfig::default()
        .with_namespace(args.namespace)
        .with_max_size_bytes(args.max_size_bytes);
    let medium = SqliteMedium::with_config(&db_path, config)
        .with_context(|| format!("Failed to open cache at {}", db_path.display()))?;
    let cache = SilentCache::new(medium);

    let mut stdout = std::io::stdout().lock();
    match args.command {
        Command::Get { key } => commands::get(&cache, &key, &mut stdout),
        Command::Set { key, json } => commands::set(&cache, &key, &json, &mut stdout),
        Command::Remove { key } => commands::remove(&cache, &key, &mut stdout),
        Command::RemovePrefix { prefix } => commands::remove_prefix(&cache, &prefix, &mut stdout),
        Command::Keys { prefix } => commands::keys(&cache, prefix.as_deref(), &mut stdout),
        Command::Stats => commands::stats(&cache, &mut stdout),
        Command::Clear => commands::clear(&cache, &mut stdout),
        Command::Watch {
            key,
            url,
            headers,
            timeout_secs,
        } => {
            let fetcher = commands::build_fetcher(&url, &headers, timeout_secs)?;
            commands::watch(&cache, &key, fetcher, &mut stdout).await
        }
    }
}
