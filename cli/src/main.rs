//! scry CLI — binary entry point for the indexing pipeline.
//!
//! Walks the given workspace root, drives the configured language servers,
//! and appends semantic chunk records to the resumable NDJSON index log.
//! Re-running over an unchanged tree is additive: already-indexed files are
//! skipped.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use scry_chunk::{ChunkOptions, DEFAULT_CHUNK_TARGET};
use scry_index::{Indexer, IndexerConfig};
use scry_lsp::LspManager;

#[derive(Debug, Parser)]
#[command(name = "scry", version, about = "LSP-driven semantic index builder")]
struct Args {
    /// Workspace root to index.
    #[arg(default_value = ".")]
    root: PathBuf,

    /// Index log file name, created under the workspace root.
    #[arg(long, default_value = "semantic_index.ndjson")]
    output: String,

    /// Maximum number of files chunked at once.
    #[arg(long, default_value_t = 8)]
    concurrency: usize,

    /// Skip files larger than this many kilobytes.
    #[arg(long, default_value_t = 512)]
    max_file_kb: u64,

    /// Outer per-file deadline in seconds.
    #[arg(long, default_value_t = 120)]
    file_timeout_secs: u64,

    /// Per-request deadline in seconds.
    #[arg(long, default_value_t = 30)]
    request_timeout_secs: u64,

    /// Restart all language servers after this many processed files.
    #[arg(long, default_value_t = 2000)]
    recycle_interval: usize,

    /// Character-count target for one chunk.
    #[arg(long, default_value_t = DEFAULT_CHUNK_TARGET)]
    chunk_chars: usize,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();
    if args.concurrency == 0 {
        bail!("--concurrency must be at least 1");
    }

    let root = args
        .root
        .canonicalize()
        .with_context(|| format!("resolving workspace root {}", args.root.display()))?;
    if !root.is_dir() {
        bail!("workspace root {} is not a directory", root.display());
    }

    tracing::info!(root = %root.display(), "starting semantic indexing");

    let manager = Arc::new(LspManager::new(&root));
    let config = IndexerConfig {
        output_file_name: args.output,
        max_in_flight: args.concurrency,
        max_file_bytes: args.max_file_kb * 1024,
        file_timeout: Duration::from_secs(args.file_timeout_secs),
        request_timeout: Duration::from_secs(args.request_timeout_secs),
        recycle_interval: args.recycle_interval,
        chunk: ChunkOptions {
            max_chars: args.chunk_chars.max(1),
        },
    };

    let stats = Indexer::new(manager, config).run().await?;

    println!(
        "indexed {} of {} processed files ({} skipped, {} errors)",
        stats.indexed, stats.processed, stats.skipped, stats.errors
    );
    Ok(())
}
