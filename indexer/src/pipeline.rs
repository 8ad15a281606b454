//! The indexing pipeline: bounded-concurrency, resumable, crash-tolerant
//! chunking of every eligible file under a workspace root.
//!
//! Per-file failures are counted and logged but never abort the walk; only
//! the walk/log machinery itself is fatal. Language servers are recycled
//! after a configurable number of files to bound resource growth over
//! multi-hour runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;

use scry_chunk::{ChunkOptions, SemanticChunk, chunk_document, fallback_chunks, symbols_from_value};
use scry_lsp::{LspError, LspManager, protocol};

use crate::output::{self, IndexRecord};
use crate::walker;

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Log file name, created under the workspace root.
    pub output_file_name: String,
    /// In-flight file cap. Each in-flight file may hold an LSP request and a
    /// document buffer, so this bounds pressure on the server processes.
    pub max_in_flight: usize,
    /// Files above this byte count are skipped with a warning.
    pub max_file_bytes: u64,
    /// Outer deadline for one file's open → chunk sequence, independent of
    /// individual request timeouts.
    pub file_timeout: Duration,
    /// Deadline for each LSP request issued by the pipeline.
    pub request_timeout: Duration,
    /// Processed-file count between language-server recycles.
    pub recycle_interval: usize,
    pub chunk: ChunkOptions,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            output_file_name: "semantic_index.ndjson".to_string(),
            max_in_flight: 8,
            max_file_bytes: 512 * 1024,
            file_timeout: Duration::from_secs(120),
            request_timeout: Duration::from_secs(30),
            recycle_interval: 2000,
            chunk: ChunkOptions::default(),
        }
    }
}

/// Cumulative counters, logged periodically and returned at the end.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    /// Files that entered per-file processing this run.
    pub processed: u64,
    /// Files that produced an index record.
    pub indexed: u64,
    /// Files skipped by design: over the size cap or with nothing to emit.
    pub skipped: u64,
    pub errors: u64,
}

enum FileOutcome {
    Indexed,
    Skipped,
    Failed,
}

pub struct Indexer {
    manager: Arc<LspManager>,
    config: IndexerConfig,
}

impl Indexer {
    #[must_use]
    pub fn new(manager: Arc<LspManager>, config: IndexerConfig) -> Self {
        Self { manager, config }
    }

    /// Run the pipeline to completion. All language clients are shut down
    /// and the log closed before returning, on success or failure.
    pub async fn run(&self) -> Result<IndexStats> {
        let result = self.run_inner().await;
        self.manager.shutdown().await;
        result
    }

    async fn run_inner(&self) -> Result<IndexStats> {
        let root = self.manager.workspace_root().to_path_buf();
        let log_path = root.join(&self.config.output_file_name);

        let already_processed = output::scan_processed(&log_path, &root).await?;

        let language_extensions = self
            .manager
            .supported_extensions()
            .into_iter()
            .collect();
        let mut files = walker::spawn_walker(root.clone(), language_extensions);
        let (record_tx, writer) = output::spawn_writer(log_path);

        let semaphore = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let mut tasks: JoinSet<FileOutcome> = JoinSet::new();
        let mut stats = IndexStats::default();
        let mut files_since_recycle = 0usize;

        while let Some(path) = files.recv().await {
            if already_processed.contains(&path) {
                continue;
            }

            // Reap whatever finished since the last admission.
            while let Some(result) = tasks.try_join_next() {
                absorb(result, &mut stats, &mut files_since_recycle);
            }

            if files_since_recycle >= self.config.recycle_interval {
                tracing::info!(
                    files = files_since_recycle,
                    "recycling language servers"
                );
                while let Some(result) = tasks.join_next().await {
                    absorb(result, &mut stats, &mut files_since_recycle);
                }
                self.manager.shutdown().await;
                files_since_recycle = 0;
            }

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .context("acquiring worker permit")?;

            let manager = self.manager.clone();
            let record_tx = record_tx.clone();
            let root = root.clone();
            let config = self.config.clone();
            tasks.spawn(async move {
                let _permit = permit;
                process_file(&manager, &root, &path, &config, &record_tx).await
            });
        }

        while let Some(result) = tasks.join_next().await {
            absorb(result, &mut stats, &mut files_since_recycle);
        }

        drop(record_tx);
        let written = writer.await.context("joining log writer")??;

        tracing::info!(
            processed = stats.processed,
            indexed = stats.indexed,
            skipped = stats.skipped,
            errors = stats.errors,
            records = written,
            "indexing complete"
        );
        Ok(stats)
    }
}

fn absorb(
    result: Result<FileOutcome, tokio::task::JoinError>,
    stats: &mut IndexStats,
    files_since_recycle: &mut usize,
) {
    *files_since_recycle += 1;
    stats.processed += 1;
    match result {
        Ok(FileOutcome::Indexed) => stats.indexed += 1,
        Ok(FileOutcome::Skipped) => stats.skipped += 1,
        Ok(FileOutcome::Failed) => stats.errors += 1,
        Err(e) => {
            stats.errors += 1;
            tracing::error!("indexing task panicked: {e}");
        }
    }
    if stats.processed % 10 == 0 {
        tracing::info!(
            processed = stats.processed,
            errors = stats.errors,
            "indexing progress"
        );
    }
}

async fn process_file(
    manager: &LspManager,
    root: &Path,
    path: &PathBuf,
    config: &IndexerConfig,
    record_tx: &mpsc::Sender<IndexRecord>,
) -> FileOutcome {
    let rel = path
        .strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string();

    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() > config.max_file_bytes => {
            tracing::warn!(file = %rel, bytes = meta.len(), "skipping large file");
            return FileOutcome::Skipped;
        }
        Ok(_) => {}
        Err(e) => {
            tracing::error!(file = %rel, "failed to stat: {e}");
            return FileOutcome::Failed;
        }
    }

    let chunked = tokio::time::timeout(
        config.file_timeout,
        chunk_file(manager, path, config.request_timeout, config.chunk),
    )
    .await;

    match chunked {
        Ok(Ok(chunks)) => {
            if chunks.is_empty() {
                return FileOutcome::Skipped;
            }
            let record = IndexRecord {
                file_path: rel.clone(),
                chunks,
            };
            // Awaiting the bounded channel is the sink backpressure.
            if record_tx.send(record).await.is_err() {
                tracing::error!(file = %rel, "index log writer is gone");
                return FileOutcome::Failed;
            }
            FileOutcome::Indexed
        }
        Ok(Err(e)) if e.is_unsupported_extension() => {
            // Expected class: no server and no text fallback applied.
            FileOutcome::Skipped
        }
        Ok(Err(e)) => {
            tracing::error!(file = %rel, "failed to index: {e}");
            FileOutcome::Failed
        }
        Err(_) => {
            tracing::error!(
                file = %rel,
                timeout_ms = config.file_timeout.as_millis() as u64,
                "file processing timed out"
            );
            FileOutcome::Failed
        }
    }
}

/// Open the document, request its symbol tree, chunk, close the mirror.
///
/// Protocol-layer failures (no server for the extension, spawn failure, a
/// failed or empty documentSymbol) degrade to the text fallback; only
/// reading the file itself is a hard error.
async fn chunk_file(
    manager: &LspManager,
    path: &Path,
    request_timeout: Duration,
    options: ChunkOptions,
) -> Result<Vec<SemanticChunk>, LspError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file")
        .to_string();
    let uri = protocol::path_to_file_uri(path)?;
    let params = serde_json::json!({ "textDocument": { "uri": uri } });

    let response = manager
        .send_request(
            path,
            "textDocument/documentSymbol",
            Some(params),
            Some(request_timeout),
        )
        .await;

    match response {
        Ok(value) => {
            let record = manager
                .document(path)
                .await
                .ok_or(LspError::DocumentNotOpen { uri })?;
            let text = record.text().to_string();
            let symbols = symbols_from_value(&value);
            let _ = manager.close_document(path).await;
            Ok(chunk_document(&file_name, &text, &symbols, &options))
        }
        Err(e) if e.is_unsupported_extension() => {
            // Plain-text formats: no server owns them, slice directly.
            let text = tokio::fs::read_to_string(path).await?;
            Ok(fallback_chunks(&file_name, &text, &options))
        }
        Err(e) => {
            tracing::debug!(
                file = %file_name,
                "documentSymbol unavailable, using text fallback: {e}"
            );
            let text = tokio::fs::read_to_string(path).await?;
            if manager.is_document_open(path).await {
                let _ = manager.close_document(path).await;
            }
            Ok(fallback_chunks(&file_name, &text, &options))
        }
    }
}
