//! The append-only NDJSON index log: record shape, resume scan, and the
//! single writer task.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc;

use scry_chunk::SemanticChunk;

/// A full channel suspends producers — the pipeline's write backpressure.
const RECORD_CHANNEL_CAPACITY: usize = 16;

/// One indexed file: appended once, never mutated. Resumption works by
/// recording which paths already produced a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRecord {
    /// Workspace-relative path.
    pub file_path: String,
    pub chunks: Vec<SemanticChunk>,
}

/// Just enough of a record line to learn which file it covers.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordHeader {
    file_path: String,
}

/// Scan an existing log once and collect the absolute paths it already
/// covers. A missing log means a fresh run. Unparsable lines (the torn tail
/// of a previous crash) are skipped, not fatal.
pub async fn scan_processed(log_path: &Path, root: &Path) -> Result<HashSet<PathBuf>> {
    let file = match File::open(log_path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(e) => return Err(e).context("opening existing index log"),
    };

    let mut processed = HashSet::new();
    let mut corrupt = 0usize;
    let mut lines = BufReader::new(file).lines();
    while let Some(line) = lines.next_line().await.context("reading index log")? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RecordHeader>(&line) {
            Ok(header) => {
                processed.insert(root.join(&header.file_path));
            }
            Err(_) => corrupt += 1,
        }
    }

    if corrupt > 0 {
        tracing::warn!(count = corrupt, "skipped unparsable lines in existing index log");
    }
    tracing::info!(count = processed.len(), "found already-indexed files to resume past");
    Ok(processed)
}

/// Spawn the single task owning the log file. Records arrive on a bounded
/// channel; the task appends one compact JSON line per record and flushes it
/// so a crash costs at most the line in flight. Returns the record count on
/// clean close.
pub(crate) fn spawn_writer(
    log_path: PathBuf,
) -> (
    mpsc::Sender<IndexRecord>,
    tokio::task::JoinHandle<Result<u64>>,
) {
    let (tx, mut rx) = mpsc::channel::<IndexRecord>(RECORD_CHANNEL_CAPACITY);

    let handle = tokio::spawn(async move {
        let terminate_torn_tail = ends_without_newline(&log_path).await;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
            .with_context(|| format!("opening index log {}", log_path.display()))?;
        let mut writer = BufWriter::new(file);
        if terminate_torn_tail {
            // A previous crash left a partial line; terminate it so new
            // records stay line-delimited.
            writer.write_all(b"\n").await.context("terminating torn tail")?;
        }
        let mut written = 0u64;

        while let Some(record) = rx.recv().await {
            let mut line = serde_json::to_string(&record).context("serializing index record")?;
            line.push('\n');
            writer
                .write_all(line.as_bytes())
                .await
                .context("writing index record")?;
            writer.flush().await.context("flushing index log")?;
            written += 1;
        }

        writer.flush().await.context("closing index log")?;
        Ok(written)
    });

    (tx, handle)
}

/// Whether the log exists, is non-empty, and its last byte is not a
/// newline — the signature of a torn tail from a crash mid-write.
async fn ends_without_newline(path: &Path) -> bool {
    use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};

    let Ok(mut file) = File::open(path).await else {
        return false;
    };
    let Ok(len) = file.seek(SeekFrom::End(0)).await else {
        return false;
    };
    if len == 0 || file.seek(SeekFrom::End(-1)).await.is_err() {
        return false;
    }
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await.is_ok() && last[0] != b'\n'
}
