//! Resumable bounded-concurrency indexing pipeline.
//!
//! Walks a workspace tree, feeds every eligible file through the LSP
//! multiplexer and the semantic chunk engine, and appends one NDJSON record
//! per file to a resumable output log.

mod output;
mod pipeline;
mod walker;

pub use output::{IndexRecord, scan_processed};
pub use pipeline::{IndexStats, Indexer, IndexerConfig};
