//! Out-of-process LSP clients: JSON-RPC framing, process transport,
//! document synchronization, and per-language client multiplexing.
//!
//! The entry point is [`LspManager`]: it routes a file to its language's
//! client (lazily started, cached, transparently recreated after a crash),
//! keeps the server's view of document text in sync, and exposes the uniform
//! `send_request` operation built on top of both.

pub mod codec;
pub mod protocol;
pub mod types;

mod client;
mod documents;
mod manager;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{DEFAULT_REQUEST_TIMEOUT, LanguageClient};
pub use documents::{DocumentRecord, DocumentStore};
pub use manager::LspManager;
pub use types::{
    DocumentSymbol, Location, LspError, Position, Range, ServerDescriptor, SymbolInformation,
    builtin_descriptors, symbol_kind_name,
};
