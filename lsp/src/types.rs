//! Public types consumed by the multiplexer, the chunk engine, and the
//! indexing pipeline.
//!
//! [`ServerDescriptor`] describes how to launch one language server and which
//! file extensions it owns. [`LspError`] is the error taxonomy every
//! operation in this crate resolves to. The remaining types mirror the small
//! slice of the LSP wire format this system consumes (positions, ranges, and
//! document symbols).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Static description of one language server: how to launch it and which
/// files it owns. Loaded once at startup; immutable afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerDescriptor {
    /// LSP language identifier (e.g. "rust", "typescript").
    pub language: String,
    /// Executable command (e.g. "rust-analyzer").
    pub command: String,
    /// Arguments to pass to the command.
    #[serde(default)]
    pub args: Vec<String>,
    /// File extensions this server owns, lowercase, without the dot.
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Server-specific `initializationOptions` sent at handshake time.
    #[serde(default)]
    pub init_options: serde_json::Value,
}

impl ServerDescriptor {
    fn new(language: &str, command: &str, args: &[&str], extensions: &[&str]) -> Self {
        Self {
            language: language.to_string(),
            command: command.to_string(),
            args: args.iter().map(ToString::to_string).collect(),
            extensions: extensions.iter().map(ToString::to_string).collect(),
            init_options: serde_json::Value::Null,
        }
    }

    fn with_init_options(mut self, options: serde_json::Value) -> Self {
        self.init_options = options;
        self
    }
}

/// The built-in server catalog. Extension ownership is many-to-one;
/// duplicate claims resolve to the earliest entry.
#[must_use]
pub fn builtin_descriptors() -> Vec<ServerDescriptor> {
    vec![
        ServerDescriptor::new(
            "typescript",
            "typescript-language-server",
            &["--stdio"],
            &["ts", "tsx", "js", "jsx", "mjs", "cjs"],
        )
        .with_init_options(serde_json::json!({
            "preferences": {
                "includeInlayParameterNameHints": "all",
                "includeInlayFunctionParameterTypeHints": true,
                "includeInlayVariableTypeHints": true,
            }
        })),
        ServerDescriptor::new("python", "pylsp", &[], &["py", "pyi"]),
        ServerDescriptor::new("go", "gopls", &[], &["go"]),
        ServerDescriptor::new("rust", "rust-analyzer", &[], &["rs"]).with_init_options(
            serde_json::json!({ "cargo": { "allFeatures": true } }),
        ),
        ServerDescriptor::new("java", "jdtls", &[], &["java"]),
        ServerDescriptor::new("c", "clangd", &["--background-index"], &["c", "h"]),
        ServerDescriptor::new(
            "cpp",
            "clangd",
            &["--background-index"],
            &["cpp", "hpp", "cc", "cxx", "hxx"],
        ),
        ServerDescriptor::new("ruby", "solargraph", &["stdio"], &["rb"]),
        ServerDescriptor::new(
            "html",
            "vscode-html-language-server",
            &["--stdio"],
            &["html", "htm"],
        ),
        ServerDescriptor::new(
            "css",
            "vscode-css-language-server",
            &["--stdio"],
            &["css", "scss", "less"],
        ),
        ServerDescriptor::new(
            "json",
            "vscode-json-language-server",
            &["--stdio"],
            &["json", "jsonc"],
        ),
        ServerDescriptor::new("yaml", "yaml-language-server", &["--stdio"], &["yaml", "yml"]),
        ServerDescriptor::new("bash", "bash-language-server", &["start"], &["sh", "bash"]),
    ]
}

/// Errors produced by the LSP client subsystem.
#[derive(Debug, thiserror::Error)]
pub enum LspError {
    /// The server executable could not be resolved or spawned. Terminal for
    /// this attempt; the multiplexer may lazily retry on the next request.
    #[error("failed to launch {command}: {message}")]
    Spawn { command: String, message: String },

    /// The client's process is not running (never started or already gone).
    #[error("language server is not running")]
    NotRunning,

    /// The request's deadline elapsed before a response arrived. The pending
    /// entry is removed; a late response is logged and dropped.
    #[error("request {method} timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    /// The server answered with a JSON-RPC error object.
    #[error("server error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// No configured language server owns this file extension. An expected
    /// condition, not an error to log.
    #[error("unsupported file extension: {extension}")]
    UnsupportedExtension { extension: String },

    /// A document operation that requires an open document was called on a
    /// path that is not tracked. Contract violation; propagates immediately.
    #[error("document not open: {uri}")]
    DocumentNotOpen { uri: String },

    /// The client was shut down; all pending requests resolve to this.
    #[error("client was shut down")]
    ShutDown,

    /// The server process exited while requests were still pending.
    #[error("language server process exited")]
    ProcessExited,

    /// A path that cannot be represented as a `file://` URI.
    #[error("cannot convert path to file URI: {}", path.display())]
    InvalidPath { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LspError {
    /// Whether this is the expected "no server owns this file" condition,
    /// which callers skip silently rather than report.
    #[must_use]
    pub fn is_unsupported_extension(&self) -> bool {
        matches!(self, Self::UnsupportedExtension { .. })
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Zero-indexed position in a document, as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

/// Half-open range between two positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

/// URI plus range, used by the flat symbol shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub uri: String,
    pub range: Range,
}

/// One node of a hierarchical `textDocument/documentSymbol` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSymbol {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub kind: u32,
    pub range: Range,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_range: Option<Range>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DocumentSymbol>,
}

/// One entry of a flat `textDocument/documentSymbol` response. Older servers
/// return this shape instead of the hierarchical one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInformation {
    pub name: String,
    pub kind: u32,
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
}

/// Human-readable name for an LSP `SymbolKind` value.
#[must_use]
pub fn symbol_kind_name(kind: u32) -> &'static str {
    match kind {
        1 => "File",
        2 => "Module",
        3 => "Namespace",
        4 => "Package",
        5 => "Class",
        6 => "Method",
        7 => "Property",
        8 => "Field",
        9 => "Constructor",
        10 => "Enum",
        11 => "Interface",
        12 => "Function",
        13 => "Variable",
        14 => "Constant",
        15 => "String",
        16 => "Number",
        17 => "Boolean",
        18 => "Array",
        19 => "Object",
        20 => "Key",
        21 => "Null",
        22 => "EnumMember",
        23 => "Struct",
        24 => "Event",
        25 => "Operator",
        26 => "TypeParameter",
        _ => "Unknown",
    }
}
