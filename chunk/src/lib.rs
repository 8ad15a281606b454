//! Semantic chunk engine.
//!
//! Turns a document's text plus its `textDocument/documentSymbol` tree into
//! an ordered list of size-bounded [`SemanticChunk`]s, each annotated with
//! the hierarchy of ancestor context lines down to it. With no usable symbol
//! tree, the raw text is sliced into line-respecting pieces instead.

use serde::{Deserialize, Serialize};

mod engine;
mod slicer;

pub use engine::{ChunkOptions, chunk_document, fallback_chunks, symbols_from_value};

/// Character-count target for one chunk's content.
pub const DEFAULT_CHUNK_TARGET: usize = 1500;

/// Context lines shorter than this (a lone brace, `};`) add nothing and are
/// omitted from hierarchies.
pub const MIN_CONTEXT_LINE_LEN: usize = 4;

/// Zero-indexed source span of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRange {
    pub start_line: u32,
    pub end_line: u32,
    pub start_char: u32,
    pub end_char: u32,
}

/// A size-bounded unit of source text annotated with its originating
/// symbol's name and kind plus ancestor context. Immutable once emitted; it
/// is serialized into the index and discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticChunk {
    pub name: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub range: ChunkRange,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// The trimmed source line opening each ancestor scope, outermost first,
    /// ending with this chunk's own opening line. A reader reconstructs
    /// nesting context from this alone, without the symbol tree.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hierarchy: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<SemanticChunk>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_serializes_camel_case_and_omits_empty_fields() {
        let chunk = SemanticChunk {
            name: "add".to_string(),
            kind: "Function".to_string(),
            detail: None,
            range: ChunkRange {
                start_line: 0,
                end_line: 2,
                start_char: 0,
                end_char: 1,
            },
            content: "fn add() {}".to_string(),
            parent: None,
            hierarchy: vec!["fn add() {}".to_string()],
            children: None,
        };

        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["range"]["startLine"], 0);
        assert_eq!(json["range"]["endChar"], 1);
        assert!(json.get("detail").is_none());
        assert!(json.get("parent").is_none());
        assert!(json.get("children").is_none());
        assert_eq!(json["hierarchy"][0], "fn add() {}");
    }

    #[test]
    fn chunk_roundtrips_through_json() {
        let chunk = SemanticChunk {
            name: "Outer".to_string(),
            kind: "Class".to_string(),
            detail: Some("class Outer".to_string()),
            range: ChunkRange {
                start_line: 3,
                end_line: 9,
                start_char: 0,
                end_char: 1,
            },
            content: "class Outer { ... }".to_string(),
            parent: Some("module".to_string()),
            hierarchy: vec!["module m".to_string(), "class Outer {".to_string()],
            children: None,
        };

        let json = serde_json::to_string(&chunk).unwrap();
        let back: SemanticChunk = serde_json::from_str(&json).unwrap();
        assert_eq!(back, chunk);
    }
}
