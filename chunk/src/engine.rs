//! The symbol-tree walk and the text fallback.

use scry_lsp::{DocumentSymbol, Range, SymbolInformation, symbol_kind_name};

use crate::slicer::slice_lines;
use crate::{ChunkRange, DEFAULT_CHUNK_TARGET, MIN_CONTEXT_LINE_LEN, SemanticChunk};

#[derive(Debug, Clone, Copy)]
pub struct ChunkOptions {
    /// Character-count target for one chunk's content.
    pub max_chars: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_CHUNK_TARGET,
        }
    }
}

/// Interpret a raw `textDocument/documentSymbol` response.
///
/// Servers return either the hierarchical `DocumentSymbol[]` shape or the
/// flat `SymbolInformation[]` shape; the flat one converts to childless
/// nodes. Anything else (null, malformed) yields no symbols, which sends
/// callers down the text-fallback path.
#[must_use]
pub fn symbols_from_value(value: &serde_json::Value) -> Vec<DocumentSymbol> {
    if value.is_null() {
        return Vec::new();
    }
    if let Ok(symbols) = serde_json::from_value::<Vec<DocumentSymbol>>(value.clone()) {
        return symbols;
    }
    if let Ok(flat) = serde_json::from_value::<Vec<SymbolInformation>>(value.clone()) {
        return flat
            .into_iter()
            .map(|symbol| DocumentSymbol {
                name: symbol.name,
                detail: None,
                kind: symbol.kind,
                range: symbol.location.range,
                selection_range: None,
                children: Vec::new(),
            })
            .collect();
    }
    Vec::new()
}

/// Chunk a document given its text and symbol tree.
///
/// With no symbols, falls back to [`fallback_chunks`]. Deterministic:
/// identical inputs produce identical chunk sequences.
#[must_use]
pub fn chunk_document(
    file_name: &str,
    text: &str,
    symbols: &[DocumentSymbol],
    options: &ChunkOptions,
) -> Vec<SemanticChunk> {
    if symbols.is_empty() {
        return fallback_chunks(file_name, text, options);
    }

    let lines: Vec<&str> = text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect();

    let mut chunks = Vec::new();
    for symbol in symbols {
        visit(symbol, None, &[], &lines, options, &mut chunks);
    }
    chunks
}

/// Slice raw text into line-respecting pieces of kind "File", named after
/// the file. Used when the symbol tree is absent, failed, or empty.
#[must_use]
pub fn fallback_chunks(file_name: &str, text: &str, options: &ChunkOptions) -> Vec<SemanticChunk> {
    slice_lines(text, options.max_chars)
        .into_iter()
        .map(|slice| {
            let end_char = last_line_chars(&slice.content);
            SemanticChunk {
                name: file_name.to_string(),
                kind: "File".to_string(),
                detail: None,
                range: ChunkRange {
                    start_line: slice.start_line as u32,
                    end_line: slice.end_line as u32,
                    start_char: 0,
                    end_char,
                },
                content: slice.content,
                parent: None,
                hierarchy: vec![file_name.to_string()],
                children: None,
            }
        })
        .collect()
}

fn visit(
    symbol: &DocumentSymbol,
    parent: Option<&str>,
    hierarchy: &[String],
    lines: &[&str],
    options: &ChunkOptions,
    out: &mut Vec<SemanticChunk>,
) {
    let text = extract_range(lines, &symbol.range);

    // Hierarchy is carried by value down each branch: ancestors first, this
    // symbol's own opening line last.
    let mut own_hierarchy = hierarchy.to_vec();
    if let Some(context) = context_line(lines, &symbol.range) {
        own_hierarchy.push(context);
    }

    let char_count = text.chars().count();

    if symbol.children.is_empty() {
        emit_leaf(symbol, parent, &own_hierarchy, &text, char_count, options, out);
    } else if char_count <= options.max_chars {
        // Fits whole: one chunk whose content already covers the children;
        // the child chunks ride along nested rather than as siblings.
        let mut nested = Vec::new();
        for child in &symbol.children {
            visit(child, Some(symbol.name.as_str()), &own_hierarchy, lines, options, &mut nested);
        }
        out.push(SemanticChunk {
            name: symbol.name.clone(),
            kind: symbol_kind_name(symbol.kind).to_string(),
            detail: symbol.detail.clone(),
            range: chunk_range(&symbol.range),
            content: text,
            parent: parent.map(ToString::to_string),
            hierarchy: own_hierarchy,
            children: if nested.is_empty() { None } else { Some(nested) },
        });
    } else {
        // Grouping node: its own body is covered by its children's chunks.
        for child in &symbol.children {
            visit(child, Some(symbol.name.as_str()), &own_hierarchy, lines, options, out);
        }
    }
}

fn emit_leaf(
    symbol: &DocumentSymbol,
    parent: Option<&str>,
    hierarchy: &[String],
    text: &str,
    char_count: usize,
    options: &ChunkOptions,
    out: &mut Vec<SemanticChunk>,
) {
    if char_count <= options.max_chars {
        out.push(SemanticChunk {
            name: symbol.name.clone(),
            kind: symbol_kind_name(symbol.kind).to_string(),
            detail: symbol.detail.clone(),
            range: chunk_range(&symbol.range),
            content: text.to_string(),
            parent: parent.map(ToString::to_string),
            hierarchy: hierarchy.to_vec(),
            children: None,
        });
        return;
    }

    // Oversized leaf: sibling chunks sharing all metadata.
    for slice in slice_lines(text, options.max_chars) {
        let start_char = if slice.start_line == 0 {
            symbol.range.start.character
        } else {
            0
        };
        out.push(SemanticChunk {
            name: symbol.name.clone(),
            kind: symbol_kind_name(symbol.kind).to_string(),
            detail: symbol.detail.clone(),
            range: ChunkRange {
                start_line: symbol.range.start.line + slice.start_line as u32,
                end_line: symbol.range.start.line + slice.end_line as u32,
                start_char,
                end_char: last_line_chars(&slice.content),
            },
            content: slice.content,
            parent: parent.map(ToString::to_string),
            hierarchy: hierarchy.to_vec(),
            children: None,
        });
    }
}

fn chunk_range(range: &Range) -> ChunkRange {
    ChunkRange {
        start_line: range.start.line,
        end_line: range.end.line,
        start_char: range.start.character,
        end_char: range.end.character,
    }
}

/// The trimmed source line a symbol starts on; omitted when too short to
/// carry any context.
fn context_line(lines: &[&str], range: &Range) -> Option<String> {
    let line = lines.get(range.start.line as usize)?.trim();
    if line.chars().count() < MIN_CONTEXT_LINE_LEN {
        None
    } else {
        Some(line.to_string())
    }
}

/// Slice the line buffer at a symbol's declared range: the partial first and
/// last lines concatenated with any full lines between. Out-of-range spans
/// clamp to the buffer.
fn extract_range(lines: &[&str], range: &Range) -> String {
    let start_line = range.start.line as usize;
    if lines.is_empty() || start_line >= lines.len() {
        return String::new();
    }
    let end_line = (range.end.line as usize).min(lines.len() - 1);
    let start_char = range.start.character as usize;
    let end_char = range.end.character as usize;

    if start_line == end_line {
        return char_slice(lines[start_line], start_char, Some(end_char));
    }

    let mut parts = Vec::with_capacity(end_line - start_line + 1);
    parts.push(char_slice(lines[start_line], start_char, None));
    for line in &lines[start_line + 1..end_line] {
        parts.push((*line).to_string());
    }
    parts.push(char_slice(lines[end_line], 0, Some(end_char)));
    parts.join("\n")
}

fn char_slice(line: &str, from: usize, to: Option<usize>) -> String {
    match to {
        Some(to) => line
            .chars()
            .skip(from)
            .take(to.saturating_sub(from))
            .collect(),
        None => line.chars().skip(from).collect(),
    }
}

fn last_line_chars(content: &str) -> u32 {
    let trimmed = content.strip_suffix('\n').unwrap_or(content);
    trimmed
        .rsplit('\n')
        .next()
        .unwrap_or("")
        .chars()
        .count() as u32
}
