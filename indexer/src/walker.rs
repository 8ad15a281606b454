//! Deterministic directory walk feeding the pipeline.
//!
//! Runs on a blocking thread and streams eligible file paths into a bounded
//! channel; a slow consumer suspends the walk instead of buffering the tree
//! in memory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use tokio::sync::mpsc;

const WALK_CHANNEL_CAPACITY: usize = 256;

/// Directory names never descended into: version control, dependency
/// caches, build output, editor state.
pub(crate) const EXCLUDED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "dist",
    "build",
    "coverage",
    ".vscode",
    ".idea",
    ".cache",
    ".mypy_cache",
    ".pytest_cache",
    "__pycache__",
    ".cargo",
    ".rustup",
    ".terraform",
    ".venv",
    "venv",
    "vendor",
    ".npm",
];

/// Plain-text formats indexed through the text fallback even though no
/// language server owns them.
pub(crate) const TEXT_EXTENSIONS: &[&str] = &[
    "md", "txt", "yaml", "yml", "json", "xml", "html", "css", "sh", "conf", "ini", "toml", "lock",
];

/// Whether a file should enter the pipeline. The index log itself (any
/// `.ndjson`) is always skipped.
pub(crate) fn is_eligible(path: &Path, language_extensions: &HashSet<String>) -> bool {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    if name.ends_with(".ndjson") {
        return false;
    }
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = ext.to_lowercase();
    language_extensions.contains(&ext) || TEXT_EXTENSIONS.contains(&ext.as_str())
}

/// Walk `root` on a blocking thread, streaming eligible files in sorted
/// order. Dropping the receiver stops the walk.
pub(crate) fn spawn_walker(
    root: PathBuf,
    language_extensions: HashSet<String>,
) -> mpsc::Receiver<PathBuf> {
    let (tx, rx) = mpsc::channel(WALK_CHANNEL_CAPACITY);

    tokio::task::spawn_blocking(move || {
        let mut builder = WalkBuilder::new(&root);
        builder.standard_filters(false);
        builder.follow_links(false);
        builder.filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            if !is_dir {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !EXCLUDED_DIRS.contains(&name.as_ref())
        });
        builder.sort_by_file_path(|a, b| a.cmp(b));

        for entry in builder.build() {
            let Ok(entry) = entry else {
                // Unreadable entries (permissions, races) are skipped.
                continue;
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let path = entry.into_path();
            if !is_eligible(&path, &language_extensions) {
                continue;
            }
            if tx.blocking_send(path).is_err() {
                // Receiver gone: the pipeline stopped, so does the walk.
                break;
            }
        }
    });

    rx
}
