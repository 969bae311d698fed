//! Collect source files under a root, honoring `.gitignore`.

use std::collections::HashMap;
use std::path::Path;
use std::time::UNIX_EPOCH;

use anyhow::Context;
use ignore::WalkBuilder;
use intellimap_core::SourceFile;
use intellimap_index::chunker::Symbol;

/// Files larger than this are skipped.
pub const MAX_FILE_SIZE_BYTES: u64 = 1024 * 1024;

/// Symbol spans keyed by root-relative path, as emitted by the graph builder.
pub type SymbolHints = HashMap<String, Vec<Symbol>>;

/// # Errors
///
/// Returns an error if the file cannot be read or is not valid JSON.
pub fn load_symbol_hints(path: &Path) -> anyhow::Result<SymbolHints> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read symbols file {}", path.display()))?;
    serde_json::from_str(&raw).context("failed to parse symbols file")
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Walk `root` and read every text file, attaching symbol hints by path.
///
/// Binary, non-UTF-8 and oversized files are skipped. Output is sorted by
/// path.
#[must_use]
pub fn scan(root: &Path, hints: &SymbolHints) -> Vec<SourceFile> {
    let mut files = Vec::new();
    let mut builder = WalkBuilder::new(root);
    builder.hidden(true).git_ignore(true).git_exclude(true);

    for result in builder.build() {
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if meta.len() > MAX_FILE_SIZE_BYTES {
            tracing::debug!(path = %path.display(), bytes = meta.len(), "skipping large file");
            continue;
        }
        let Ok(content) = std::fs::read_to_string(path) else {
            tracing::debug!(path = %path.display(), "skipping unreadable or non-UTF-8 file");
            continue;
        };
        if content.contains('\0') {
            continue;
        }

        let rel = relative_path(root, path);
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .and_then(|d| i64::try_from(d.as_secs()).ok());
        files.push(SourceFile {
            symbols: hints.get(&rel).cloned().unwrap_or_default(),
            path: rel,
            content,
            mtime,
            ..SourceFile::default()
        });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    tracing::info!(root = %root.display(), files = files.len(), "scan complete");
    files
}
