//! Symbol-guided line chunking with fixed-size window fallback.

use serde::{Deserialize, Serialize};

use crate::hash::content_hash;

pub const CHARS_PER_TOKEN: usize = 4;

/// Rough token estimate: one token per four characters, rounded up.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Symbol span supplied by the graph builder. Lines are 0-based and inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,
}

impl Symbol {
    #[must_use]
    pub fn new(name: impl Into<String>, start_line: usize, end_line: usize) -> Self {
        Self {
            name: name.into(),
            start_line,
            end_line,
        }
    }
}

/// Chunker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Target chunk size in estimated tokens (default: 800).
    pub max_tokens: usize,
    /// Symbols estimated above this are split into windows (default: 1200).
    pub oversize_tokens: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_tokens: 800,
            oversize_tokens: 1200,
        }
    }
}

impl ChunkerConfig {
    /// Lines per fallback window.
    #[must_use]
    pub fn window_lines(&self) -> usize {
        self.max_tokens.div_ceil(CHARS_PER_TOKEN).max(1)
    }
}

/// One chunk of source text with 0-based inclusive line bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeChunk {
    pub symbol: Option<String>,
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
    pub content_hash: String,
    pub tokens: usize,
}

/// A symbol span the chunker could not use.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkingError {
    #[error("{path}: symbol {symbol} ends before it starts ({start_line}..{end_line})")]
    InvertedSpan {
        path: String,
        symbol: String,
        start_line: usize,
        end_line: usize,
    },

    #[error("{path}: symbol {symbol} starts at line {start_line}, file has {line_count} lines")]
    OutOfRange {
        path: String,
        symbol: String,
        start_line: usize,
        line_count: usize,
    },
}

/// Output of [`chunk_file`]: usable chunks plus the symbols that were skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunked {
    pub chunks: Vec<CodeChunk>,
    pub rejected: Vec<ChunkingError>,
}

/// Split `content` into chunks, one per symbol when spans are given.
///
/// Oversized symbols and symbol-less files fall back to non-overlapping line
/// windows of [`ChunkerConfig::window_lines`]. Whitespace-only pieces are
/// dropped. Spans ending past EOF are clamped to the last line.
#[must_use]
pub fn chunk_file(
    path: &str,
    content: &str,
    symbols: &[Symbol],
    config: &ChunkerConfig,
) -> Chunked {
    let lines: Vec<&str> = content.split('\n').collect();
    let last_line = lines.len() - 1;
    let mut out = Chunked::default();

    if symbols.is_empty() {
        push_windows(&mut out.chunks, &lines, None, 0, last_line, config);
        return out;
    }

    for symbol in symbols {
        if symbol.end_line < symbol.start_line {
            let err = ChunkingError::InvertedSpan {
                path: path.to_owned(),
                symbol: symbol.name.clone(),
                start_line: symbol.start_line,
                end_line: symbol.end_line,
            };
            tracing::warn!(error = %err, "skipping symbol");
            out.rejected.push(err);
            continue;
        }
        if symbol.start_line > last_line {
            let err = ChunkingError::OutOfRange {
                path: path.to_owned(),
                symbol: symbol.name.clone(),
                start_line: symbol.start_line,
                line_count: lines.len(),
            };
            tracing::warn!(error = %err, "skipping symbol");
            out.rejected.push(err);
            continue;
        }

        let start = symbol.start_line;
        let end = symbol.end_line.min(last_line);
        let text = lines[start..=end].join("\n");
        let tokens = estimate_tokens(&text);

        if tokens > config.oversize_tokens {
            tracing::debug!(path, symbol = %symbol.name, tokens, "splitting oversize symbol");
            push_windows(&mut out.chunks, &lines, Some(&symbol.name), start, end, config);
        } else if !text.trim().is_empty() {
            out.chunks.push(CodeChunk {
                symbol: Some(symbol.name.clone()),
                start_line: start,
                end_line: end,
                content_hash: content_hash(&text),
                text,
                tokens,
            });
        }
    }

    out
}

fn push_windows(
    chunks: &mut Vec<CodeChunk>,
    lines: &[&str],
    symbol: Option<&str>,
    start: usize,
    end: usize,
    config: &ChunkerConfig,
) {
    let window = config.window_lines();
    for window_start in (start..=end).step_by(window) {
        let window_end = (window_start + window - 1).min(end);
        let text = lines[window_start..=window_end].join("\n");
        if text.trim().is_empty() {
            continue;
        }
        chunks.push(CodeChunk {
            symbol: symbol.map(str::to_owned),
            start_line: window_start,
            end_line: window_end,
            tokens: estimate_tokens(&text),
            content_hash: content_hash(&text),
            text,
        });
    }
}
