//! Rendering search hits as prompt context.

use std::fmt::Write as _;

use crate::chunker::estimate_tokens;
use crate::search::SearchHit;

/// Estimated tokens spent on the XML wrapper of one chunk.
pub const CHUNK_OVERHEAD_TOKENS: usize = 20;

/// Keep the leading hits that fit in `token_budget`, stopping at the first
/// that does not.
#[must_use]
pub fn pack_hits(hits: &[SearchHit], token_budget: usize) -> &[SearchHit] {
    let mut used = 0;
    for (i, hit) in hits.iter().enumerate() {
        let cost = estimate_tokens(&hit.chunk.text) + CHUNK_OVERHEAD_TOKENS;
        if used + cost > token_budget {
            return &hits[..i];
        }
        used += cost;
    }
    hits
}

/// Header line shown above a chunk: `path:start-end (symbol)`, 1-based lines.
#[must_use]
pub fn chunk_header(hit: &SearchHit) -> String {
    let chunk = &hit.chunk;
    let mut header = format!("{}:{}-{}", chunk.path, chunk.start_line + 1, chunk.end_line + 1);
    if let Some(symbol) = &chunk.symbol {
        let _ = write!(header, " ({symbol})");
    }
    header
}

/// Format hits as a `<code_context>` block. Empty input gives an empty string.
#[must_use]
pub fn format_as_context(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return String::new();
    }

    let mut out = String::from("<code_context>\n");
    for hit in hits {
        let chunk = &hit.chunk;
        let name = chunk.symbol.as_deref().unwrap_or("");
        let _ = writeln!(
            out,
            "  <chunk file=\"{}\" lines=\"{}-{}\" name=\"{}\" score=\"{:.2}\">",
            chunk.path,
            chunk.start_line + 1,
            chunk.end_line + 1,
            name,
            hit.score,
        );
        out.push_str(&chunk.text);
        out.push_str("\n  </chunk>\n");
    }
    out.push_str("</code_context>");
    out
}
