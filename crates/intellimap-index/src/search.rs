//! Scoring helpers shared by vector and hybrid search.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::similarity::cosine_with_norms;
use crate::types::{ChunkId, ChunkRecord};

/// Upper bound on lexical candidates passed to vector reranking.
pub const DEFAULT_LEXICAL_CANDIDATES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub lexical_candidates: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            lexical_candidates: DEFAULT_LEXICAL_CANDIDATES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub chunk: ChunkRecord,
    pub score: f32,
}

/// In-memory index entry.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk_id: ChunkId,
    pub vector: Vec<f32>,
    pub norm: f32,
}

/// Score `entries` against the query in iteration order.
///
/// Entries whose dimension differs from the query, or whose score is NaN, are
/// skipped.
pub(crate) fn score_entries<'a>(
    query: &[f32],
    query_norm: f32,
    entries: impl IntoIterator<Item = &'a IndexEntry>,
) -> Vec<(ChunkId, f32)> {
    let mut scored = Vec::new();
    for entry in entries {
        match cosine_with_norms(query, query_norm, &entry.vector, entry.norm) {
            Ok(score) if score.is_nan() => {
                tracing::warn!(chunk = %entry.chunk_id, "skipping vector with NaN score");
            }
            Ok(score) => scored.push((entry.chunk_id, score)),
            Err(e) => {
                tracing::warn!(chunk = %entry.chunk_id, error = %e, "skipping vector");
            }
        }
    }
    scored
}

/// Stable descending sort truncated to `k`; ties keep input order.
#[must_use]
pub fn top_k(mut scored: Vec<(ChunkId, f32)>, k: usize) -> Vec<(ChunkId, f32)> {
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(k);
    scored
}

/// Attach chunk details to ranked ids, keeping rank order and dropping ids
/// with no matching record.
pub(crate) fn join_hits(ranked: &[(ChunkId, f32)], records: Vec<ChunkRecord>) -> Vec<SearchHit> {
    let mut by_id: HashMap<ChunkId, ChunkRecord> =
        records.into_iter().map(|r| (r.id, r)).collect();
    ranked
        .iter()
        .filter_map(|(id, score)| {
            by_id.remove(id).map(|chunk| SearchHit {
                chunk,
                score: *score,
            })
        })
        .collect()
}
