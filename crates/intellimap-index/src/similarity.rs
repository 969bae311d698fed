//! Vector math and blob encoding for stored embeddings.

use crate::error::{IndexError, Result};

/// Euclidean length of `v`.
#[must_use]
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Unit-length copy of `v`; a zero vector is returned unchanged.
#[must_use]
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let norm = l2_norm(v);
    if norm == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

/// Cosine similarity in `[-1, 1]`; 0.0 when either vector has zero norm.
///
/// # Errors
///
/// Returns [`IndexError::DimensionMismatch`] if the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    cosine_with_norms(a, l2_norm(a), b, l2_norm(b))
}

/// Cosine similarity using precomputed norms.
///
/// # Errors
///
/// Returns [`IndexError::DimensionMismatch`] if the lengths differ.
pub fn cosine_with_norms(a: &[f32], norm_a: f32, b: &[f32], norm_b: f32) -> Result<f32> {
    if a.len() != b.len() {
        return Err(IndexError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    Ok(dot / (norm_a * norm_b))
}

/// Encode a float vector as little-endian `f32` bytes.
#[must_use]
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a blob written by [`vec_to_blob`]. Returns `None` for a truncated blob.
#[must_use]
pub fn blob_to_vec(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}
