use serde::{Deserialize, Serialize};

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[derive(Serialize, Deserialize, sqlx::Type)]
        #[sqlx(transparent)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(
    /// Strongly typed wrapper for snapshot row IDs.
    SnapshotId
);
row_id!(
    /// Strongly typed wrapper for file row IDs.
    FileId
);
row_id!(
    /// Strongly typed wrapper for chunk row IDs.
    ChunkId
);

/// Immutable point-in-time view of a project's files.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub manifest_hash: String,
    pub project: String,
    /// Unix seconds.
    pub created_at: i64,
    pub meta: serde_json::Value,
}

/// File metadata to insert under a snapshot.
#[derive(Debug, Clone, Default)]
pub struct NewFile<'a> {
    pub path: &'a str,
    pub content_hash: &'a str,
    pub loc: usize,
    pub size: usize,
    pub mtime: Option<i64>,
    pub summary: Option<&'a str>,
    pub tags: &'a [String],
}

/// Chunk to insert under a file; line numbers are 0-based and inclusive.
#[derive(Debug, Clone, Default)]
pub struct NewChunk<'a> {
    pub symbol: Option<&'a str>,
    pub start_line: usize,
    pub end_line: usize,
    pub text: &'a str,
    pub content_hash: &'a str,
    pub tokens: usize,
}

/// Persisted chunk joined with its file path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkRecord {
    pub id: ChunkId,
    pub file_id: FileId,
    pub snapshot_id: SnapshotId,
    pub path: String,
    pub symbol: Option<String>,
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
    pub content_hash: String,
    pub tokens: usize,
}

/// Persisted embedding row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredVector {
    pub chunk_id: ChunkId,
    pub model: String,
    pub dim: usize,
    pub vector: Vec<f32>,
    pub norm: f32,
}
