//! Persistence contract for snapshots, files, chunks and vectors.

use std::future::Future;
use std::pin::Pin;

use crate::error::Result;
use crate::types::{
    ChunkId, ChunkRecord, FileId, NewChunk, NewFile, Snapshot, SnapshotId, StoredVector,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Open write transaction for one snapshot.
///
/// Files and chunks become visible together on [`SnapshotWriter::commit`].
/// Dropping the writer without committing discards the snapshot, so a failed
/// ingest never becomes the project's latest snapshot.
pub trait SnapshotWriter: Send {
    fn snapshot_id(&self) -> SnapshotId;

    fn add_file<'a>(&'a mut self, file: &'a NewFile<'a>) -> BoxFuture<'a, Result<FileId>>;

    fn add_chunk<'a>(
        &'a mut self,
        file: FileId,
        chunk: &'a NewChunk<'a>,
    ) -> BoxFuture<'a, Result<ChunkId>>;

    fn commit(self: Box<Self>) -> BoxFuture<'static, Result<SnapshotId>>;
}

/// Relational store consumed by the retrieval pipeline.
///
/// Snapshots are immutable once committed; vectors are unique per
/// `(chunk, model)` and overwritten on re-embedding.
pub trait ContentStore: Send + Sync {
    /// Start a snapshot of `project`; nothing is visible until the returned
    /// writer commits.
    fn create_snapshot<'a>(
        &'a self,
        manifest_hash: &'a str,
        project: &'a str,
        meta: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<Box<dyn SnapshotWriter>>>;

    fn get_snapshot(&self, id: SnapshotId) -> BoxFuture<'_, Result<Option<Snapshot>>>;

    /// Most recently committed snapshot of `project`.
    fn latest_snapshot<'a>(&'a self, project: &'a str) -> BoxFuture<'a, Result<Option<Snapshot>>>;

    /// Insert or replace the vector of `chunk` under `model`.
    fn upsert_vector<'a>(
        &'a self,
        chunk: ChunkId,
        model: &'a str,
        vector: &'a [f32],
        norm: f32,
    ) -> BoxFuture<'a, Result<()>>;

    /// All chunks of a snapshot in insertion order.
    fn list_chunks(&self, snapshot: SnapshotId) -> BoxFuture<'_, Result<Vec<ChunkRecord>>>;

    /// All vectors of a snapshot, every model included.
    fn list_vectors(&self, snapshot: SnapshotId) -> BoxFuture<'_, Result<Vec<StoredVector>>>;

    /// Case-insensitive substring match on chunk text or file path, in chunk order.
    fn find_chunks_by_text<'a>(
        &'a self,
        snapshot: SnapshotId,
        needle: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<ChunkRecord>>>;

    /// Chunks by id; unknown ids are skipped and order is unspecified.
    fn get_chunks<'a>(&'a self, ids: &'a [ChunkId]) -> BoxFuture<'a, Result<Vec<ChunkRecord>>>;

    fn vector_count(&self, snapshot: SnapshotId) -> BoxFuture<'_, Result<usize>>;
}
