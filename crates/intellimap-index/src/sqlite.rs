//! `SQLite` implementation of [`ContentStore`].

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};

use crate::error::{IndexError, Result};
use crate::similarity::{blob_to_vec, vec_to_blob};
use crate::store::{BoxFuture, ContentStore, SnapshotWriter};
use crate::types::{
    ChunkId, ChunkRecord, FileId, NewChunk, NewFile, Snapshot, SnapshotId, StoredVector,
};

const CHUNK_SELECT: &str = "SELECT c.id, c.file_id, c.snapshot_id, f.path, c.symbol, \
     c.start_line, c.end_line, c.text, c.content_hash, c.tokens \
     FROM chunks c JOIN files f ON f.id = c.file_id";

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    ///
    /// `":memory:"` opens a private in-memory database on a single connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub async fn open(path: &str) -> Result<Self> {
        let in_memory = path == ":memory:";
        let url = if in_memory {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let mut opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .foreign_keys(true);
        if !in_memory {
            opts = opts
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .connect_with(opts)
            .await?;

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, running migrations on it.
    ///
    /// # Errors
    ///
    /// Returns an error if any migration fails.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct ChunkRow {
    id: ChunkId,
    file_id: FileId,
    snapshot_id: SnapshotId,
    path: String,
    symbol: Option<String>,
    start_line: i64,
    end_line: i64,
    text: String,
    content_hash: String,
    tokens: i64,
}

impl TryFrom<ChunkRow> for ChunkRecord {
    type Error = IndexError;

    fn try_from(row: ChunkRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            file_id: row.file_id,
            snapshot_id: row.snapshot_id,
            path: row.path,
            symbol: row.symbol,
            start_line: usize::try_from(row.start_line)?,
            end_line: usize::try_from(row.end_line)?,
            text: row.text,
            content_hash: row.content_hash,
            tokens: usize::try_from(row.tokens)?,
        })
    }
}

fn into_records(rows: Vec<ChunkRow>) -> Result<Vec<ChunkRecord>> {
    rows.into_iter().map(ChunkRecord::try_from).collect()
}

type SnapshotRow = (SnapshotId, String, String, i64, String);

fn into_snapshot((id, manifest_hash, project, created_at, meta): SnapshotRow) -> Result<Snapshot> {
    Ok(Snapshot {
        id,
        manifest_hash,
        project,
        created_at,
        meta: serde_json::from_str(&meta)?,
    })
}

/// Escape `%`, `_` and `\` so `needle` matches literally inside `LIKE`.
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Snapshot writes held in one transaction; dropped uncommitted, it rolls back.
struct SqliteSnapshotWriter {
    tx: Transaction<'static, Sqlite>,
    id: SnapshotId,
    files: usize,
    chunks: usize,
}

impl SnapshotWriter for SqliteSnapshotWriter {
    fn snapshot_id(&self) -> SnapshotId {
        self.id
    }

    fn add_file<'a>(&'a mut self, file: &'a NewFile<'a>) -> BoxFuture<'a, Result<FileId>> {
        Box::pin(async move {
            let (id,): (FileId,) = sqlx::query_as(
                "INSERT INTO files \
                 (snapshot_id, path, content_hash, loc, size, mtime, summary, tags) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
            )
            .bind(self.id)
            .bind(file.path)
            .bind(file.content_hash)
            .bind(i64::try_from(file.loc)?)
            .bind(i64::try_from(file.size)?)
            .bind(file.mtime)
            .bind(file.summary)
            .bind(file.tags.join(","))
            .fetch_one(&mut *self.tx)
            .await?;
            self.files += 1;
            Ok(id)
        })
    }

    fn add_chunk<'a>(
        &'a mut self,
        file: FileId,
        chunk: &'a NewChunk<'a>,
    ) -> BoxFuture<'a, Result<ChunkId>> {
        Box::pin(async move {
            let (id,): (ChunkId,) = sqlx::query_as(
                "INSERT INTO chunks \
                 (file_id, snapshot_id, symbol, start_line, end_line, text, content_hash, tokens) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
            )
            .bind(file)
            .bind(self.id)
            .bind(chunk.symbol)
            .bind(i64::try_from(chunk.start_line)?)
            .bind(i64::try_from(chunk.end_line)?)
            .bind(chunk.text)
            .bind(chunk.content_hash)
            .bind(i64::try_from(chunk.tokens)?)
            .fetch_one(&mut *self.tx)
            .await?;
            self.chunks += 1;
            Ok(id)
        })
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, Result<SnapshotId>> {
        Box::pin(async move {
            let Self {
                tx,
                id,
                files,
                chunks,
            } = *self;
            tx.commit().await?;
            tracing::debug!(snapshot = %id, files, chunks, "snapshot committed");
            Ok(id)
        })
    }
}

impl ContentStore for SqliteStore {
    fn create_snapshot<'a>(
        &'a self,
        manifest_hash: &'a str,
        project: &'a str,
        meta: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<Box<dyn SnapshotWriter>>> {
        Box::pin(async move {
            let meta = serde_json::to_string(meta)?;
            let mut tx = self.pool.begin().await?;
            let (id,): (SnapshotId,) = sqlx::query_as(
                "INSERT INTO snapshots (manifest_hash, project, meta) \
                 VALUES (?, ?, ?) RETURNING id",
            )
            .bind(manifest_hash)
            .bind(project)
            .bind(meta)
            .fetch_one(&mut *tx)
            .await?;
            tracing::debug!(snapshot = %id, project, "snapshot started");
            Ok(Box::new(SqliteSnapshotWriter {
                tx,
                id,
                files: 0,
                chunks: 0,
            }) as Box<dyn SnapshotWriter>)
        })
    }

    fn get_snapshot(&self, id: SnapshotId) -> BoxFuture<'_, Result<Option<Snapshot>>> {
        Box::pin(async move {
            let row: Option<SnapshotRow> = sqlx::query_as(
                "SELECT id, manifest_hash, project, created_at, meta FROM snapshots WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            row.map(into_snapshot).transpose()
        })
    }

    fn latest_snapshot<'a>(&'a self, project: &'a str) -> BoxFuture<'a, Result<Option<Snapshot>>> {
        Box::pin(async move {
            let row: Option<SnapshotRow> = sqlx::query_as(
                "SELECT id, manifest_hash, project, created_at, meta FROM snapshots \
                 WHERE project = ? ORDER BY id DESC LIMIT 1",
            )
            .bind(project)
            .fetch_optional(&self.pool)
            .await?;
            row.map(into_snapshot).transpose()
        })
    }

    fn upsert_vector<'a>(
        &'a self,
        chunk: ChunkId,
        model: &'a str,
        vector: &'a [f32],
        norm: f32,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO vectors (chunk_id, model, dim, vector, norm) VALUES (?, ?, ?, ?, ?) \
                 ON CONFLICT(chunk_id, model) DO UPDATE SET \
                 dim = excluded.dim, vector = excluded.vector, norm = excluded.norm",
            )
            .bind(chunk)
            .bind(model)
            .bind(i64::try_from(vector.len())?)
            .bind(vec_to_blob(vector))
            .bind(norm)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn list_chunks(&self, snapshot: SnapshotId) -> BoxFuture<'_, Result<Vec<ChunkRecord>>> {
        Box::pin(async move {
            let rows: Vec<ChunkRow> =
                sqlx::query_as(&format!("{CHUNK_SELECT} WHERE c.snapshot_id = ? ORDER BY c.id"))
                    .bind(snapshot)
                    .fetch_all(&self.pool)
                    .await?;
            into_records(rows)
        })
    }

    fn list_vectors(&self, snapshot: SnapshotId) -> BoxFuture<'_, Result<Vec<StoredVector>>> {
        Box::pin(async move {
            let rows: Vec<(ChunkId, String, i64, Vec<u8>, f32)> = sqlx::query_as(
                "SELECT v.chunk_id, v.model, v.dim, v.vector, v.norm FROM vectors v \
                 JOIN chunks c ON c.id = v.chunk_id \
                 WHERE c.snapshot_id = ? ORDER BY v.chunk_id, v.model",
            )
            .bind(snapshot)
            .fetch_all(&self.pool)
            .await?;

            let mut vectors = Vec::with_capacity(rows.len());
            for (chunk_id, model, dim, blob, norm) in rows {
                let dim = usize::try_from(dim)?;
                match blob_to_vec(&blob).filter(|v| v.len() == dim) {
                    Some(vector) => vectors.push(StoredVector {
                        chunk_id,
                        model,
                        dim,
                        vector,
                        norm,
                    }),
                    None => tracing::warn!(
                        chunk = %chunk_id,
                        %model,
                        dim,
                        bytes = blob.len(),
                        "corrupt vector skipped"
                    ),
                }
            }
            Ok(vectors)
        })
    }

    fn find_chunks_by_text<'a>(
        &'a self,
        snapshot: SnapshotId,
        needle: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<ChunkRecord>>> {
        Box::pin(async move {
            let pattern = like_pattern(needle);
            let rows: Vec<ChunkRow> = sqlx::query_as(&format!(
                "{CHUNK_SELECT} WHERE c.snapshot_id = ? \
                 AND (c.text LIKE ? ESCAPE '\\' OR f.path LIKE ? ESCAPE '\\') \
                 ORDER BY c.id LIMIT ?"
            ))
            .bind(snapshot)
            .bind(&pattern)
            .bind(&pattern)
            .bind(i64::try_from(limit)?)
            .fetch_all(&self.pool)
            .await?;
            into_records(rows)
        })
    }

    fn get_chunks<'a>(&'a self, ids: &'a [ChunkId]) -> BoxFuture<'a, Result<Vec<ChunkRecord>>> {
        Box::pin(async move {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let mut qb = QueryBuilder::<Sqlite>::new(CHUNK_SELECT);
            qb.push(" WHERE c.id IN (");
            let mut separated = qb.separated(", ");
            for id in ids {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
            let rows: Vec<ChunkRow> = qb.build_query_as().fetch_all(&self.pool).await?;
            into_records(rows)
        })
    }

    fn vector_count(&self, snapshot: SnapshotId) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move {
            let (count,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM vectors v JOIN chunks c ON c.id = v.chunk_id \
                 WHERE c.snapshot_id = ?",
            )
            .bind(snapshot)
            .fetch_one(&self.pool)
            .await?;
            Ok(usize::try_from(count)?)
        })
    }
}
