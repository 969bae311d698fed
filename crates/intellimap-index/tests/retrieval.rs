use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use intellimap_index::chunker::{ChunkerConfig, Symbol, chunk_file};
use intellimap_index::embedding::EmbeddingService;
use intellimap_index::hash::content_hash;
use intellimap_index::progress::{ChunkOutcome, EmbedProgress};
use intellimap_index::search::SearchConfig;
use intellimap_index::sqlite::SqliteStore;
use intellimap_index::store::{BoxFuture, SnapshotWriter};
use intellimap_index::types::{
    ChunkId, ChunkRecord, FileId, NewChunk, NewFile, Snapshot, SnapshotId, StoredVector,
};
use intellimap_index::{ContentStore, VectorIndex};
use intellimap_llm::mock::{MOCK_CODE_MODEL, MOCK_DOCS_MODEL, MockEmbedder};
use intellimap_llm::{AnyEmbedder, ContentType};
use tokio::sync::Notify;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

const SOURCES: [(&str, &str); 4] = [
    ("src/math.js", "function add(a,b){return a+b;}"),
    ("src/math.js", "function multiply(x, y) { return x * y; }"),
    ("src/strings.js", "const greet = (name) => `hello ${name}`;"),
    ("src/io.js", "export async function readConfig(path) { return fs.readFile(path); }"),
];

struct Fixture {
    store: Arc<SqliteStore>,
    index: VectorIndex,
    mock: MockEmbedder,
    snapshot: SnapshotId,
    chunks: Vec<ChunkId>,
}

/// One snapshot with a chunk per `(path, text)`; chunks of a path share a file.
async fn insert_sources(
    store: &SqliteStore,
    sources: &[(&str, &str)],
) -> (SnapshotId, Vec<ChunkId>) {
    let meta = serde_json::json!({});
    let mut writer = store.create_snapshot("manifest", "demo", &meta).await.unwrap();
    let mut files: Vec<(&str, FileId)> = Vec::new();
    for &(path, text) in sources {
        let hash = content_hash(text);
        let file = match files.iter().find(|(p, _)| *p == path) {
            Some(&(_, id)) => id,
            None => {
                let new_file = NewFile {
                    path,
                    content_hash: &hash,
                    loc: 1,
                    size: text.len(),
                    ..NewFile::default()
                };
                let id = writer.add_file(&new_file).await.unwrap();
                files.push((path, id));
                id
            }
        };
        let chunk = NewChunk {
            text,
            content_hash: &hash,
            tokens: 1,
            ..NewChunk::default()
        };
        writer.add_chunk(file, &chunk).await.unwrap();
    }
    let snapshot = writer.commit().await.unwrap();
    let chunks = store.list_chunks(snapshot).await.unwrap();
    (snapshot, chunks.iter().map(|c| c.id).collect())
}

fn index_over(store: Arc<dyn ContentStore>, mock: &MockEmbedder) -> VectorIndex {
    let embeddings = Arc::new(EmbeddingService::new(AnyEmbedder::Mock(mock.clone())));
    VectorIndex::new(store, embeddings)
}

async fn fixture_with(mock: MockEmbedder, sources: &[(&str, &str)]) -> Fixture {
    let store = Arc::new(SqliteStore::open(":memory:").await.unwrap());
    let (snapshot, chunks) = insert_sources(&store, sources).await;
    let index = index_over(store.clone(), &mock);
    Fixture {
        store,
        index,
        mock,
        snapshot,
        chunks,
    }
}

/// Store wrapper that parks one chosen call until the test releases it.
struct GatedStore {
    inner: Arc<SqliteStore>,
    hold_list_vectors: AtomicBool,
    hold_upsert: Option<usize>,
    upserts: AtomicUsize,
    entered: Notify,
    release: Notify,
}

impl GatedStore {
    fn new(inner: Arc<SqliteStore>) -> Self {
        Self {
            inner,
            hold_list_vectors: AtomicBool::new(false),
            hold_upsert: None,
            upserts: AtomicUsize::new(0),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    /// Park the first `list_vectors` call after it has read the table.
    fn holding_list_vectors(self) -> Self {
        self.hold_list_vectors.store(true, Ordering::SeqCst);
        self
    }

    /// Park the `nth` (1-based) `upsert_vector` call before it writes.
    fn holding_upsert(mut self, nth: usize) -> Self {
        self.hold_upsert = Some(nth);
        self
    }

    async fn park(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

impl ContentStore for GatedStore {
    fn create_snapshot<'a>(
        &'a self,
        manifest_hash: &'a str,
        project: &'a str,
        meta: &'a serde_json::Value,
    ) -> BoxFuture<'a, intellimap_index::Result<Box<dyn SnapshotWriter>>> {
        self.inner.create_snapshot(manifest_hash, project, meta)
    }

    fn get_snapshot(
        &self,
        id: SnapshotId,
    ) -> BoxFuture<'_, intellimap_index::Result<Option<Snapshot>>> {
        self.inner.get_snapshot(id)
    }

    fn latest_snapshot<'a>(
        &'a self,
        project: &'a str,
    ) -> BoxFuture<'a, intellimap_index::Result<Option<Snapshot>>> {
        self.inner.latest_snapshot(project)
    }

    fn upsert_vector<'a>(
        &'a self,
        chunk: ChunkId,
        model: &'a str,
        vector: &'a [f32],
        norm: f32,
    ) -> BoxFuture<'a, intellimap_index::Result<()>> {
        Box::pin(async move {
            let n = self.upserts.fetch_add(1, Ordering::SeqCst) + 1;
            if self.hold_upsert == Some(n) {
                self.park().await;
            }
            self.inner.upsert_vector(chunk, model, vector, norm).await
        })
    }

    fn list_chunks(
        &self,
        snapshot: SnapshotId,
    ) -> BoxFuture<'_, intellimap_index::Result<Vec<ChunkRecord>>> {
        self.inner.list_chunks(snapshot)
    }

    fn list_vectors(
        &self,
        snapshot: SnapshotId,
    ) -> BoxFuture<'_, intellimap_index::Result<Vec<StoredVector>>> {
        Box::pin(async move {
            let vectors = self.inner.list_vectors(snapshot).await?;
            if self.hold_list_vectors.swap(false, Ordering::SeqCst) {
                self.park().await;
            }
            Ok(vectors)
        })
    }

    fn find_chunks_by_text<'a>(
        &'a self,
        snapshot: SnapshotId,
        needle: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, intellimap_index::Result<Vec<ChunkRecord>>> {
        self.inner.find_chunks_by_text(snapshot, needle, limit)
    }

    fn get_chunks<'a>(
        &'a self,
        ids: &'a [ChunkId],
    ) -> BoxFuture<'a, intellimap_index::Result<Vec<ChunkRecord>>> {
        self.inner.get_chunks(ids)
    }

    fn vector_count(&self, snapshot: SnapshotId) -> BoxFuture<'_, intellimap_index::Result<usize>> {
        self.inner.vector_count(snapshot)
    }
}

async fn fixture() -> Fixture {
    fixture_with(MockEmbedder::new(64), &SOURCES).await
}

async fn embed_all(fx: &Fixture) -> intellimap_index::progress::BatchReport {
    fx.index
        .embed_snapshot(fx.snapshot, ContentType::Code, CancellationToken::new())
        .finish()
        .await
        .unwrap()
}

#[tokio::test]
async fn search_without_vectors_is_empty_and_does_not_embed() {
    let fx = fixture().await;
    let hits = fx
        .index
        .search("add numbers", fx.snapshot, 5, ContentType::Code)
        .await
        .unwrap();
    assert!(hits.is_empty());
    assert_eq!(fx.mock.calls(), 0);
}

#[tokio::test]
async fn embed_snapshot_streams_progress_and_persists_vectors() {
    let fx = fixture().await;
    let mut job = fx
        .index
        .embed_snapshot(fx.snapshot, ContentType::Code, CancellationToken::new());

    let events: Vec<EmbedProgress> = (&mut job.progress).collect().await;
    let report = job.finish().await.unwrap();

    let currents: Vec<_> = events.iter().map(|e| e.current).collect();
    assert_eq!(currents, [1, 2, 3, 4]);
    assert!(events.iter().all(|e| e.total == 4));
    assert!((events.last().unwrap().percentage - 100.0).abs() < f32::EPSILON);
    assert_eq!(report.embedded(), 4);
    assert!(!report.cancelled);
    assert_eq!(fx.store.vector_count(fx.snapshot).await.unwrap(), 4);
}

#[tokio::test]
async fn failing_chunk_is_reported_and_run_continues() {
    let fx = fixture_with(MockEmbedder::new(32).failing_on("multiply"), &SOURCES).await;
    let report = embed_all(&fx).await;

    assert_eq!(report.total, 4);
    assert_eq!(report.embedded(), 3);
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, fx.chunks[1]);
    assert!(matches!(report.outcomes[1].1, ChunkOutcome::Failed(_)));
    assert_eq!(fx.store.vector_count(fx.snapshot).await.unwrap(), 3);
}

#[tokio::test]
async fn re_embedding_is_idempotent() {
    let fx = fixture().await;
    embed_all(&fx).await;
    let before = fx.store.list_vectors(fx.snapshot).await.unwrap();
    embed_all(&fx).await;
    let after = fx.store.list_vectors(fx.snapshot).await.unwrap();

    assert_eq!(before, after);
    // second run is served from the embedding cache
    assert_eq!(fx.mock.calls(), 4);
}

#[tokio::test]
async fn cancelled_run_stops_before_next_chunk() {
    let fx = fixture().await;
    let token = CancellationToken::new();
    token.cancel();
    let report = fx
        .index
        .embed_snapshot(fx.snapshot, ContentType::Code, token)
        .finish()
        .await
        .unwrap();
    assert!(report.cancelled);
    assert!(report.outcomes.is_empty());
    assert_eq!(fx.store.vector_count(fx.snapshot).await.unwrap(), 0);
}

#[tokio::test]
async fn cancelling_mid_run_keeps_finished_chunks() {
    let inner = Arc::new(SqliteStore::open(":memory:").await.unwrap());
    let (snapshot, chunks) = insert_sources(&inner, &SOURCES).await;
    let store = Arc::new(GatedStore::new(inner).holding_upsert(2));
    let index = index_over(store.clone(), &MockEmbedder::new(32));

    let token = CancellationToken::new();
    let mut job = index.embed_snapshot(snapshot, ContentType::Code, token.clone());
    let first = job.progress.next().await.unwrap();
    assert_eq!(first.current, 1);

    // the run is now parked inside the second chunk
    store.entered.notified().await;
    token.cancel();
    store.release.notify_one();

    let report = job.finish().await.unwrap();
    assert!(report.cancelled);
    assert_eq!(report.outcomes.len(), 2);
    assert!(report.outcomes.len() < report.total);
    assert_eq!(report.outcomes[1].0, chunks[1]);
    assert_eq!(store.vector_count(snapshot).await.unwrap(), 2);
}

#[tokio::test]
async fn search_ranks_exact_text_first_with_bounded_size() {
    let fx = fixture().await;
    embed_all(&fx).await;

    let hits = fx
        .index
        .search(SOURCES[2].1, fx.snapshot, 3, ContentType::Code)
        .await
        .unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].chunk.id, fx.chunks[2]);
    assert!((hits[0].score - 1.0).abs() < 1e-5);
    for pair in hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }

    let all = fx
        .index
        .search("anything", fx.snapshot, 50, ContentType::Code)
        .await
        .unwrap();
    assert_eq!(all.len(), 4);
}

#[tokio::test]
async fn blank_query_and_zero_k_are_empty() {
    let fx = fixture().await;
    embed_all(&fx).await;
    assert!(fx.index.search("   ", fx.snapshot, 5, ContentType::Code).await.unwrap().is_empty());
    assert!(fx.index.search("add", fx.snapshot, 0, ContentType::Code).await.unwrap().is_empty());
    assert!(fx.index.hybrid_search("", fx.snapshot, 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn hybrid_reranks_only_lexical_candidates() {
    let fx = fixture().await;
    embed_all(&fx).await;

    let hits = fx.index.hybrid_search("function", fx.snapshot, 10).await.unwrap();
    let ids: Vec<_> = hits.iter().map(|h| h.chunk.id).collect();
    assert_eq!(hits.len(), 3);
    assert!(!ids.contains(&fx.chunks[2]), "arrow function chunk has no 'function' keyword");

    let by_path = fx.index.hybrid_search("math.js", fx.snapshot, 10).await.unwrap();
    assert_eq!(by_path.len(), 2);
}

#[tokio::test]
async fn hybrid_without_candidates_equals_vector_search() {
    let fx = fixture().await;
    embed_all(&fx).await;

    let query = "zzz qqq unmatched";
    let hybrid = fx.index.hybrid_search(query, fx.snapshot, 3).await.unwrap();
    let vector = fx
        .index
        .search(query, fx.snapshot, 3, ContentType::Code)
        .await
        .unwrap();
    assert_eq!(hybrid, vector);
    assert_eq!(hybrid.len(), 3);
}

#[tokio::test]
async fn hybrid_candidate_bound_is_respected() {
    let sources: Vec<(String, String)> = (0..8)
        .map(|i| (format!("src/f{i}.rs"), format!("fn handler_{i}() {{ dispatch({i}); }}")))
        .collect();
    let borrowed: Vec<(&str, &str)> = sources
        .iter()
        .map(|(p, t)| (p.as_str(), t.as_str()))
        .collect();
    let mut fx = fixture_with(MockEmbedder::new(32), &borrowed).await;
    fx.index = fx.index.with_config(SearchConfig {
        lexical_candidates: 3,
    });
    embed_all(&fx).await;

    let hits = fx.index.hybrid_search("dispatch", fx.snapshot, 10).await.unwrap();
    assert_eq!(hits.len(), 3);
    assert!(hits.iter().all(|h| fx.chunks[..3].contains(&h.chunk.id)));
}

#[tokio::test]
async fn build_index_and_invalidate() {
    let fx = fixture().await;
    assert_eq!(fx.index.indexed_count(fx.snapshot), None);
    assert_eq!(fx.index.build_index(fx.snapshot).await.unwrap(), 0);
    assert_eq!(fx.index.indexed_count(fx.snapshot), Some(0));

    embed_all(&fx).await;
    // the run drops the stale index
    assert_eq!(fx.index.indexed_count(fx.snapshot), None);
    assert_eq!(fx.index.build_index(fx.snapshot).await.unwrap(), 4);

    fx.index.invalidate(fx.snapshot);
    assert_eq!(fx.index.indexed_count(fx.snapshot), None);
    fx.index.build_index(fx.snapshot).await.unwrap();
    fx.index.clear();
    assert_eq!(fx.index.indexed_count(fx.snapshot), None);
}

#[tokio::test]
async fn build_overlapping_embed_run_does_not_install_stale_index() {
    let inner = Arc::new(SqliteStore::open(":memory:").await.unwrap());
    let (snapshot, _) = insert_sources(&inner, &SOURCES[..2]).await;
    let store = Arc::new(GatedStore::new(inner).holding_list_vectors());
    let index = Arc::new(index_over(store.clone(), &MockEmbedder::new(32)));

    let build = {
        let index = Arc::clone(&index);
        tokio::spawn(async move { index.build_index(snapshot).await })
    };
    // build has read an empty vector table and is parked
    store.entered.notified().await;

    let report = index
        .embed_snapshot(snapshot, ContentType::Code, CancellationToken::new())
        .finish()
        .await
        .unwrap();
    assert_eq!(report.embedded(), 2);

    store.release.notify_one();
    assert_eq!(build.await.unwrap().unwrap(), 0);
    assert_eq!(index.indexed_count(snapshot), None);

    let hits = index
        .search("return", snapshot, 10, ContentType::Code)
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(index.indexed_count(snapshot), Some(2));
}

#[tokio::test]
async fn clear_during_build_discards_its_result() {
    let inner = Arc::new(SqliteStore::open(":memory:").await.unwrap());
    let (snapshot, _) = insert_sources(&inner, &SOURCES).await;
    let store = Arc::new(GatedStore::new(inner).holding_list_vectors());
    let index = Arc::new(index_over(store.clone(), &MockEmbedder::new(32)));

    let build = {
        let index = Arc::clone(&index);
        tokio::spawn(async move { index.build_index(snapshot).await })
    };
    store.entered.notified().await;
    index.clear();
    store.release.notify_one();

    build.await.unwrap().unwrap();
    assert_eq!(index.indexed_count(snapshot), None);
}

#[tokio::test]
async fn mismatched_dimension_vector_is_skipped() {
    let fx = fixture().await;
    embed_all(&fx).await;
    fx.store
        .upsert_vector(fx.chunks[0], MOCK_CODE_MODEL, &[1.0, 2.0], 5.0_f32.sqrt())
        .await
        .unwrap();
    fx.index.invalidate(fx.snapshot);

    let hits = fx
        .index
        .search("return", fx.snapshot, 10, ContentType::Code)
        .await
        .unwrap();
    assert_eq!(hits.len(), 3);
    assert!(hits.iter().all(|h| h.chunk.id != fx.chunks[0]));
}

#[tokio::test]
async fn embed_chunk_upserts_single_vector() {
    let fx = fixture().await;
    fx.index
        .embed_chunk(fx.chunks[3], SOURCES[3].1, ContentType::Docs)
        .await
        .unwrap();
    fx.index
        .embed_chunk(fx.chunks[3], SOURCES[3].1, ContentType::Docs)
        .await
        .unwrap();
    assert_eq!(fx.store.vector_count(fx.snapshot).await.unwrap(), 1);
    assert_eq!(fx.mock.calls(), 1);
}

#[tokio::test]
async fn vectors_are_kept_per_model_and_searched_per_content_type() {
    let fx = fixture().await;
    embed_all(&fx).await;
    fx.index
        .embed_chunk(fx.chunks[3], SOURCES[3].1, ContentType::Docs)
        .await
        .unwrap();

    let vectors = fx.store.list_vectors(fx.snapshot).await.unwrap();
    let models: Vec<_> = vectors
        .iter()
        .filter(|v| v.chunk_id == fx.chunks[3])
        .map(|v| v.model.as_str())
        .collect();
    assert_eq!(models, [MOCK_CODE_MODEL, MOCK_DOCS_MODEL]);
    assert_eq!(fx.store.vector_count(fx.snapshot).await.unwrap(), 5);

    fx.index.invalidate(fx.snapshot);
    let docs = fx
        .index
        .search("readConfig", fx.snapshot, 10, ContentType::Docs)
        .await
        .unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].chunk.id, fx.chunks[3]);

    let code = fx
        .index
        .search("readConfig", fx.snapshot, 10, ContentType::Code)
        .await
        .unwrap();
    assert_eq!(code.len(), 4);
}

#[tokio::test]
async fn chunker_output_flows_into_store_and_search() {
    let store = Arc::new(SqliteStore::open(":memory:").await.unwrap());
    let content = "fn parse() {\n    tokens()\n}\n\nfn render() {\n    html()\n}";
    let symbols = [Symbol::new("parse", 0, 2), Symbol::new("render", 4, 6)];
    let chunked = chunk_file("src/view.rs", content, &symbols, &ChunkerConfig::default());

    let file_hash = content_hash(content);
    let meta = serde_json::json!({});
    let mut writer = store.create_snapshot("m", "demo", &meta).await.unwrap();
    let file = writer
        .add_file(&NewFile {
            path: "src/view.rs",
            content_hash: &file_hash,
            loc: 7,
            size: content.len(),
            ..NewFile::default()
        })
        .await
        .unwrap();
    for chunk in &chunked.chunks {
        let new_chunk = NewChunk {
            symbol: chunk.symbol.as_deref(),
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            text: &chunk.text,
            content_hash: &chunk.content_hash,
            tokens: chunk.tokens,
        };
        writer.add_chunk(file, &new_chunk).await.unwrap();
    }
    let snapshot = writer.commit().await.unwrap();

    let index = index_over(store, &MockEmbedder::new(32));
    let report = index
        .embed_snapshot(snapshot, ContentType::Code, CancellationToken::new())
        .finish()
        .await
        .unwrap();
    assert_eq!(report.embedded(), 2);

    let hits = index.hybrid_search("render", snapshot, 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.symbol.as_deref(), Some("render"));
    assert_eq!((hits[0].chunk.start_line, hits[0].chunk.end_line), (4, 6));
}
