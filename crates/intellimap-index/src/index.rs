//! Per-snapshot in-memory vector index with exhaustive cosine search.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use intellimap_llm::ContentType;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::embedding::EmbeddingService;
use crate::error::Result;
use crate::progress::{BatchReport, ChunkOutcome, EmbedJob, EmbedProgress};
use crate::search::{IndexEntry, SearchConfig, SearchHit, join_hits, score_entries, top_k};
use crate::similarity::l2_norm;
use crate::store::ContentStore;
use crate::types::{ChunkId, SnapshotId};

/// Vectors of one snapshot grouped by embedding model.
#[derive(Debug, Default)]
struct SnapshotIndex {
    by_model: HashMap<String, Vec<IndexEntry>>,
}

impl SnapshotIndex {
    fn entries(&self, model: &str) -> &[IndexEntry] {
        self.by_model
            .get(model)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn len(&self) -> usize {
        self.by_model.values().map(Vec::len).sum()
    }
}

/// Loaded indexes plus invalidation counters.
///
/// A load records the stamp of its snapshot before reading vectors and only
/// installs its result if the stamp is unchanged, so an index read before an
/// invalidation never replaces the one that follows it.
#[derive(Debug, Default)]
struct Loaded {
    indexes: HashMap<SnapshotId, Arc<SnapshotIndex>>,
    generations: HashMap<SnapshotId, u64>,
    epoch: u64,
}

impl Loaded {
    fn stamp(&self, snapshot: SnapshotId) -> (u64, u64) {
        let generation = self.generations.get(&snapshot).copied().unwrap_or_default();
        (self.epoch, generation)
    }

    fn invalidate(&mut self, snapshot: SnapshotId) {
        self.indexes.remove(&snapshot);
        *self.generations.entry(snapshot).or_default() += 1;
    }

    fn clear(&mut self) {
        self.indexes.clear();
        self.generations.clear();
        self.epoch += 1;
    }
}

type IndexMap = Arc<RwLock<Loaded>>;

fn invalidate_in(indexes: &IndexMap, snapshot: SnapshotId) {
    indexes
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .invalidate(snapshot);
}

async fn embed_and_store(
    store: &dyn ContentStore,
    embeddings: &EmbeddingService,
    chunk_id: ChunkId,
    text: &str,
    content: ContentType,
) -> Result<()> {
    let embedding = embeddings.embed(text, content).await?;
    let norm = l2_norm(&embedding.vector);
    store
        .upsert_vector(chunk_id, &embedding.model, &embedding.vector, norm)
        .await
}

/// Embeds chunks and answers similarity queries over a snapshot.
///
/// Each snapshot's index is loaded lazily from the store on first search (or
/// eagerly via [`VectorIndex::build_index`]) and replaced wholesale, so readers
/// observe either the previous or the rebuilt index.
pub struct VectorIndex {
    store: Arc<dyn ContentStore>,
    embeddings: Arc<EmbeddingService>,
    config: SearchConfig,
    loaded: IndexMap,
}

impl fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loaded = self
            .loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .indexes
            .len();
        f.debug_struct("VectorIndex")
            .field("provider", &self.embeddings.provider_name())
            .field("config", &self.config)
            .field("loaded_snapshots", &loaded)
            .finish_non_exhaustive()
    }
}

impl VectorIndex {
    #[must_use]
    pub fn new(store: Arc<dyn ContentStore>, embeddings: Arc<EmbeddingService>) -> Self {
        Self {
            store,
            embeddings,
            config: SearchConfig::default(),
            loaded: Arc::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn embeddings(&self) -> &Arc<EmbeddingService> {
        &self.embeddings
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    /// Embed one chunk and upsert its vector.
    ///
    /// Loaded indexes are not patched; call [`Self::invalidate`] or
    /// [`Self::build_index`] to pick the vector up.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding or the store write fails.
    pub async fn embed_chunk(
        &self,
        chunk_id: ChunkId,
        text: &str,
        content: ContentType,
    ) -> Result<()> {
        embed_and_store(
            self.store.as_ref(),
            &self.embeddings,
            chunk_id,
            text,
            content,
        )
        .await
    }

    /// Embed every chunk of `snapshot` on a background task.
    ///
    /// Chunks are processed one at a time; a failing chunk is recorded in the
    /// report and the run continues. `cancel` is checked between chunks. The
    /// snapshot's loaded index is dropped when the run ends.
    #[must_use]
    pub fn embed_snapshot(
        &self,
        snapshot: SnapshotId,
        content: ContentType,
        cancel: CancellationToken,
    ) -> EmbedJob {
        let (tx, rx) = mpsc::unbounded_channel();
        let store = Arc::clone(&self.store);
        let embeddings = Arc::clone(&self.embeddings);
        let loaded = Arc::clone(&self.loaded);
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let chunks = store.list_chunks(snapshot).await?;
            let total = chunks.len();
            let mut report = BatchReport {
                total,
                ..BatchReport::default()
            };

            for (i, chunk) in chunks.iter().enumerate() {
                if token.is_cancelled() {
                    tracing::info!(%snapshot, processed = i, total, "embedding cancelled");
                    report.cancelled = true;
                    break;
                }
                let outcome = match embed_and_store(
                    store.as_ref(),
                    &embeddings,
                    chunk.id,
                    &chunk.text,
                    content,
                )
                .await
                {
                    Ok(()) => ChunkOutcome::Embedded,
                    Err(e) => {
                        tracing::warn!(
                            chunk = %chunk.id,
                            path = %chunk.path,
                            error = %e,
                            "chunk embedding failed"
                        );
                        ChunkOutcome::Failed(e.to_string())
                    }
                };
                report.outcomes.push((chunk.id, outcome));
                let _ = tx.send(EmbedProgress::new(i + 1, total));
            }

            invalidate_in(&loaded, snapshot);
            tracing::info!(
                %snapshot,
                embedded = report.embedded(),
                failed = report.outcomes.len() - report.embedded(),
                total,
                "embedding run finished"
            );
            Ok(report)
        });

        EmbedJob::new(UnboundedReceiverStream::new(rx), cancel, handle)
    }

    /// Load all persisted vectors of `snapshot` and swap them in.
    ///
    /// Returns the number of entries now indexed.
    ///
    /// # Errors
    ///
    /// Returns an error if the vectors cannot be read.
    pub async fn build_index(&self, snapshot: SnapshotId) -> Result<usize> {
        Ok(self.load(snapshot).await?.len())
    }

    async fn load(&self, snapshot: SnapshotId) -> Result<Arc<SnapshotIndex>> {
        let stamp = self
            .loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .stamp(snapshot);
        let vectors = self.store.list_vectors(snapshot).await?;
        let mut index = SnapshotIndex::default();
        for v in vectors {
            index.by_model.entry(v.model).or_default().push(IndexEntry {
                chunk_id: v.chunk_id,
                vector: v.vector,
                norm: v.norm,
            });
        }
        let index = Arc::new(index);

        let mut state = self.loaded.write().unwrap_or_else(PoisonError::into_inner);
        if state.stamp(snapshot) == stamp {
            state.indexes.insert(snapshot, Arc::clone(&index));
            tracing::info!(%snapshot, entries = index.len(), "vector index built");
        } else {
            tracing::debug!(%snapshot, "index invalidated during load, not installed");
        }
        Ok(index)
    }

    async fn ensure_index(&self, snapshot: SnapshotId) -> Result<Arc<SnapshotIndex>> {
        let loaded = self
            .loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .indexes
            .get(&snapshot)
            .cloned();
        match loaded {
            Some(index) => Ok(index),
            None => self.load(snapshot).await,
        }
    }

    /// Top `top_k` chunks of `snapshot` by cosine similarity to `query`.
    ///
    /// Only vectors of the model used for `content` take part. A blank query,
    /// `top_k == 0` or a snapshot without vectors yields an empty result.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be loaded, the query cannot be
    /// embedded or chunk details cannot be read.
    pub async fn search(
        &self,
        query: &str,
        snapshot: SnapshotId,
        top_k_limit: usize,
        content: ContentType,
    ) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() || top_k_limit == 0 {
            return Ok(Vec::new());
        }
        let index = self.ensure_index(snapshot).await?;
        let entries = index.entries(self.embeddings.model_for(content));
        if entries.is_empty() {
            tracing::debug!(%snapshot, "no vectors for search");
            return Ok(Vec::new());
        }

        let query_vec = self.embeddings.embed(query, content).await?;
        let scored = score_entries(&query_vec.vector, l2_norm(&query_vec.vector), entries);
        let ranked = top_k(scored, top_k_limit);

        let ids: Vec<ChunkId> = ranked.iter().map(|(id, _)| *id).collect();
        let records = self.store.get_chunks(&ids).await?;
        Ok(join_hits(&ranked, records))
    }

    /// Lexical candidates reranked by vector similarity.
    ///
    /// Candidates are chunks whose text or path contains the trimmed query,
    /// bounded by [`SearchConfig::lexical_candidates`]. With no candidates, or
    /// none that has a code vector, this is exactly
    /// `search(query, snapshot, top_k, ContentType::Code)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store, index or embedding backend fails.
    pub async fn hybrid_search(
        &self,
        query: &str,
        snapshot: SnapshotId,
        top_k_limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let needle = query.trim();
        if needle.is_empty() || top_k_limit == 0 {
            return Ok(Vec::new());
        }

        let candidates = self
            .store
            .find_chunks_by_text(snapshot, needle, self.config.lexical_candidates)
            .await?;
        if candidates.is_empty() {
            tracing::debug!(%snapshot, "no lexical candidates, using vector search");
            return self
                .search(query, snapshot, top_k_limit, ContentType::Code)
                .await;
        }

        let index = self.ensure_index(snapshot).await?;
        let by_chunk: HashMap<ChunkId, &IndexEntry> = index
            .entries(self.embeddings.model_for(ContentType::Code))
            .iter()
            .map(|e| (e.chunk_id, e))
            .collect();
        let rerankable: Vec<&IndexEntry> = candidates
            .iter()
            .filter_map(|c| by_chunk.get(&c.id).copied())
            .collect();
        if rerankable.is_empty() {
            tracing::debug!(
                %snapshot,
                candidates = candidates.len(),
                "no embedded candidates, using vector search"
            );
            return self
                .search(query, snapshot, top_k_limit, ContentType::Code)
                .await;
        }

        let query_vec = self.embeddings.embed(query, ContentType::Code).await?;
        let scored = score_entries(
            &query_vec.vector,
            l2_norm(&query_vec.vector),
            rerankable,
        );
        let ranked = top_k(scored, top_k_limit);
        Ok(join_hits(&ranked, candidates))
    }

    /// Drop the loaded index of `snapshot`; the next search rebuilds it.
    pub fn invalidate(&self, snapshot: SnapshotId) {
        invalidate_in(&self.loaded, snapshot);
    }

    /// Drop every loaded index.
    pub fn clear(&self) {
        self.loaded
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of entries in the loaded index of `snapshot`, if loaded.
    #[must_use]
    pub fn indexed_count(&self, snapshot: SnapshotId) -> Option<usize> {
        self.loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .indexes
            .get(&snapshot)
            .map(|index| index.len())
    }
}
