//! Ingest source files into a snapshot and answer questions against it.

use std::sync::Arc;

use intellimap_index::ContentStore;
use intellimap_index::VectorIndex;
use intellimap_index::chunker::{ChunkerConfig, ChunkingError, Symbol, chunk_file};
use intellimap_index::context::{format_as_context, pack_hits};
use intellimap_index::hash::{content_hash, manifest_hash};
use intellimap_index::progress::EmbedJob;
use intellimap_index::search::SearchHit;
use intellimap_index::types::{NewChunk, NewFile, Snapshot, SnapshotId};
use intellimap_llm::{ContentType, ModelRouter, RouteOptions, RouteResponse, TaskKind};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{AskFailure, PipelineError};

/// One file handed over by the graph builder.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub mtime: Option<i64>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub symbols: Vec<Symbol>,
}

#[derive(Debug)]
pub struct IngestReport {
    pub snapshot_id: SnapshotId,
    pub manifest_hash: String,
    pub files: usize,
    pub chunks: usize,
    pub rejected: Vec<ChunkingError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub response: RouteResponse,
    /// Hits whose text was sent as context, best first.
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Clone, Copy)]
pub struct AskSettings {
    pub top_k: usize,
    pub context_tokens: usize,
}

impl Default for AskSettings {
    fn default() -> Self {
        Self {
            top_k: 8,
            context_tokens: 4000,
        }
    }
}

/// Front door for indexing a repository snapshot and asking about it.
pub struct RepoAssistant {
    store: Arc<dyn ContentStore>,
    index: VectorIndex,
    router: ModelRouter,
    chunker: ChunkerConfig,
    settings: AskSettings,
    route_options: RouteOptions,
}

impl std::fmt::Debug for RepoAssistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoAssistant")
            .field("index", &self.index)
            .field("chunker", &self.chunker)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl RepoAssistant {
    /// `index` must be built over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ContentStore>, index: VectorIndex, router: ModelRouter) -> Self {
        Self {
            store,
            index,
            router,
            chunker: ChunkerConfig::default(),
            settings: AskSettings::default(),
            route_options: RouteOptions::default(),
        }
    }

    #[must_use]
    pub fn with_chunker(mut self, chunker: ChunkerConfig) -> Self {
        self.chunker = chunker;
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: AskSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_route_options(mut self, options: RouteOptions) -> Self {
        self.route_options = options;
        self
    }

    #[must_use]
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    #[must_use]
    pub fn router(&self) -> &ModelRouter {
        &self.router
    }

    /// Create a snapshot of `files` under `project` and store their chunks.
    ///
    /// Symbol spans the chunker cannot use are collected in the report; the
    /// rest of the file is still stored. Nothing is committed unless every
    /// write succeeds, so a failed ingest leaves no snapshot behind.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub async fn ingest(
        &self,
        project: &str,
        files: &[SourceFile],
        meta: &serde_json::Value,
    ) -> Result<IngestReport, PipelineError> {
        let hashes: Vec<String> = files.iter().map(|f| content_hash(&f.content)).collect();
        let manifest = manifest_hash(
            files
                .iter()
                .zip(&hashes)
                .map(|(f, h)| (f.path.as_str(), h.as_str())),
        );
        let mut writer = self.store.create_snapshot(&manifest, project, meta).await?;
        let snapshot_id = writer.snapshot_id();

        let mut report = IngestReport {
            snapshot_id,
            manifest_hash: manifest,
            files: 0,
            chunks: 0,
            rejected: Vec::new(),
        };

        for (file, hash) in files.iter().zip(&hashes) {
            let file_id = writer
                .add_file(&NewFile {
                    path: &file.path,
                    content_hash: hash,
                    loc: file.content.lines().count(),
                    size: file.content.len(),
                    mtime: file.mtime,
                    summary: file.summary.as_deref(),
                    tags: &file.tags,
                })
                .await?;
            report.files += 1;

            let chunked = chunk_file(&file.path, &file.content, &file.symbols, &self.chunker);
            for chunk in &chunked.chunks {
                writer
                    .add_chunk(
                        file_id,
                        &NewChunk {
                            symbol: chunk.symbol.as_deref(),
                            start_line: chunk.start_line,
                            end_line: chunk.end_line,
                            text: &chunk.text,
                            content_hash: &chunk.content_hash,
                            tokens: chunk.tokens,
                        },
                    )
                    .await?;
            }
            report.chunks += chunked.chunks.len();
            report.rejected.extend(chunked.rejected);
        }
        writer.commit().await?;

        tracing::info!(
            %snapshot_id,
            project,
            files = report.files,
            chunks = report.chunks,
            rejected = report.rejected.len(),
            "snapshot ingested"
        );
        Ok(report)
    }

    /// Embed every chunk of `snapshot` in the background.
    #[must_use]
    pub fn embed(&self, snapshot: SnapshotId, cancel: CancellationToken) -> EmbedJob {
        self.index.embed_snapshot(snapshot, ContentType::Code, cancel)
    }

    /// Most recent snapshot of `project`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub async fn latest_snapshot(&self, project: &str) -> Result<Option<Snapshot>, PipelineError> {
        Ok(self.store.latest_snapshot(project).await?)
    }

    /// Retrieve context for `question` and route it as `task`.
    ///
    /// # Errors
    ///
    /// Returns [`AskFailure`] carrying `task` when the snapshot does not exist,
    /// retrieval fails or every provider in the task's chain fails.
    pub async fn ask(
        &self,
        snapshot: SnapshotId,
        task: TaskKind,
        question: &str,
    ) -> Result<Answer, AskFailure> {
        if self
            .store
            .get_snapshot(snapshot)
            .await
            .map_err(|e| AskFailure::new(task, e))?
            .is_none()
        {
            return Err(AskFailure::new(task, PipelineError::SnapshotNotFound(snapshot)));
        }

        let hits = self
            .index
            .hybrid_search(question, snapshot, self.settings.top_k)
            .await
            .map_err(|e| AskFailure::new(task, e))?;
        let hits = pack_hits(&hits, self.settings.context_tokens).to_vec();
        tracing::debug!(%snapshot, %task, hits = hits.len(), "context retrieved");

        let prompt = build_prompt(question, &format_as_context(&hits));
        let response = self
            .router
            .route(task, &prompt, &self.route_options)
            .await
            .map_err(|e| AskFailure::new(task, e))?;
        Ok(Answer { response, hits })
    }
}

fn build_prompt(question: &str, context: &str) -> String {
    if context.is_empty() {
        format!("No indexed code matched this question.\n\nQuestion: {question}")
    } else {
        format!("{context}\n\nQuestion: {question}")
    }
}

#[cfg(test)]
mod tests {
    use intellimap_index::embedding::EmbeddingService;
    use intellimap_index::sqlite::SqliteStore;
    use intellimap_llm::mock::{MockEmbedder, MockGenerator};
    use intellimap_llm::{AnyEmbedder, AnyGenerator, LlmError, PriceTable, RoutingTable};

    use super::*;

    async fn assistant(router: ModelRouter) -> RepoAssistant {
        let store: Arc<dyn ContentStore> = Arc::new(SqliteStore::open(":memory:").await.unwrap());
        let embeddings = Arc::new(EmbeddingService::new(AnyEmbedder::Mock(MockEmbedder::new(32))));
        let index = VectorIndex::new(Arc::clone(&store), embeddings);
        RepoAssistant::new(store, index, router)
    }

    fn echo_router() -> ModelRouter {
        ModelRouter::new(RoutingTable::default(), PriceTable::default())
            .with_provider("claude", AnyGenerator::Mock(MockGenerator::echoing("claude")))
            .with_provider("openai", AnyGenerator::Mock(MockGenerator::echoing("openai")))
    }

    fn sources() -> Vec<SourceFile> {
        vec![
            SourceFile {
                path: "src/cart.js".into(),
                content: "function total(items) {\n  return items.reduce(sum, 0);\n}\n\n\
                          function sum(a, b) {\n  return a + b;\n}"
                    .into(),
                symbols: vec![Symbol::new("total", 0, 2), Symbol::new("sum", 4, 6)],
                ..SourceFile::default()
            },
            SourceFile {
                path: "README.md".into(),
                content: "# Cart\n\nComputes order totals.".into(),
                tags: vec!["docs".into()],
                ..SourceFile::default()
            },
        ]
    }

    #[tokio::test]
    async fn ingest_stores_files_and_chunks() {
        let assistant = assistant(echo_router()).await;
        let report = assistant
            .ingest("shop", &sources(), &serde_json::json!({"commit": "abc123"}))
            .await
            .unwrap();
        assert_eq!(report.files, 2);
        assert_eq!(report.chunks, 3);
        assert!(report.rejected.is_empty());

        let latest = assistant.latest_snapshot("shop").await.unwrap().unwrap();
        assert_eq!(latest.id, report.snapshot_id);
        assert_eq!(latest.manifest_hash, report.manifest_hash);
        assert_eq!(latest.meta["commit"], "abc123");
    }

    #[tokio::test]
    async fn failed_ingest_leaves_no_snapshot() {
        let assistant = assistant(echo_router()).await;
        let first = assistant.ingest("shop", &sources(), &serde_json::json!({})).await.unwrap();

        let mut files = sources();
        files.push(files[0].clone());
        let err = assistant.ingest("shop", &files, &serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, PipelineError::Index(_)));

        let latest = assistant.latest_snapshot("shop").await.unwrap().unwrap();
        assert_eq!(latest.id, first.snapshot_id);
    }

    #[tokio::test]
    async fn manifest_hash_ignores_file_order() {
        let assistant = assistant(echo_router()).await;
        let mut files = sources();
        let first = assistant.ingest("shop", &files, &serde_json::json!({})).await.unwrap();
        files.reverse();
        let second = assistant.ingest("shop", &files, &serde_json::json!({})).await.unwrap();
        assert_ne!(first.snapshot_id, second.snapshot_id);
        assert_eq!(first.manifest_hash, second.manifest_hash);
    }

    #[tokio::test]
    async fn bad_symbols_are_reported_not_fatal() {
        let assistant = assistant(echo_router()).await;
        let files = [SourceFile {
            path: "src/a.rs".into(),
            content: "fn a() {}\nfn b() {}".into(),
            symbols: vec![
                Symbol::new("a", 0, 0),
                Symbol::new("ghost", 9, 12),
                Symbol::new("bent", 1, 0),
            ],
            ..SourceFile::default()
        }];
        let report = assistant.ingest("p", &files, &serde_json::json!({})).await.unwrap();
        assert_eq!(report.chunks, 1);
        assert_eq!(report.rejected.len(), 2);
    }

    #[tokio::test]
    async fn ask_sends_retrieved_context_to_router() {
        let assistant = assistant(echo_router()).await;
        let report = assistant.ingest("shop", &sources(), &serde_json::json!({})).await.unwrap();
        let embedded = assistant
            .embed(report.snapshot_id, CancellationToken::new())
            .finish()
            .await
            .unwrap();
        assert_eq!(embedded.embedded(), 3);

        let answer = assistant
            .ask(report.snapshot_id, TaskKind::Explain, "reduce")
            .await
            .unwrap();
        assert_eq!(answer.response.provider, "claude");
        assert_eq!(answer.hits.len(), 1);
        assert_eq!(answer.hits[0].chunk.symbol.as_deref(), Some("total"));
        assert!(answer.response.content.contains("<code_context>"));
        assert!(answer.response.content.contains("items.reduce(sum, 0)"));
        assert!(answer.response.content.ends_with("Question: reduce"));
        assert_eq!(assistant.router().metrics().calls, 1);
    }

    #[tokio::test]
    async fn ask_without_vectors_still_routes() {
        let assistant = assistant(echo_router()).await;
        let report = assistant.ingest("shop", &sources(), &serde_json::json!({})).await.unwrap();
        let answer = assistant
            .ask(report.snapshot_id, TaskKind::Triage, "where is the total computed?")
            .await
            .unwrap();
        assert!(answer.hits.is_empty());
        assert_eq!(answer.response.provider, "openai");
        assert!(answer.response.content.starts_with("No indexed code matched"));
    }

    #[tokio::test]
    async fn ask_failure_carries_task() {
        let router = ModelRouter::new(RoutingTable::default(), PriceTable::default())
            .with_provider("openai", AnyGenerator::Mock(MockGenerator::failing("openai")));
        let assistant = assistant(router).await;
        let report = assistant.ingest("shop", &sources(), &serde_json::json!({})).await.unwrap();

        let failure = assistant
            .ask(report.snapshot_id, TaskKind::Triage, "total")
            .await
            .unwrap_err();
        assert_eq!(failure.task, TaskKind::Triage);
        match failure.error {
            PipelineError::Llm(LlmError::AllProvidersFailed { task, attempts }) => {
                assert_eq!(task, TaskKind::Triage);
                assert_eq!(attempts.len(), 3);
            }
            other => panic!("expected all providers failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ask_unknown_snapshot_fails() {
        let assistant = assistant(echo_router()).await;
        let failure = assistant
            .ask(SnapshotId(404), TaskKind::Impact, "anything")
            .await
            .unwrap_err();
        assert_eq!(failure.task, TaskKind::Impact);
        assert!(matches!(failure.error, PipelineError::SnapshotNotFound(SnapshotId(404))));
    }
}
