//! Build store, embedder, router and assistant from a resolved [`Config`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use intellimap_index::ContentStore;
use intellimap_index::VectorIndex;
use intellimap_index::embedding::EmbeddingService;
use intellimap_index::sqlite::SqliteStore;
use intellimap_llm::claude::ClaudeProvider;
use intellimap_llm::ollama::{self, OllamaProvider};
use intellimap_llm::openai::OpenAiProvider;
use intellimap_llm::{AnyEmbedder, AnyGenerator, EmbedderCredentials, ModelRouter};

use crate::config::{Config, Secret};
use crate::pipeline::{AskSettings, RepoAssistant};

/// Priority: explicit path > `INTELLIMAP_CONFIG` env > `intellimap.toml`.
#[must_use]
pub fn resolve_config_path(cli: Option<&Path>) -> PathBuf {
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("INTELLIMAP_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("intellimap.toml")
}

fn exposed(secret: Option<&Secret>) -> Option<String> {
    secret.map(|s| s.expose().to_owned())
}

#[must_use]
pub fn create_embedder(config: &Config) -> AnyEmbedder {
    AnyEmbedder::select(&EmbedderCredentials {
        voyage_api_key: exposed(config.secrets.voyage_api_key.as_ref()),
        openai_api_key: exposed(config.secrets.openai_api_key.as_ref()),
        ollama_url: config.embedding.ollama_url.clone(),
        ollama_model: config.embedding.ollama_model.clone(),
    })
}

/// Register a generator for every provider with credentials; Ollama is
/// always registered.
#[must_use]
pub fn create_router(config: &Config) -> ModelRouter {
    let mut router = ModelRouter::new(config.routing_table(), config.price_table());
    if let Some(key) = exposed(config.secrets.claude_api_key.as_ref()) {
        router = router.with_provider("claude", AnyGenerator::Claude(ClaudeProvider::new(key)));
    }
    if let Some(key) = exposed(config.secrets.openai_api_key.as_ref()) {
        router = router.with_provider("openai", AnyGenerator::OpenAi(OpenAiProvider::new(key)));
    }
    let ollama_url = config
        .embedding
        .ollama_url
        .as_deref()
        .unwrap_or(ollama::DEFAULT_URL);
    router = router.with_provider("ollama", AnyGenerator::Ollama(OllamaProvider::new(ollama_url)));

    tracing::info!(
        claude = router.has_provider("claude"),
        openai = router.has_provider("openai"),
        "router providers registered"
    );
    router
}

/// Open the configured database, creating its parent directory if needed.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the database
/// cannot be opened.
pub async fn open_store(config: &Config) -> anyhow::Result<SqliteStore> {
    let path = config.store.sqlite_path.as_str();
    if path != ":memory:"
        && let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    SqliteStore::open(path)
        .await
        .with_context(|| format!("failed to open database {path}"))
}

/// Wire a [`RepoAssistant`] from `config` with the given backends.
#[must_use]
pub fn assemble(
    config: &Config,
    store: Arc<dyn ContentStore>,
    embedder: AnyEmbedder,
    router: ModelRouter,
) -> RepoAssistant {
    let embeddings = Arc::new(EmbeddingService::new(embedder));
    let index =
        VectorIndex::new(Arc::clone(&store), embeddings).with_config(config.search_config());
    RepoAssistant::new(store, index, router)
        .with_chunker(config.chunker)
        .with_settings(AskSettings {
            top_k: config.search.top_k,
            context_tokens: config.search.context_tokens,
        })
        .with_route_options(config.route_options())
}

/// Build the assistant with real backends selected from `config`.
///
/// # Errors
///
/// Returns an error if the config is invalid or the store cannot be opened.
pub async fn build(config: &Config) -> anyhow::Result<RepoAssistant> {
    config.validate()?;
    let store: Arc<dyn ContentStore> = Arc::new(open_store(config).await?);
    Ok(assemble(
        config,
        store,
        create_embedder(config),
        create_router(config),
    ))
}

#[cfg(test)]
mod tests {
    use intellimap_llm::EmbeddingBackend;

    use super::*;

    #[test]
    fn explicit_path_wins() {
        let path = resolve_config_path(Some(Path::new("custom.toml")));
        assert_eq!(path, PathBuf::from("custom.toml"));
    }

    #[test]
    fn embedder_follows_credentials() {
        let mut config = Config::default();
        assert_eq!(EmbeddingBackend::name(&create_embedder(&config)), "ollama");

        config.secrets.openai_api_key = Some(Secret::new("sk-test"));
        assert_eq!(EmbeddingBackend::name(&create_embedder(&config)), "openai");

        config.secrets.voyage_api_key = Some(Secret::new("pa-test"));
        assert_eq!(EmbeddingBackend::name(&create_embedder(&config)), "voyage");
    }

    #[test]
    fn router_registers_providers_with_keys() {
        let mut config = Config::default();
        let router = create_router(&config);
        assert!(router.has_provider("ollama"));
        assert!(!router.has_provider("claude"));

        config.secrets.claude_api_key = Some(Secret::new("sk-ant-test"));
        let router = create_router(&config);
        assert!(router.has_provider("claude"));
        assert!(!router.has_provider("openai"));
    }

    #[tokio::test]
    async fn open_store_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.store.sqlite_path = dir
            .path()
            .join("nested/index.db")
            .to_string_lossy()
            .into_owned();
        open_store(&config).await.unwrap();
        assert!(dir.path().join("nested/index.db").exists());
    }

    #[tokio::test]
    async fn build_rejects_invalid_config() {
        let mut config = Config::default();
        config.store.sqlite_path = ":memory:".into();
        config.search.top_k = 0;
        assert!(build(&config).await.is_err());

        config.search.top_k = 4;
        let assistant = build(&config).await.unwrap();
        assert!(assistant.router().has_provider("ollama"));
    }
}
