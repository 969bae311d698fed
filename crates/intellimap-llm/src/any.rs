use crate::claude::ClaudeProvider;
use crate::error::LlmError;
#[cfg(any(test, feature = "mock"))]
use crate::mock::{MockEmbedder, MockGenerator};
use crate::ollama::{self, OllamaProvider};
use crate::openai::OpenAiProvider;
use crate::provider::{
    ContentType, EmbeddingBackend, Generation, GenerationProvider, GenerationRequest,
};
use crate::voyage::VoyageEmbedder;

/// Generates a match over all `AnyGenerator` variants, binding the inner provider
/// and evaluating the given expression for each arm.
macro_rules! delegate_generator {
    ($self:expr, |$p:ident| $expr:expr) => {
        match $self {
            AnyGenerator::Claude($p) => $expr,
            AnyGenerator::OpenAi($p) => $expr,
            AnyGenerator::Ollama($p) => $expr,
            #[cfg(any(test, feature = "mock"))]
            AnyGenerator::Mock($p) => $expr,
        }
    };
}

macro_rules! delegate_embedder {
    ($self:expr, |$p:ident| $expr:expr) => {
        match $self {
            AnyEmbedder::Voyage($p) => $expr,
            AnyEmbedder::OpenAi($p) => $expr,
            AnyEmbedder::Ollama($p) => $expr,
            #[cfg(any(test, feature = "mock"))]
            AnyEmbedder::Mock($p) => $expr,
        }
    };
}

#[derive(Debug, Clone)]
pub enum AnyGenerator {
    Claude(ClaudeProvider),
    OpenAi(OpenAiProvider),
    Ollama(OllamaProvider),
    #[cfg(any(test, feature = "mock"))]
    Mock(MockGenerator),
}

impl GenerationProvider for AnyGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, LlmError> {
        delegate_generator!(self, |p| p.generate(request).await)
    }

    fn name(&self) -> &str {
        delegate_generator!(self, |p| GenerationProvider::name(p))
    }
}

#[derive(Debug, Clone)]
pub enum AnyEmbedder {
    Voyage(VoyageEmbedder),
    OpenAi(OpenAiProvider),
    Ollama(OllamaProvider),
    #[cfg(any(test, feature = "mock"))]
    Mock(MockEmbedder),
}

impl EmbeddingBackend for AnyEmbedder {
    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>, LlmError> {
        delegate_embedder!(self, |p| p.embed(text, model).await)
    }

    fn name(&self) -> &str {
        delegate_embedder!(self, |p| EmbeddingBackend::name(p))
    }

    fn model_for(&self, content: ContentType) -> &str {
        delegate_embedder!(self, |p| p.model_for(content))
    }
}

/// Credentials consulted when picking an embedding backend.
#[derive(Debug, Clone, Default)]
pub struct EmbedderCredentials {
    pub voyage_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub ollama_url: Option<String>,
    pub ollama_model: Option<String>,
}

impl AnyEmbedder {
    /// Resolve the priority chain once: Voyage, then OpenAI, then local Ollama.
    ///
    /// Blank keys count as absent.
    #[must_use]
    pub fn select(credentials: &EmbedderCredentials) -> Self {
        let present = |key: &Option<String>| {
            key.as_deref()
                .filter(|k| !k.trim().is_empty())
                .map(str::to_owned)
        };

        let backend = if let Some(key) = present(&credentials.voyage_api_key) {
            Self::Voyage(VoyageEmbedder::new(key))
        } else if let Some(key) = present(&credentials.openai_api_key) {
            Self::OpenAi(OpenAiProvider::new(key))
        } else {
            let url = credentials.ollama_url.as_deref().unwrap_or(ollama::DEFAULT_URL);
            let mut provider = OllamaProvider::new(url);
            if let Some(model) = &credentials.ollama_model {
                provider = provider.with_embedding_model(model.clone());
            }
            Self::Ollama(provider)
        };
        tracing::info!(provider = EmbeddingBackend::name(&backend), "embedding backend selected");
        backend
    }
}
