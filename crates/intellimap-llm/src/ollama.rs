use ollama_rs::Ollama;
use ollama_rs::generation::chat::ChatMessage;
use ollama_rs::generation::chat::request::ChatMessageRequest;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};

use crate::error::LlmError;
use crate::provider::{
    ContentType, EmbeddingBackend, Generation, GenerationProvider, GenerationRequest,
};

pub const DEFAULT_URL: &str = "http://localhost:11434";
const DEFAULT_PORT: u16 = 11434;
pub const EMBEDDING_MODEL: &str = "nomic-embed-text";

/// Local Ollama backend, used for generation and as the last-resort embedder.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Ollama,
    embedding_model: String,
}

impl OllamaProvider {
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        let (host, port) = split_base_url(base_url);
        Self {
            client: Ollama::new(host, port),
            embedding_model: EMBEDDING_MODEL.to_owned(),
        }
    }

    #[must_use]
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }
}

impl GenerationProvider for OllamaProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, LlmError> {
        let mut messages = Vec::with_capacity(2);
        if !request.system_prompt.is_empty() {
            messages.push(ChatMessage::system(request.system_prompt.clone()));
        }
        messages.push(ChatMessage::user(request.user_prompt.clone()));

        let response = self
            .client
            .send_chat_messages(ChatMessageRequest::new(request.model.clone(), messages))
            .await
            .map_err(|e| LlmError::Backend {
                provider: "ollama",
                message: format!("chat request failed: {e}"),
            })?;

        let text = response.message.content;
        if text.is_empty() {
            return Err(LlmError::EmptyResponse { provider: "ollama" });
        }
        let (tokens_in, tokens_out) = response.final_data.map_or((0, 0), |data| {
            (
                u64::from(data.prompt_eval_count),
                u64::from(data.eval_count),
            )
        });

        Ok(Generation {
            text,
            tokens_in,
            tokens_out,
        })
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "ollama"
    }
}

impl EmbeddingBackend for OllamaProvider {
    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>, LlmError> {
        let request = GenerateEmbeddingsRequest::new(model.to_owned(), EmbeddingsInput::from(text));

        let response = self
            .client
            .generate_embeddings(request)
            .await
            .map_err(|e| LlmError::Backend {
                provider: "ollama",
                message: format!("embedding request failed: {e}"),
            })?;

        response
            .embeddings
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or(LlmError::EmptyResponse { provider: "ollama" })
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "ollama"
    }

    fn model_for(&self, _content: ContentType) -> &str {
        &self.embedding_model
    }
}

/// Split a base URL into the `(scheme://host, port)` pair `Ollama::new` takes.
///
/// A missing or unparsable port maps to [`DEFAULT_PORT`].
fn split_base_url(url: &str) -> (String, u16) {
    match reqwest::Url::parse(url) {
        Ok(parsed) if parsed.host_str().is_some() => {
            let host = parsed.host_str().unwrap_or_default();
            let port = parsed.port().unwrap_or(DEFAULT_PORT);
            (format!("{}://{host}", parsed.scheme()), port)
        }
        _ => (url.trim_end_matches('/').to_owned(), DEFAULT_PORT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_splits_into_host_and_port() {
        assert_eq!(
            split_base_url("http://localhost:11434"),
            ("http://localhost".to_owned(), 11434)
        );
        assert_eq!(
            split_base_url("https://gpu-box:8080/"),
            ("https://gpu-box".to_owned(), 8080)
        );
    }

    #[test]
    fn missing_or_invalid_port_uses_default() {
        assert_eq!(split_base_url("http://localhost").1, DEFAULT_PORT);
        let (host, port) = split_base_url("http://localhost:99999");
        assert_eq!(host, "http://localhost:99999");
        assert_eq!(port, DEFAULT_PORT);
    }

    #[test]
    fn embedding_model_defaults_and_overrides() {
        let provider = OllamaProvider::new(DEFAULT_URL);
        assert_eq!(provider.model_for(ContentType::Code), EMBEDDING_MODEL);
        let provider = provider.with_embedding_model("mxbai-embed-large");
        assert_eq!(provider.model_for(ContentType::Docs), "mxbai-embed-large");
    }

    #[tokio::test]
    async fn embed_with_unreachable_endpoint_is_transport_error() {
        let provider = OllamaProvider::new("http://127.0.0.1:1");
        let err = provider.embed("text", EMBEDDING_MODEL).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn generate_with_unreachable_endpoint_errors() {
        let provider = OllamaProvider::new("http://127.0.0.1:1");
        let result = provider
            .generate(&GenerationRequest {
                model: "llama3.2".into(),
                system_prompt: String::new(),
                user_prompt: "hi".into(),
                max_tokens: 16,
                temperature: 0.0,
            })
            .await;
        assert!(result.is_err());
    }

}
