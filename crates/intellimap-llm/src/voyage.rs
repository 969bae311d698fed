use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::http::{default_client, provider_error};
use crate::provider::{ContentType, EmbeddingBackend};
use crate::retry::RateLimitRetry;

const API_URL: &str = "https://api.voyageai.com/v1";
pub const CODE_MODEL: &str = "voyage-code-3";
pub const DOCS_MODEL: &str = "voyage-3";

/// Embedding-only backend for the Voyage AI API.
#[derive(Clone)]
pub struct VoyageEmbedder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl fmt::Debug for VoyageEmbedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoyageEmbedder")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl VoyageEmbedder {
    #[must_use]
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, API_URL)
    }

    #[must_use]
    pub fn with_base_url(api_key: String, base_url: &str) -> Self {
        Self {
            client: default_client(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }
}

impl EmbeddingBackend for VoyageEmbedder {
    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>, LlmError> {
        let body = EmbeddingRequest {
            input: [text],
            model,
            input_type: "document",
        };
        let url = format!("{}/embeddings", self.base_url);

        let response = RateLimitRetry::DEFAULT.send("voyage", || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
        })
        .await?;

        if !response.status().is_success() {
            return Err(provider_error("voyage", response).await);
        }

        let resp: EmbeddingResponse = response.json().await?;
        resp.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or(LlmError::EmptyResponse { provider: "voyage" })
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "voyage"
    }

    fn model_for(&self, content: ContentType) -> &str {
        match content {
            ContentType::Code => CODE_MODEL,
            ContentType::Docs => DOCS_MODEL,
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: [&'a str; 1],
    model: &'a str,
    input_type: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn models_differ_by_content_type() {
        let voyage = VoyageEmbedder::new("k".into());
        assert_eq!(voyage.model_for(ContentType::Code), "voyage-code-3");
        assert_eq!(voyage.model_for(ContentType::Docs), "voyage-3");
    }

    #[tokio::test]
    async fn embed_posts_single_input() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("authorization", "Bearer vk"))
            .and(body_partial_json(serde_json::json!({
                "input": ["fn add(a: i32, b: i32) -> i32 { a + b }"],
                "model": CODE_MODEL
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [1.0, 0.0], "index": 0}],
                "model": CODE_MODEL
            })))
            .expect(1)
            .mount(&server)
            .await;

        let voyage = VoyageEmbedder::with_base_url("vk".into(), &server.uri());
        let vector = voyage
            .embed("fn add(a: i32, b: i32) -> i32 { a + b }", CODE_MODEL)
            .await
            .unwrap();
        assert_eq!(vector, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn empty_data_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
            .mount(&server)
            .await;

        let voyage = VoyageEmbedder::with_base_url("vk".into(), &server.uri());
        let err = voyage.embed("x", DOCS_MODEL).await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse { provider: "voyage" }));
    }
}
