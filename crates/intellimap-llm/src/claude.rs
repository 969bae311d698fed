use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::http::{default_client, provider_error};
use crate::provider::{Generation, GenerationProvider, GenerationRequest};
use crate::retry::RateLimitRetry;

const API_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Clone)]
pub struct ClaudeProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl fmt::Debug for ClaudeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaudeProvider")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ClaudeProvider {
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

impl GenerationProvider for ClaudeProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, LlmError> {
        let body = RequestBody {
            model: &request.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: (!request.system_prompt.is_empty()).then_some(request.system_prompt.as_str()),
            messages: vec![ApiMessage {
                role: "user",
                content: &request.user_prompt,
            }],
        };
        let url = format!("{}/v1/messages", self.base_url);

        let response = RateLimitRetry::DEFAULT.send("claude", || {
            self.client
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&body)
                .send()
        })
        .await?;

        if !response.status().is_success() {
            return Err(provider_error("claude", response).await);
        }

        let resp: ApiResponse = response.json().await?;
        let text: String = resp
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse { provider: "claude" });
        }

        Ok(Generation {
            text,
            tokens_in: resp.usage.input_tokens,
            tokens_out: resp.usage.output_tokens,
        })
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "claude"
    }
}

#[derive(Serialize)]
struct RequestBody<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<ApiMessage<'a>>,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: ApiUsage,
}

#[derive(Deserialize, Default)]
#[allow(clippy::struct_field_names)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}
