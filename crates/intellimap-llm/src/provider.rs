use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Kind of text being embedded; backends map it to a model identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Code,
    Docs,
}

impl ContentType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Docs => "docs",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

pub trait GenerationProvider: Send + Sync {
    /// Run a single prompt against `request.model`.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Provider`] when the vendor rejects the request and
    /// [`LlmError::Http`] for transport failures.
    fn generate(
        &self,
        request: &GenerationRequest,
    ) -> impl Future<Output = Result<Generation, LlmError>> + Send;

    fn name(&self) -> &str;
}

pub trait EmbeddingBackend: Send + Sync {
    /// Embed `text` with `model`. The vector length is the model's dimension.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails or yields no vector.
    fn embed(
        &self,
        text: &str,
        model: &str,
    ) -> impl Future<Output = Result<Vec<f32>, LlmError>> + Send;

    fn name(&self) -> &str;

    /// Model identifier used for the given kind of content.
    fn model_for(&self, content: ContentType) -> &str;
}
