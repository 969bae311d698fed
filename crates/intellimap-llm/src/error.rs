use serde::Serialize;

use crate::router::TaskKind;

/// One failed hop of a routing chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedAttempt {
    pub provider: String,
    pub model: String,
    pub error: String,
    /// `true` when the failure happened below the vendor API (connect, timeout, TLS).
    pub transport: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rate limited")]
    RateLimited,

    #[error("{provider} API error {status}: {body}")]
    Provider {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} request failed: {message}")]
    Backend {
        provider: &'static str,
        message: String,
    },

    #[error("empty response from {provider}")]
    EmptyResponse { provider: &'static str },

    #[error("provider '{0}' is not configured")]
    UnknownProvider(String),

    #[error("all providers failed for task {task}")]
    AllProvidersFailed {
        task: TaskKind,
        attempts: Vec<FailedAttempt>,
    },

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    /// Network-layer failure as opposed to a vendor rejecting the request.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Http(e) => !e.is_status() && !e.is_decode(),
            Self::Backend { .. } => true,
            _ => false,
        }
    }
}
