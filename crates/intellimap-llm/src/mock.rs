//! Deterministic test doubles for generation and embedding backends.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::LlmError;
use crate::provider::{
    ContentType, EmbeddingBackend, Generation, GenerationProvider, GenerationRequest,
};

/// Shared log of `"{provider}:{model}"` entries, one per generate call.
pub type CallLog = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Clone)]
pub struct MockGenerator {
    label: String,
    reply: String,
    fail: bool,
    echo: bool,
    tokens_in: u64,
    tokens_out: u64,
    log: CallLog,
}

impl MockGenerator {
    #[must_use]
    pub fn new(label: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            reply: reply.into(),
            fail: false,
            echo: false,
            tokens_in: 10,
            tokens_out: 5,
            log: CallLog::default(),
        }
    }

    #[must_use]
    pub fn failing(label: impl Into<String>) -> Self {
        let mut mock = Self::new(label, "");
        mock.fail = true;
        mock
    }

    /// Replies with the user prompt it received.
    #[must_use]
    pub fn echoing(label: impl Into<String>) -> Self {
        let mut mock = Self::new(label, "");
        mock.echo = true;
        mock
    }

    #[must_use]
    pub fn with_usage(mut self, tokens_in: u64, tokens_out: u64) -> Self {
        self.tokens_in = tokens_in;
        self.tokens_out = tokens_out;
        self
    }

    #[must_use]
    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }
}

impl GenerationProvider for MockGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, LlmError> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(format!("{}:{}", self.label, request.model));
        if self.fail {
            return Err(LlmError::Other(format!("{} unavailable", self.label)));
        }
        let text = if self.echo {
            request.user_prompt.clone()
        } else {
            self.reply.clone()
        };
        Ok(Generation {
            text,
            tokens_in: self.tokens_in,
            tokens_out: self.tokens_out,
        })
    }

    fn name(&self) -> &str {
        &self.label
    }
}

pub const MOCK_CODE_MODEL: &str = "mock-code";
pub const MOCK_DOCS_MODEL: &str = "mock-docs";

/// Bag-of-characters embedder: each char adds weight to bucket `char % dimension`.
/// Code and docs report different model names.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dimension: usize,
    fail_on: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl MockEmbedder {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            fail_on: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail every request whose text contains `needle`.
    #[must_use]
    pub fn failing_on(mut self, needle: impl Into<String>) -> Self {
        self.fail_on = Some(needle.into());
        self
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        for c in text.chars() {
            vector[c as usize % self.dimension] += 1.0;
        }
        vector
    }
}

impl EmbeddingBackend for MockEmbedder {
    async fn embed(&self, text: &str, _model: &str) -> Result<Vec<f32>, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(needle) = &self.fail_on
            && text.contains(needle.as_str())
        {
            return Err(LlmError::Provider {
                provider: "mock",
                status: 500,
                body: format!("refusing to embed text containing {needle:?}"),
            });
        }
        Ok(self.vector_for(text))
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }

    fn model_for(&self, content: ContentType) -> &str {
        match content {
            ContentType::Code => MOCK_CODE_MODEL,
            ContentType::Docs => MOCK_DOCS_MODEL,
        }
    }
}
