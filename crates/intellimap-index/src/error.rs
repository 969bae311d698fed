//! Error types for intellimap-index.

use std::num::TryFromIntError;

/// Errors raised while storing, embedding or searching chunks.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// `SQLite` database error.
    #[error("database error: {0}")]
    Sqlite(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The embedding backend failed or returned an unusable vector.
    #[error("embedding provider {provider} failed: {body}")]
    EmbeddingProvider { provider: String, body: String },

    /// Two vectors of different length were compared.
    #[error("dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    /// Integer conversion error.
    #[error("integer conversion failed: {0}")]
    IntConversion(#[from] TryFromIntError),

    /// Generic catch-all error.
    #[error("{0}")]
    Other(String),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;

impl IndexError {
    pub(crate) fn embedding(provider: &str, err: &intellimap_llm::LlmError) -> Self {
        let body = match err {
            intellimap_llm::LlmError::Provider { body, .. } => body.clone(),
            other => other.to_string(),
        };
        Self::EmbeddingProvider {
            provider: provider.to_owned(),
            body,
        }
    }
}
