//! Embedding service: backend dispatch plus a content-hash keyed cache.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use intellimap_llm::{AnyEmbedder, ContentType, EmbeddingBackend};

use crate::error::{IndexError, Result};
use crate::hash::content_hash;

/// A vector together with the model that produced it.
///
/// The vector is shared: cache hits hand out the same allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Arc<[f32]>,
    pub model: String,
    pub dimension: usize,
}

type CacheKey = (String, String);

/// Owns the selected embedding backend and the cache of its results.
///
/// The cache is keyed by `(model, sha256(text))` and lives as long as the
/// service. Concurrent misses for one key may call the backend twice; the
/// first result stored wins and is what every caller receives.
#[derive(Debug)]
pub struct EmbeddingService {
    backend: AnyEmbedder,
    cache: RwLock<HashMap<CacheKey, Embedding>>,
}

impl EmbeddingService {
    #[must_use]
    pub fn new(backend: AnyEmbedder) -> Self {
        Self {
            backend,
            cache: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn provider_name(&self) -> &str {
        self.backend.name()
    }

    #[must_use]
    pub fn model_for(&self, content: ContentType) -> &str {
        self.backend.model_for(content)
    }

    /// Embed `text`, serving repeated content from the cache.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::EmbeddingProvider`] if the backend fails or returns
    /// an empty vector. Failures are not cached.
    pub async fn embed(&self, text: &str, content: ContentType) -> Result<Embedding> {
        let model = self.backend.model_for(content).to_owned();
        let key = (model, content_hash(text));

        if let Some(hit) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(hit.clone());
        }

        let vector = self
            .backend
            .embed(text, &key.0)
            .await
            .map_err(|e| IndexError::embedding(self.backend.name(), &e))?;
        if vector.is_empty() {
            return Err(IndexError::EmbeddingProvider {
                provider: self.backend.name().to_owned(),
                body: "empty vector".into(),
            });
        }

        let embedding = Embedding {
            dimension: vector.len(),
            vector: Arc::from(vector),
            model: key.0.clone(),
        };
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        Ok(cache.entry(key).or_insert(embedding).clone())
    }

    /// Embed each text in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first embedding error encountered.
    pub async fn embed_batch<S: AsRef<str>>(
        &self,
        texts: &[S],
        content: ContentType,
    ) -> Result<Vec<Embedding>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text.as_ref(), content).await?);
        }
        Ok(out)
    }

    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn clear_cache(&self) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
