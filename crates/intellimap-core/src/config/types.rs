use std::collections::HashMap;
use std::fmt;

use intellimap_index::chunker::ChunkerConfig;
use intellimap_index::search::DEFAULT_LEXICAL_CANDIDATES;
use intellimap_llm::RoutePolicy;
use serde::{Deserialize, Serialize};

/// String that never shows up in `Debug` or `Display` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub chunker: ChunkerConfig,
    #[serde(default)]
    pub search: SearchSection,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(skip)]
    pub secrets: ResolvedSecrets,
}

fn default_project_name() -> String {
    "default".into()
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ProjectConfig {
    #[serde(default = "default_project_name")]
    pub name: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: default_project_name(),
        }
    }
}

fn default_sqlite_path() -> String {
    ".intellimap/index.db".into()
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Database file, or `:memory:`.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
        }
    }
}

fn default_lexical_candidates() -> usize {
    DEFAULT_LEXICAL_CANDIDATES
}

fn default_top_k() -> usize {
    8
}

fn default_context_tokens() -> usize {
    4000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct SearchSection {
    #[serde(default = "default_lexical_candidates")]
    pub lexical_candidates: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Token budget for code context handed to the router.
    #[serde(default = "default_context_tokens")]
    pub context_tokens: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            lexical_candidates: default_lexical_candidates(),
            top_k: default_top_k(),
            context_tokens: default_context_tokens(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub ollama_url: Option<String>,
    #[serde(default)]
    pub ollama_model: Option<String>,
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.2
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Per-task policy overrides keyed by task name (`explain`, `triage`, ...).
    #[serde(default)]
    pub routes: HashMap<String, RoutePolicy>,
    #[serde(default)]
    pub pricing: Vec<PriceOverride>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            routes: HashMap::new(),
            pricing: Vec::new(),
        }
    }
}

/// USD per million tokens for one `(provider, model)` pair.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PriceOverride {
    pub provider: String,
    pub model: String,
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

/// Credentials read from the environment; never loaded from or written to
/// the config file.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSecrets {
    pub voyage_api_key: Option<Secret>,
    pub openai_api_key: Option<Secret>,
    pub claude_api_key: Option<Secret>,
}
