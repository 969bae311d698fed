use super::{Config, Secret};

fn non_blank(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_core();
        self.apply_env_secrets();
    }

    fn apply_env_overrides_core(&mut self) {
        if let Some(v) = non_blank("INTELLIMAP_PROJECT") {
            self.project.name = v;
        }
        if let Some(v) = non_blank("INTELLIMAP_SQLITE_PATH") {
            self.store.sqlite_path = v;
        }
        if let Some(v) = non_blank("INTELLIMAP_OLLAMA_URL") {
            self.embedding.ollama_url = Some(v);
        }
        if let Some(v) = non_blank("INTELLIMAP_OLLAMA_EMBEDDING_MODEL") {
            self.embedding.ollama_model = Some(v);
        }
        if let Ok(v) = std::env::var("INTELLIMAP_SEARCH_TOP_K") {
            match v.parse::<usize>() {
                Ok(k) => self.search.top_k = k,
                Err(_) => tracing::warn!("ignoring invalid INTELLIMAP_SEARCH_TOP_K value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("INTELLIMAP_SEARCH_LEXICAL_CANDIDATES")
            && let Ok(n) = v.parse::<usize>()
        {
            self.search.lexical_candidates = n;
        }
        if let Ok(v) = std::env::var("INTELLIMAP_LLM_MAX_TOKENS")
            && let Ok(n) = v.parse::<u32>()
        {
            self.llm.max_tokens = n;
        }
        if let Ok(v) = std::env::var("INTELLIMAP_LLM_TEMPERATURE")
            && let Ok(t) = v.parse::<f32>()
        {
            self.llm.temperature = t;
        }
    }

    fn apply_env_secrets(&mut self) {
        if let Some(v) = non_blank("INTELLIMAP_VOYAGE_API_KEY") {
            self.secrets.voyage_api_key = Some(Secret::new(v));
        }
        if let Some(v) = non_blank("INTELLIMAP_OPENAI_API_KEY") {
            self.secrets.openai_api_key = Some(Secret::new(v));
        }
        if let Some(v) = non_blank("INTELLIMAP_CLAUDE_API_KEY") {
            self.secrets.claude_api_key = Some(Secret::new(v));
        }
    }
}
