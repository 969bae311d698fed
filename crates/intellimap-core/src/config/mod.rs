mod env;
mod types;


pub use types::*;

use std::path::Path;

use anyhow::{Context, bail};
use intellimap_index::search::SearchConfig;
use intellimap_llm::{ModelPricing, PriceTable, RouteOptions, RoutingTable, TaskKind};

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chunker.max_tokens == 0 {
            bail!("chunker.max_tokens must be greater than 0");
        }
        if self.chunker.oversize_tokens < self.chunker.max_tokens {
            bail!(
                "chunker.oversize_tokens ({}) must not be below chunker.max_tokens ({})",
                self.chunker.oversize_tokens,
                self.chunker.max_tokens
            );
        }
        if self.search.lexical_candidates == 0 {
            bail!("search.lexical_candidates must be greater than 0");
        }
        if self.search.top_k == 0 {
            bail!("search.top_k must be greater than 0");
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            bail!(
                "llm.temperature must be within 0.0..=2.0, got {}",
                self.llm.temperature
            );
        }
        for task in self.llm.routes.keys() {
            task.parse::<TaskKind>()
                .with_context(|| format!("invalid key in llm.routes: {task}"))?;
        }
        for price in &self.llm.pricing {
            if price.input_per_mtok < 0.0 || price.output_per_mtok < 0.0 {
                bail!(
                    "negative price for {}/{} in llm.pricing",
                    price.provider,
                    price.model
                );
            }
        }
        Ok(())
    }

    /// Default routing table with configured per-task overrides applied.
    ///
    /// Unknown task names are skipped; [`Config::validate`] reports them.
    #[must_use]
    pub fn routing_table(&self) -> RoutingTable {
        let mut table = RoutingTable::default();
        for (task, policy) in &self.llm.routes {
            match task.parse::<TaskKind>() {
                Ok(kind) => table = table.with_route(kind, policy.clone()),
                Err(e) => tracing::warn!(error = %e, "ignoring route override"),
            }
        }
        table
    }

    /// Built-in prices with configured overrides applied.
    #[must_use]
    pub fn price_table(&self) -> PriceTable {
        let mut table = PriceTable::default();
        for price in &self.llm.pricing {
            table.insert(
                &price.provider,
                &price.model,
                ModelPricing {
                    input_per_mtok: price.input_per_mtok,
                    output_per_mtok: price.output_per_mtok,
                },
            );
        }
        table
    }

    #[must_use]
    pub fn route_options(&self) -> RouteOptions {
        RouteOptions {
            system_prompt: None,
            max_tokens: self.llm.max_tokens,
            temperature: self.llm.temperature,
        }
    }

    #[must_use]
    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            lexical_candidates: self.search.lexical_candidates,
        }
    }
}
