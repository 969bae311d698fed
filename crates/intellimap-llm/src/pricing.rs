use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// USD prices per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

impl ModelPricing {
    pub const FREE: Self = Self {
        input_per_mtok: 0.0,
        output_per_mtok: 0.0,
    };

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cost(&self, tokens_in: u64, tokens_out: u64) -> f64 {
        (self.input_per_mtok * tokens_in as f64 + self.output_per_mtok * tokens_out as f64)
            / 1_000_000.0
    }
}

/// Static price table keyed by `(provider, model)`.
#[derive(Debug, Clone)]
pub struct PriceTable {
    prices: HashMap<(String, String), ModelPricing>,
}

impl Default for PriceTable {
    fn default() -> Self {
        let mut table = Self::empty();
        for (provider, model, input, output) in [
            ("claude", "claude-sonnet-4-5", 3.0, 15.0),
            ("claude", "claude-haiku-4-5", 1.0, 5.0),
            ("claude", "claude-opus-4-1", 15.0, 75.0),
            ("openai", "gpt-4o", 2.5, 10.0),
            ("openai", "gpt-4o-mini", 0.15, 0.6),
            ("openai", "gpt-4.1", 2.0, 8.0),
            ("openai", "gpt-4.1-mini", 0.4, 1.6),
        ] {
            table.insert(
                provider,
                model,
                ModelPricing {
                    input_per_mtok: input,
                    output_per_mtok: output,
                },
            );
        }
        table
    }
}

impl PriceTable {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            prices: HashMap::new(),
        }
    }

    pub fn insert(&mut self, provider: &str, model: &str, pricing: ModelPricing) {
        self.prices
            .insert((provider.to_owned(), model.to_owned()), pricing);
    }

    #[must_use]
    pub fn with_price(mut self, provider: &str, model: &str, pricing: ModelPricing) -> Self {
        self.insert(provider, model, pricing);
        self
    }

    /// Price entry for the pair; unknown pairs are free.
    #[must_use]
    pub fn pricing(&self, provider: &str, model: &str) -> ModelPricing {
        self.prices
            .get(&(provider.to_owned(), model.to_owned()))
            .copied()
            .unwrap_or(ModelPricing::FREE)
    }

    #[must_use]
    pub fn cost(&self, provider: &str, model: &str, tokens_in: u64, tokens_out: u64) -> f64 {
        self.pricing(provider, model).cost(tokens_in, tokens_out)
    }
}
