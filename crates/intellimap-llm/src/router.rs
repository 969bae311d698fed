use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::any::AnyGenerator;
use crate::error::{FailedAttempt, LlmError};
use crate::metrics::{MetricsSnapshot, RouterMetrics};
use crate::pricing::PriceTable;
use crate::provider::{GenerationProvider, GenerationRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Explain,
    Impact,
    Triage,
    Transform,
}

impl TaskKind {
    pub const ALL: [Self; 4] = [Self::Explain, Self::Impact, Self::Triage, Self::Transform];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Explain => "explain",
            Self::Impact => "impact",
            Self::Triage => "triage",
            Self::Transform => "transform",
        }
    }

    /// System prompt used when the caller supplies none.
    #[must_use]
    pub fn default_system_prompt(self) -> &'static str {
        match self {
            Self::Explain => {
                "You explain source code. Answer from the provided code context, cite file \
                 paths and line ranges, and say so when the context is insufficient."
            }
            Self::Impact => {
                "You assess the impact of changing code. Using the provided context, list the \
                 callers, modules and behaviours likely affected, most critical first."
            }
            Self::Triage => {
                "You triage questions about a codebase. Reply briefly with the most relevant \
                 files and the next step to investigate."
            }
            Self::Transform => {
                "You rewrite code on request. Return only the transformed code for the \
                 referenced snippet, preserving behaviour unless told otherwise."
            }
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "explain" => Ok(Self::Explain),
            "impact" => Ok(Self::Impact),
            "triage" => Ok(Self::Triage),
            "transform" => Ok(Self::Transform),
            other => Err(LlmError::Other(format!("unknown task kind: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTarget {
    pub provider: String,
    pub model: String,
}

impl RouteTarget {
    #[must_use]
    pub fn new(provider: &str, model: &str) -> Self {
        Self {
            provider: provider.to_owned(),
            model: model.to_owned(),
        }
    }
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// Primary target plus fallbacks tried in declared order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePolicy {
    pub primary: RouteTarget,
    #[serde(default)]
    pub fallbacks: Vec<RouteTarget>,
}

impl RoutePolicy {
    pub fn chain(&self) -> impl Iterator<Item = &RouteTarget> {
        std::iter::once(&self.primary).chain(&self.fallbacks)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    routes: HashMap<TaskKind, RoutePolicy>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        let strong = || RoutePolicy {
            primary: RouteTarget::new("claude", "claude-sonnet-4-5"),
            fallbacks: vec![
                RouteTarget::new("openai", "gpt-4o"),
                RouteTarget::new("ollama", "llama3.1"),
            ],
        };
        let mut routes = HashMap::new();
        routes.insert(TaskKind::Explain, strong());
        routes.insert(TaskKind::Impact, strong());
        routes.insert(
            TaskKind::Transform,
            RoutePolicy {
                primary: RouteTarget::new("claude", "claude-sonnet-4-5"),
                fallbacks: vec![RouteTarget::new("openai", "gpt-4o")],
            },
        );
        routes.insert(
            TaskKind::Triage,
            RoutePolicy {
                primary: RouteTarget::new("openai", "gpt-4o-mini"),
                fallbacks: vec![
                    RouteTarget::new("claude", "claude-haiku-4-5"),
                    RouteTarget::new("ollama", "llama3.2"),
                ],
            },
        );
        Self { routes }
    }
}

impl RoutingTable {
    /// Replace the policy for one task, keeping the others.
    #[must_use]
    pub fn with_route(mut self, task: TaskKind, policy: RoutePolicy) -> Self {
        self.routes.insert(task, policy);
        self
    }

    #[must_use]
    pub fn policy(&self, task: TaskKind) -> Option<&RoutePolicy> {
        self.routes.get(&task)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteOptions {
    /// Overrides the task's default system prompt.
    pub system_prompt: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_tokens: 1024,
            temperature: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteResponse {
    pub provider: String,
    pub model: String,
    pub content: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost: f64,
    pub latency: Duration,
}

/// Maps a task to an ordered chain of `(provider, model)` targets and runs the
/// first one that succeeds.
#[derive(Debug)]
pub struct ModelRouter {
    providers: HashMap<String, AnyGenerator>,
    table: RoutingTable,
    pricing: PriceTable,
    metrics: RouterMetrics,
}

impl ModelRouter {
    #[must_use]
    pub fn new(table: RoutingTable, pricing: PriceTable) -> Self {
        Self {
            providers: HashMap::new(),
            table,
            pricing,
            metrics: RouterMetrics::new(),
        }
    }

    /// Register a backend under the provider name used in the routing table.
    #[must_use]
    pub fn with_provider(mut self, name: &str, provider: AnyGenerator) -> Self {
        self.providers.insert(name.to_owned(), provider);
        self
    }

    #[must_use]
    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    #[must_use]
    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    /// Run `prompt` for `task`, falling back through the task's policy.
    ///
    /// Metrics and cost are recorded only for the call that succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::AllProvidersFailed`] naming the task when every target
    /// in the chain fails or is not registered.
    pub async fn route(
        &self,
        task: TaskKind,
        prompt: &str,
        options: &RouteOptions,
    ) -> Result<RouteResponse, LlmError> {
        let mut attempts = Vec::new();
        let Some(policy) = self.table.policy(task) else {
            return Err(LlmError::AllProvidersFailed { task, attempts });
        };
        let system_prompt = options
            .system_prompt
            .as_deref()
            .unwrap_or_else(|| task.default_system_prompt());

        for target in policy.chain() {
            let Some(provider) = self.providers.get(&target.provider) else {
                tracing::debug!(%task, target = %target, "provider not registered, skipping");
                attempts.push(FailedAttempt {
                    provider: target.provider.clone(),
                    model: target.model.clone(),
                    error: LlmError::UnknownProvider(target.provider.clone()).to_string(),
                    transport: false,
                });
                continue;
            };

            let request = GenerationRequest {
                model: target.model.clone(),
                system_prompt: system_prompt.to_owned(),
                user_prompt: prompt.to_owned(),
                max_tokens: options.max_tokens,
                temperature: options.temperature,
            };
            let started = Instant::now();
            match provider.generate(&request).await {
                Ok(generation) => {
                    let latency = started.elapsed();
                    let cost = self.pricing.cost(
                        &target.provider,
                        &target.model,
                        generation.tokens_in,
                        generation.tokens_out,
                    );
                    self.metrics
                        .record(generation.tokens_in, generation.tokens_out, cost, latency);
                    tracing::info!(
                        %task,
                        target = %target,
                        tokens_in = generation.tokens_in,
                        tokens_out = generation.tokens_out,
                        latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        "routed"
                    );
                    return Ok(RouteResponse {
                        provider: target.provider.clone(),
                        model: target.model.clone(),
                        content: generation.text,
                        tokens_in: generation.tokens_in,
                        tokens_out: generation.tokens_out,
                        cost,
                        latency,
                    });
                }
                Err(e) => {
                    tracing::warn!(%task, target = %target, error = %e, "router fallback");
                    attempts.push(FailedAttempt {
                        provider: target.provider.clone(),
                        model: target.model.clone(),
                        transport: e.is_transport(),
                        error: e.to_string(),
                    });
                }
            }
        }

        Err(LlmError::AllProvidersFailed { task, attempts })
    }

    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    #[must_use]
    pub fn subscribe_metrics(&self) -> watch::Receiver<MetricsSnapshot> {
        self.metrics.subscribe()
    }
}
