//! Generation and embedding backends, dispatched through closed enums, plus the
//! task-based model router with its price table and usage metrics.

pub mod any;
pub mod claude;
pub mod error;
pub(crate) mod http;
pub mod metrics;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod pricing;
pub mod provider;
pub(crate) mod retry;
pub mod router;
pub mod voyage;

pub use any::{AnyEmbedder, AnyGenerator, EmbedderCredentials};
pub use error::{FailedAttempt, LlmError};
pub use metrics::{MetricsSnapshot, RouterMetrics};
pub use pricing::{ModelPricing, PriceTable};
pub use provider::{
    ContentType, EmbeddingBackend, Generation, GenerationProvider, GenerationRequest,
};
pub use router::{
    ModelRouter, RouteOptions, RoutePolicy, RouteResponse, RouteTarget, RoutingTable, TaskKind,
};
