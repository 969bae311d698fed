//! Configuration, component bootstrap and the ingest/ask pipeline that ties
//! retrieval to task routing.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod pipeline;

pub use error::{AskFailure, PipelineError};
pub use pipeline::{Answer, IngestReport, RepoAssistant, SourceFile};
