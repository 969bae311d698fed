use intellimap_index::IndexError;
use intellimap_index::types::SnapshotId;
use intellimap_llm::{LlmError, TaskKind};
use serde::ser::SerializeStruct;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    #[error("snapshot {0} not found")]
    SnapshotNotFound(SnapshotId),
}

/// An `ask` that failed, tagged with the task it was routed as.
///
/// Serializes as `{"task": ..., "error": "<message>"}`.
#[derive(Debug, thiserror::Error)]
#[error("{task} request failed: {error}")]
pub struct AskFailure {
    pub task: TaskKind,
    #[source]
    pub error: PipelineError,
}

impl AskFailure {
    pub(crate) fn new(task: TaskKind, error: impl Into<PipelineError>) -> Self {
        Self {
            task,
            error: error.into(),
        }
    }
}

impl serde::Serialize for AskFailure {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("AskFailure", 2)?;
        state.serialize_field("task", &self.task)?;
        state.serialize_field("error", &self.error.to_string())?;
        state.end()
    }
}
