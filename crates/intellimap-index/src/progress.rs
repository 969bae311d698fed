//! Batch embedding outcomes and progress reporting.

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::error::{IndexError, Result};
use crate::types::ChunkId;

/// One progress tick; `current` counts chunks processed so far.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EmbedProgress {
    pub current: usize,
    pub total: usize,
    pub percentage: f32,
}

impl EmbedProgress {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(current: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            100.0
        } else {
            current as f32 * 100.0 / total as f32
        };
        Self {
            current,
            total,
            percentage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum ChunkOutcome {
    Embedded,
    Failed(String),
}

/// Per-chunk results of an `embed_snapshot` run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<(ChunkId, ChunkOutcome)>,
    pub total: usize,
    pub cancelled: bool,
}

impl BatchReport {
    #[must_use]
    pub fn embedded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| *o == ChunkOutcome::Embedded)
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (ChunkId, &str)> {
        self.outcomes.iter().filter_map(|(id, o)| match o {
            ChunkOutcome::Failed(reason) => Some((*id, reason.as_str())),
            ChunkOutcome::Embedded => None,
        })
    }
}

/// Handle to a running `embed_snapshot` task.
///
/// `progress` yields one event per processed chunk and ends when the task
/// finishes; it cannot be restarted.
#[derive(Debug)]
pub struct EmbedJob {
    pub progress: UnboundedReceiverStream<EmbedProgress>,
    cancel: CancellationToken,
    handle: JoinHandle<Result<BatchReport>>,
}

impl EmbedJob {
    pub(crate) fn new(
        progress: UnboundedReceiverStream<EmbedProgress>,
        cancel: CancellationToken,
        handle: JoinHandle<Result<BatchReport>>,
    ) -> Self {
        Self {
            progress,
            cancel,
            handle,
        }
    }

    /// Stop after the chunk currently being embedded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the run to end.
    ///
    /// # Errors
    ///
    /// Returns an error if the chunk listing fails or the task panicked.
    pub async fn finish(self) -> Result<BatchReport> {
        self.handle
            .await
            .map_err(|e| IndexError::Other(format!("embedding task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_of_empty_run_is_complete() {
        assert!((EmbedProgress::new(0, 0).percentage - 100.0).abs() < f32::EPSILON);
    }

    #[test]
    fn percentage_scales_with_current() {
        let p = EmbedProgress::new(1, 4);
        assert!((p.percentage - 25.0).abs() < f32::EPSILON);
    }

    #[test]
    fn report_counts_embedded_and_lists_failures() {
        let report = BatchReport {
            outcomes: vec![
                (ChunkId(1), ChunkOutcome::Embedded),
                (ChunkId(2), ChunkOutcome::Failed("timeout".into())),
                (ChunkId(3), ChunkOutcome::Embedded),
            ],
            total: 3,
            cancelled: false,
        };
        assert_eq!(report.embedded(), 2);
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures, [(ChunkId(2), "timeout")]);
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(ChunkOutcome::Failed("boom".into())).unwrap();
        assert_eq!(json, serde_json::json!({"status": "failed", "reason": "boom"}));
    }
}
