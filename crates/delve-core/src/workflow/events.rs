use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use super::node::NodeId;
use super::state::{DimensionScores, RunError, Verdict};

/// Lifecycle events emitted while a run progresses.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    NodeStarted {
        run_id: String,
        node: NodeId,
    },
    NodeFinished {
        run_id: String,
        node: NodeId,
        duration_ms: u64,
    },
    ToolCall {
        run_id: String,
        query: String,
    },
    SearchCompleted {
        run_id: String,
        query: String,
        hits: usize,
    },
    VerdictProduced {
        run_id: String,
        verdict: Verdict,
        scores: DimensionScores,
    },
    Error {
        run_id: String,
        error: RunError,
    },
    CancellationObserved {
        run_id: String,
        reason: String,
    },
    Suspended {
        run_id: String,
    },
    Completed {
        run_id: String,
    },
}

/// Optional event channel. Sending never fails the run.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<UnboundedSender<WorkflowEvent>>,
}

impl EventSink {
    pub fn new(sender: UnboundedSender<WorkflowEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: WorkflowEvent) {
        if let Some(sender) = &self.sender {
            // Receiver gone means nobody is listening anymore
            let _ = sender.send(event);
        }
    }
}
