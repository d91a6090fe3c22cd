use serde::{Deserialize, Serialize};

use super::node::NodeId;
use super::state::WorkflowState;

/// Serializable snapshot of a run and where it continues.
///
/// `next` is `None` once the run has reached a terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub state: WorkflowState,
    pub next: Option<NodeId>,
}

impl Checkpoint {
    pub fn new(state: WorkflowState, next: Option<NodeId>) -> Self {
        Self { state, next }
    }

    pub fn run_id(&self) -> &str {
        &self.state.run_id
    }
}

/// Reviewer's answer to a suspended run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    /// Accept the pending draft as the final report.
    Approve,
    /// Replace the report with the given text.
    Edit(String),
}
