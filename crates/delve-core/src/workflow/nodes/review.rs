use tracing::info;

use crate::workflow::context::NodeContext;
use crate::workflow::state::{RunStatus, StateUpdate, WorkflowState};

const EMPTY_REPORT: &str = "No report could be produced for this question.";

/// Final stop of every path. With review enabled the run suspends here
/// and the engine persists it; otherwise the best report becomes final.
pub(crate) fn run(ctx: &NodeContext<'_>, state: &WorkflowState) -> StateUpdate {
    let report = state.report().unwrap_or(EMPTY_REPORT).to_string();

    if ctx.services.workflow.review_enabled {
        info!(run_id = %ctx.run_id, "Awaiting review");
        return StateUpdate {
            status: Some(RunStatus::AwaitingReview),
            draft: Some(report),
            ..Default::default()
        };
    }

    StateUpdate {
        status: Some(RunStatus::Completed),
        final_report: Some(report),
        ..Default::default()
    }
}
