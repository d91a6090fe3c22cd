//! Self-contained deep research: plan, search, write and evaluate on a
//! private copy of the state, returning the difference as one update.

use tracing::debug;

use super::step_inner;
use crate::workflow::context::NodeContext;
use crate::workflow::node::{next_node, NodeId, Transition};
use crate::workflow::state::{StateUpdate, WorkflowState};

pub(crate) async fn run(ctx: &NodeContext<'_>, state: &WorkflowState) -> StateUpdate {
    let mut local = state.clone();
    let mut node = NodeId::Planner;

    loop {
        step_inner(ctx, node, &mut local).await;
        if local.is_cancelled() {
            break;
        }
        match next_node(node, &local, &ctx.services.workflow) {
            Transition::Next(NodeId::HumanReview | NodeId::DeepResearch) => break,
            Transition::Next(next) => node = next,
            Transition::Suspend | Transition::Done => break,
        }
    }

    debug!(
        run_id = %ctx.run_id,
        revisions = local.revision_count,
        "Deep research finished"
    );
    StateUpdate::between(state, local)
}
