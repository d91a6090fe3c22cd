//! Node bodies. Each one reads the state and returns a [`StateUpdate`];
//! only [`step`] applies updates.

mod clarify;
mod deep;
mod direct;
mod evaluator;
mod plan;
mod reviser;
mod review;
mod router;
mod search;
mod tool_agent;
mod writer;

use std::time::Instant;

use chrono::Utc;
use tracing::{debug, warn};

use super::context::NodeContext;
use super::events::WorkflowEvent;
use super::node::NodeId;
use super::state::{PhaseTiming, StateUpdate, WorkflowState};

/// Runs one node against `state` and applies its update.
pub(crate) async fn step(ctx: &NodeContext<'_>, node: NodeId, state: &mut WorkflowState) {
    let (started_at, clock) = begin(ctx, node);
    let update = match node {
        NodeId::DeepResearch => deep::run(ctx, state).await,
        other => execute(ctx, other, state).await,
    };
    finish(ctx, node, state, update, started_at, clock);
}

/// Like [`step`], for use inside the deep sub-pipeline.
pub(crate) async fn step_inner(ctx: &NodeContext<'_>, node: NodeId, state: &mut WorkflowState) {
    let (started_at, clock) = begin(ctx, node);
    let update = execute(ctx, node, state).await;
    finish(ctx, node, state, update, started_at, clock);
}

async fn execute(ctx: &NodeContext<'_>, node: NodeId, state: &WorkflowState) -> StateUpdate {
    match node {
        NodeId::Router => router::run(ctx, state).await,
        NodeId::Clarify => clarify::run(ctx, state).await,
        NodeId::DirectAnswer => direct::run(ctx, state).await,
        NodeId::ToolAgent => tool_agent::run(ctx, state).await,
        NodeId::Planner => plan::planner(ctx, state).await,
        NodeId::WebPlan => plan::web_plan(ctx, state).await,
        NodeId::RefinePlan => plan::refine_plan(ctx, state).await,
        NodeId::ParallelSearch => search::run(ctx, state).await,
        NodeId::Writer => writer::run(ctx, state).await,
        NodeId::Evaluator => evaluator::run(ctx, state).await,
        NodeId::Reviser => reviser::run(ctx, state).await,
        NodeId::HumanReview => review::run(ctx, state),
        NodeId::DeepResearch => {
            warn!(run_id = %ctx.run_id, "Nested deep_research ignored");
            StateUpdate::default()
        }
    }
}

fn begin(ctx: &NodeContext<'_>, node: NodeId) -> (chrono::DateTime<Utc>, Instant) {
    debug!(run_id = %ctx.run_id, node = %node, "Node started");
    ctx.emit(WorkflowEvent::NodeStarted {
        run_id: ctx.run_id.to_string(),
        node,
    });
    (Utc::now(), Instant::now())
}

fn finish(
    ctx: &NodeContext<'_>,
    node: NodeId,
    state: &mut WorkflowState,
    mut update: StateUpdate,
    started_at: chrono::DateTime<Utc>,
    clock: Instant,
) {
    let duration_ms = clock.elapsed().as_millis() as u64;
    update.timings.push(PhaseTiming {
        node,
        started_at,
        duration_ms,
    });
    state.apply(update);
    debug!(run_id = %ctx.run_id, node = %node, duration_ms, "Node finished");
    ctx.emit(WorkflowEvent::NodeFinished {
        run_id: ctx.run_id.to_string(),
        node,
        duration_ms,
    });
}
