//! Query planning: the initial plan, the short web plan and follow-up plans.

use serde::Deserialize;
use tracing::info;

use crate::workflow::context::NodeContext;
use crate::workflow::node::NodeId;
use crate::workflow::prompts::{
    build_plan_prompt, build_refine_prompt, PLANNER_SCHEMA, PLANNER_SYSTEM_PROMPT,
    REFINE_SYSTEM_PROMPT,
};
use crate::workflow::state::{dedup_queries, StateUpdate, WorkflowState};

#[derive(Debug, Default, Deserialize)]
struct PlanResponse {
    #[serde(default)]
    queries: Vec<String>,
}

pub(crate) async fn planner(ctx: &NodeContext<'_>, state: &WorkflowState) -> StateUpdate {
    initial_plan(ctx, state, NodeId::Planner, ctx.services.workflow.max_queries).await
}

pub(crate) async fn web_plan(ctx: &NodeContext<'_>, state: &WorkflowState) -> StateUpdate {
    initial_plan(ctx, state, NodeId::WebPlan, ctx.services.workflow.web_max_queries).await
}

async fn initial_plan(
    ctx: &NodeContext<'_>,
    state: &WorkflowState,
    node: NodeId,
    max_queries: usize,
) -> StateUpdate {
    let mut update = StateUpdate::default();
    let question = state.question_with_context();
    let prompt = build_plan_prompt(&question, max_queries);

    let proposed = match ctx
        .llm_json::<PlanResponse>(PLANNER_SYSTEM_PROMPT, &prompt, PLANNER_SCHEMA)
        .await
    {
        Ok(response) => response.queries,
        Err(err) => match err.into_run_error(node) {
            Err(reason) => {
                update.mark_cancelled(reason);
                return update;
            }
            Ok(error) => {
                ctx.record(&mut update, error);
                Vec::new()
            }
        },
    };

    let mut plan = fresh_queries(state, proposed, max_queries);
    if plan.is_empty() {
        // One search for the question itself beats no search at all
        plan = vec![state.input.trim().to_string()];
    }

    info!(run_id = %ctx.run_id, node = %node, queries = plan.len(), "Planned searches");
    update.plan = Some(plan);
    update
}

/// Plans follow-up searches from the last evaluation's gaps.
///
/// Counts as one revision whether or not it finds anything new to search.
pub(crate) async fn refine_plan(ctx: &NodeContext<'_>, state: &WorkflowState) -> StateUpdate {
    let mut update = StateUpdate {
        revision_count: Some(state.revision_count + 1),
        ..Default::default()
    };
    let max_queries = ctx.services.workflow.max_queries;
    let (missing, suggestions) = state
        .evaluation
        .as_ref()
        .map(|e| (e.missing_topics.clone(), e.follow_up_queries.clone()))
        .unwrap_or_default();

    let prompt = build_refine_prompt(
        &state.question_with_context(),
        &missing,
        &suggestions,
        &state.executed_queries,
        max_queries,
    );

    let proposed = match ctx
        .llm_json::<PlanResponse>(REFINE_SYSTEM_PROMPT, &prompt, PLANNER_SCHEMA)
        .await
    {
        Ok(response) => response.queries,
        Err(err) => match err.into_run_error(NodeId::RefinePlan) {
            Err(reason) => {
                update.mark_cancelled(reason);
                return update;
            }
            Ok(error) => {
                ctx.record(&mut update, error);
                Vec::new()
            }
        },
    };

    let mut plan = fresh_queries(state, proposed, max_queries);
    if plan.is_empty() {
        let derived = suggestions.into_iter().chain(
            missing
                .iter()
                .map(|topic| format!("{} {}", state.input.trim(), topic.trim())),
        );
        plan = fresh_queries(state, derived.collect(), max_queries);
    }

    info!(
        run_id = %ctx.run_id,
        revision = state.revision_count + 1,
        queries = plan.len(),
        "Planned follow-up searches"
    );
    update.plan = Some(plan);
    update
}

/// Deduplicated queries not yet run in this state, capped at `max`.
fn fresh_queries(state: &WorkflowState, proposed: Vec<String>, max: usize) -> Vec<String> {
    dedup_queries(proposed)
        .into_iter()
        .filter(|q| !state.was_executed(q))
        .take(max)
        .collect()
}
