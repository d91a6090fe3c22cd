//! Agentic search loop: the model picks one query at a time.

use serde::Deserialize;
use tracing::{debug, info};

use crate::llm::truncate_chars;
use crate::workflow::context::{CallError, NodeContext};
use crate::workflow::events::WorkflowEvent;
use crate::workflow::node::NodeId;
use crate::workflow::prompts::{
    build_tool_agent_prompt, TOOL_AGENT_SCHEMA, TOOL_AGENT_SYSTEM_PROMPT,
};
use crate::workflow::state::{normalize_query, ErrorKind, RunError, StateUpdate, WorkflowState};

const FINDINGS_PER_SEARCH: usize = 3;
const FINDING_CHARS: usize = 200;

#[derive(Debug, Deserialize)]
struct AgentStep {
    action: String,
    #[serde(default)]
    query: Option<String>,
}

pub(crate) async fn run(ctx: &NodeContext<'_>, state: &WorkflowState) -> StateUpdate {
    let mut update = StateUpdate::default();
    let question = state.question_with_context();
    let mut calls = state.tool_calls;
    let mut executed = state.executed_queries.clone();
    let mut findings: Vec<String> = Vec::new();
    let mut model_down = false;

    while calls < state.max_tool_calls {
        let remaining = state.max_tool_calls - calls;
        let prompt = build_tool_agent_prompt(&question, &executed, &findings, remaining);
        let query = match ctx
            .llm_json::<AgentStep>(TOOL_AGENT_SYSTEM_PROMPT, &prompt, TOOL_AGENT_SCHEMA)
            .await
        {
            Ok(step) if step.action.trim().eq_ignore_ascii_case("search") => step.query,
            Ok(_) => None,
            Err(err) => match err.into_run_error(NodeId::ToolAgent) {
                Err(reason) => {
                    update.mark_cancelled(reason);
                    break;
                }
                Ok(error) => {
                    ctx.record(&mut update, error);
                    model_down = true;
                    // Without the model, search the question once and stop
                    update.executed_queries.is_empty().then(|| state.input.trim().to_string())
                }
            },
        };

        let Some(query) = query.map(|q| q.trim().to_string()).filter(|q| !q.is_empty()) else {
            break;
        };
        let key = normalize_query(&query);
        if executed.iter().any(|q| normalize_query(q) == key) {
            debug!(run_id = %ctx.run_id, query = %query, "Agent repeated a query; finishing");
            break;
        }

        calls += 1;
        ctx.emit(WorkflowEvent::ToolCall {
            run_id: ctx.run_id.to_string(),
            query: query.clone(),
        });

        match ctx.search(&query, state.route).await {
            Ok(hits) => {
                ctx.emit(WorkflowEvent::SearchCompleted {
                    run_id: ctx.run_id.to_string(),
                    query: query.clone(),
                    hits: hits.len(),
                });
                if hits.is_empty() {
                    findings.push(format!("\"{query}\" found nothing"));
                }
                findings.extend(hits.iter().take(FINDINGS_PER_SEARCH).map(|hit| {
                    format!("{}: {}", hit.title, truncate_chars(hit.content.trim(), FINDING_CHARS))
                }));
                update.hits.extend(hits);
            }
            Err(CallError::Cancelled(reason)) => {
                update.mark_cancelled(reason);
                break;
            }
            Err(CallError::TimedOut(after)) => {
                let error = RunError::new(
                    NodeId::ToolAgent,
                    ErrorKind::Timeout,
                    format!("search for \"{query}\" timed out after {}s", after.as_secs()),
                );
                ctx.record(&mut update, error);
            }
            Err(CallError::Llm(err)) => {
                let error = RunError::new(NodeId::ToolAgent, ErrorKind::Search, err.to_string());
                ctx.record(&mut update, error);
            }
        }

        executed.push(query.clone());
        update.executed_queries.push(query);
        if model_down {
            break;
        }
    }

    info!(run_id = %ctx.run_id, tool_calls = calls, hits = update.hits.len(), "Agent finished");
    update.tool_calls = Some(calls);
    update
}
