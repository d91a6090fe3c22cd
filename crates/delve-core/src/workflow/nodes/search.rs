//! Parallel fan-out of the current plan.
//!
//! One task per query, bounded by the fan-out limiter. Results are merged in
//! plan order so the run does not depend on completion order. Queries that
//! timed out are not marked executed, so a later plan may try them again.

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, info};

use crate::search::SearchResult;
use crate::workflow::context::{CallError, NodeContext};
use crate::workflow::events::WorkflowEvent;
use crate::workflow::node::NodeId;
use crate::workflow::state::{ErrorKind, RunError, Route, StateUpdate, WorkflowState};

struct TaskOutcome {
    query: String,
    hits: Vec<SearchResult>,
    error: Option<RunError>,
    cancelled: Option<String>,
}

pub(crate) async fn run(ctx: &NodeContext<'_>, state: &WorkflowState) -> StateUpdate {
    let queries: Vec<String> = state
        .plan
        .iter()
        .filter(|q| !state.was_executed(q))
        .cloned()
        .collect();
    let mut update = StateUpdate::default();
    if queries.is_empty() {
        debug!(run_id = %ctx.run_id, "Nothing new to search");
        return update;
    }

    let mut tasks: FuturesUnordered<_> = queries
        .into_iter()
        .enumerate()
        .map(|(index, query)| async move {
            (index, search_task(ctx, query, state.route).await)
        })
        .collect();

    let mut outcomes = Vec::new();
    while let Some(outcome) = tasks.next().await {
        outcomes.push(outcome);
    }
    outcomes.sort_by_key(|(index, _)| *index);

    let mut cancelled = None;
    for (_, outcome) in outcomes {
        if outcome.cancelled.is_some() {
            cancelled = cancelled.or(outcome.cancelled);
            continue;
        }
        ctx.emit(WorkflowEvent::SearchCompleted {
            run_id: ctx.run_id.to_string(),
            query: outcome.query.clone(),
            hits: outcome.hits.len(),
        });
        let timed_out = outcome
            .error
            .as_ref()
            .is_some_and(|error| error.kind == ErrorKind::Timeout);
        if let Some(error) = outcome.error {
            ctx.record(&mut update, error);
        }
        if !timed_out {
            update.executed_queries.push(outcome.query);
        }
        update.hits.extend(outcome.hits);
    }

    info!(
        run_id = %ctx.run_id,
        queries = update.executed_queries.len(),
        hits = update.hits.len(),
        "Fan-out finished"
    );
    if let Some(reason) = cancelled {
        update.mark_cancelled(reason);
    }
    update
}

async fn search_task(ctx: &NodeContext<'_>, query: String, route: Option<Route>) -> TaskOutcome {
    let mut outcome = TaskOutcome {
        query,
        hits: Vec::new(),
        error: None,
        cancelled: None,
    };

    // Queueing for a permit is not part of the task's time budget
    let _permit = match ctx.cancellable(ctx.services.fan_out.acquire()).await {
        Ok(Ok(permit)) => permit,
        Ok(Err(_closed)) => {
            outcome.error = Some(search_error(&outcome.query, "fan-out limiter closed"));
            return outcome;
        }
        Err(err) => return fail(outcome, err),
    };

    match ctx.search(&outcome.query, route).await {
        Ok(hits) if hits.is_empty() => {
            outcome.error = Some(search_error(&outcome.query, "no provider returned results"));
        }
        Ok(hits) => outcome.hits = hits,
        Err(err) => return fail(outcome, err),
    }
    outcome
}

fn fail(mut outcome: TaskOutcome, err: CallError) -> TaskOutcome {
    match err {
        CallError::Cancelled(reason) => outcome.cancelled = Some(reason),
        CallError::TimedOut(after) => {
            outcome.error = Some(RunError::new(
                NodeId::ParallelSearch,
                ErrorKind::Timeout,
                format!("search for \"{}\" timed out after {}s", outcome.query, after.as_secs()),
            ));
        }
        CallError::Llm(err) => {
            outcome.error = Some(search_error(&outcome.query, &err.to_string()));
        }
    }
    outcome
}

fn search_error(query: &str, message: &str) -> RunError {
    RunError::new(
        NodeId::ParallelSearch,
        ErrorKind::Search,
        format!("search for \"{query}\": {message}"),
    )
}
