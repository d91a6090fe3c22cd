use serde::Deserialize;
use tracing::info;

use crate::aggregate::scoring::is_time_sensitive;
use crate::search::clamp_unit;
use crate::workflow::context::NodeContext;
use crate::workflow::node::NodeId;
use crate::workflow::prompts::{build_router_prompt, ROUTER_SCHEMA, ROUTER_SYSTEM_PROMPT};
use crate::workflow::state::{Route, RunMode, StateUpdate, WorkflowState};

/// Confidence reported for a lexical routing decision.
const HEURISTIC_CONFIDENCE: f64 = 0.5;

const DIRECT_PREFIXES: &[&str] = &["what is ", "what's ", "define ", "who is ", "who was "];
const DEEP_MARKERS: &[&str] = &[
    "compare", "comparison", "analysis", "analyze", "market", "trend", "impact", "versus", " vs ",
    "landscape", "overview", "pros and cons",
];

#[derive(Debug, Deserialize)]
struct RouterResponse {
    route: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_confidence() -> f64 {
    1.0
}

pub(crate) async fn run(ctx: &NodeContext<'_>, state: &WorkflowState) -> StateUpdate {
    let mut update = StateUpdate::default();
    let prompt = build_router_prompt(&state.question_with_context());

    let (route, confidence) = match ctx
        .llm_json::<RouterResponse>(ROUTER_SYSTEM_PROMPT, &prompt, ROUTER_SCHEMA)
        .await
    {
        Ok(response) => (Route::from_label(&response.route), clamp_unit(response.confidence)),
        Err(err) => match err.into_run_error(NodeId::Router) {
            Err(reason) => {
                update.mark_cancelled(reason);
                return update;
            }
            Ok(error) => {
                ctx.record(&mut update, error);
                (Some(heuristic_route(&state.input)), HEURISTIC_CONFIDENCE)
            }
        },
    };

    // Unrecognized labels and low confidence both ask the user first
    let route = match route {
        Some(route) if confidence >= ctx.services.workflow.min_route_confidence => route,
        _ => Route::Clarify,
    };

    info!(run_id = %ctx.run_id, route = %route, confidence, "Routed question");
    update.route = Some(route);
    update.route_confidence = Some(confidence);
    update.mode = Some(mode_for(route));
    update
}

/// Run mode implied by a route. Clarified questions continue as deep runs.
pub(crate) fn mode_for(route: Route) -> RunMode {
    match route {
        Route::Direct => RunMode::Direct,
        Route::Web => RunMode::Web,
        Route::Agent => RunMode::Agentic,
        Route::Deep | Route::Clarify => RunMode::Deep,
    }
}

/// Lexical routing used when the model is unavailable.
pub(crate) fn heuristic_route(question: &str) -> Route {
    let lower = format!(" {} ", question.trim().to_lowercase());
    let words = question.split_whitespace().count();

    if words < 2 {
        return Route::Clarify;
    }
    if DEEP_MARKERS.iter().any(|m| lower.contains(m)) || is_time_sensitive(question) {
        return Route::Deep;
    }
    if words <= 8 && DIRECT_PREFIXES.iter().any(|p| lower.trim_start().starts_with(p)) {
        return Route::Direct;
    }
    Route::Deep
}
