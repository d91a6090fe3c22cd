use serde::Deserialize;
use tracing::info;

use crate::search::clamp_unit;
use crate::workflow::citations::{analyze, apply_citation_gate};
use crate::workflow::context::NodeContext;
use crate::workflow::events::WorkflowEvent;
use crate::workflow::node::NodeId;
use crate::workflow::prompts::{build_evaluator_prompt, EVALUATOR_SCHEMA, EVALUATOR_SYSTEM_PROMPT};
use crate::workflow::state::{DimensionScores, Evaluation, StateUpdate, Verdict, WorkflowState};

const UNCITED_CRITIQUE: &str =
    "Several factual claims lack citations. Cite each one with the bracketed source number.";
const DANGLING_CRITIQUE: &str =
    "Some citation markers do not match any source in the citation list.";

#[derive(Debug, Deserialize)]
struct EvaluatorResponse {
    verdict: String,
    coverage: Option<f64>,
    accuracy: Option<f64>,
    freshness: Option<f64>,
    coherence: Option<f64>,
    #[serde(default)]
    missing_topics: Vec<String>,
    #[serde(default)]
    follow_up_queries: Vec<String>,
    #[serde(default)]
    critique: String,
}

/// Scores the draft, then applies the local citation gate.
pub(crate) async fn run(ctx: &NodeContext<'_>, state: &WorkflowState) -> StateUpdate {
    let mut update = StateUpdate::default();
    let workflow = &ctx.services.workflow;
    let draft = state.draft.as_deref().unwrap_or_default();

    let aggregator = &ctx.services.aggregator;
    let limits = aggregator.config();
    let evidence = aggregator
        .aggregate(&state.hits, &state.input)
        .format_evidence(limits.max_items_per_tier, limits.max_chars_per_item);
    let prompt = build_evaluator_prompt(&state.question_with_context(), draft, &evidence);

    let mut evaluation = match ctx
        .llm_json::<EvaluatorResponse>(EVALUATOR_SYSTEM_PROMPT, &prompt, EVALUATOR_SCHEMA)
        .await
    {
        Ok(response) => from_response(response, workflow.coverage_floor),
        Err(err) => match err.into_run_error(NodeId::Evaluator) {
            Err(reason) => {
                update.mark_cancelled(reason);
                return update;
            }
            Ok(error) => {
                ctx.record(&mut update, error);
                // An unavailable reviewer does not block the report
                Evaluation {
                    verdict: Verdict::Pass,
                    scores: DimensionScores::uniform(workflow.coverage_floor),
                    missing_topics: Vec::new(),
                    follow_up_queries: Vec::new(),
                    critique: String::new(),
                }
            }
        },
    };

    let citations = analyze(draft, state.citations.len());
    evaluation.scores.citation_coverage = citations.coverage();
    evaluation.scores.citation_accuracy = citations.accuracy();

    let gated = apply_citation_gate(
        evaluation.verdict,
        citations.coverage(),
        workflow.citation_floor,
    );
    if gated != evaluation.verdict {
        append_critique(&mut evaluation.critique, UNCITED_CRITIQUE);
        evaluation.verdict = gated;
    }
    if citations.accuracy() < 1.0 {
        append_critique(&mut evaluation.critique, DANGLING_CRITIQUE);
    }

    info!(
        run_id = %ctx.run_id,
        verdict = %evaluation.verdict,
        coverage = evaluation.scores.coverage,
        citation_coverage = evaluation.scores.citation_coverage,
        revision = state.revision_count,
        "Evaluated draft"
    );
    ctx.emit(WorkflowEvent::VerdictProduced {
        run_id: ctx.run_id.to_string(),
        verdict: evaluation.verdict,
        scores: evaluation.scores,
    });

    update.evaluation = Some(evaluation);
    update
}

fn from_response(response: EvaluatorResponse, neutral: f64) -> Evaluation {
    let score = |value: Option<f64>| value.map(clamp_unit).unwrap_or(neutral);
    Evaluation {
        // An unreadable verdict is treated as a request to revise
        verdict: Verdict::from_label(&response.verdict).unwrap_or(Verdict::Revise),
        scores: DimensionScores {
            coverage: score(response.coverage),
            accuracy: score(response.accuracy),
            freshness: score(response.freshness),
            coherence: score(response.coherence),
            citation_coverage: 1.0,
            citation_accuracy: 1.0,
        },
        missing_topics: clean(response.missing_topics),
        follow_up_queries: clean(response.follow_up_queries),
        critique: response.critique.trim().to_string(),
    }
}

fn clean(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn append_critique(critique: &mut String, note: &str) {
    if !critique.is_empty() {
        critique.push(' ');
    }
    critique.push_str(note);
}
