use tracing::info;

use crate::aggregate::EvidenceBlock;
use crate::workflow::context::NodeContext;
use crate::workflow::node::NodeId;
use crate::workflow::prompts::{build_reviser_prompt, REVISER_SYSTEM_PROMPT};
use crate::workflow::state::{StateUpdate, WorkflowState};

/// Rewrites the draft against the evaluator's critique.
///
/// Always consumes one revision; on failure the draft is kept as is.
pub(crate) async fn run(ctx: &NodeContext<'_>, state: &WorkflowState) -> StateUpdate {
    let mut update = StateUpdate {
        revision_count: Some(state.revision_count + 1),
        ..Default::default()
    };
    let Some(draft) = state.draft.as_deref() else {
        return update;
    };

    let critique = state
        .evaluation
        .as_ref()
        .map(|e| {
            let mut text = e.critique.clone();
            if !e.missing_topics.is_empty() {
                text.push_str(&format!("\nMissing topics: {}", e.missing_topics.join(", ")));
            }
            text
        })
        .unwrap_or_default();
    let citation_list = EvidenceBlock {
        text: String::new(),
        citations: state.citations.clone(),
    }
    .citation_list();

    let question = state.question_with_context();
    let prompt = build_reviser_prompt(&question, draft, &critique, &citation_list);
    match ctx.llm_text(REVISER_SYSTEM_PROMPT, &prompt).await {
        Ok(revised) if !revised.trim().is_empty() => {
            info!(run_id = %ctx.run_id, revision = state.revision_count + 1, "Revised draft");
            update.draft = Some(revised);
        }
        Ok(_) => {}
        Err(err) => match err.into_run_error(NodeId::Reviser) {
            Err(reason) => update.mark_cancelled(reason),
            Ok(error) => ctx.record(&mut update, error),
        },
    }
    update
}
