use serde::Deserialize;
use tracing::info;

use crate::workflow::context::NodeContext;
use crate::workflow::node::NodeId;
use crate::workflow::prompts::{build_clarify_prompt, CLARIFY_SCHEMA, CLARIFY_SYSTEM_PROMPT};
use crate::workflow::state::{StateUpdate, WorkflowState};

/// Questions shorter than this are too vague to research without the model.
const MIN_RESEARCHABLE_WORDS: usize = 3;

#[derive(Debug, Deserialize)]
struct ClarifyResponse {
    #[serde(default)]
    needs_clarification: bool,
    #[serde(default)]
    question: Option<String>,
}

/// Either asks the user one question or lets the run continue as deep research.
pub(crate) async fn run(ctx: &NodeContext<'_>, state: &WorkflowState) -> StateUpdate {
    let mut update = StateUpdate::default();
    let prompt = build_clarify_prompt(&state.question_with_context());

    let question = match ctx
        .llm_json::<ClarifyResponse>(CLARIFY_SYSTEM_PROMPT, &prompt, CLARIFY_SCHEMA)
        .await
    {
        Ok(response) if response.needs_clarification => response
            .question
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .or_else(|| Some(generic_question(&state.input))),
        Ok(_) => None,
        Err(err) => match err.into_run_error(NodeId::Clarify) {
            Err(reason) => {
                update.mark_cancelled(reason);
                return update;
            }
            Ok(error) => {
                ctx.record(&mut update, error);
                let too_short = state.input.split_whitespace().count() < MIN_RESEARCHABLE_WORDS;
                too_short.then(|| generic_question(&state.input))
            }
        },
    };

    if let Some(question) = question {
        info!(run_id = %ctx.run_id, "Asking for clarification");
        update.draft = Some(question.clone());
        update.clarification = Some(question);
    }
    update
}

fn generic_question(input: &str) -> String {
    format!(
        "Could you say more about what you want to know regarding \"{}\"? \
         For example the time frame, region or angle you care about.",
        input.trim()
    )
}
