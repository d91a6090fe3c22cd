use crate::workflow::context::NodeContext;
use crate::workflow::node::NodeId;
use crate::workflow::prompts::DIRECT_ANSWER_SYSTEM_PROMPT;
use crate::workflow::state::{StateUpdate, WorkflowState};

/// Answers from the model alone, without search.
pub(crate) async fn run(ctx: &NodeContext<'_>, state: &WorkflowState) -> StateUpdate {
    let mut update = StateUpdate::default();
    let question = state.question_with_context();

    let answer = match ctx.llm_text(DIRECT_ANSWER_SYSTEM_PROMPT, &question).await {
        Ok(answer) if !answer.trim().is_empty() => answer,
        Ok(_) => unavailable(&state.input),
        Err(err) => match err.into_run_error(NodeId::DirectAnswer) {
            Err(reason) => {
                update.mark_cancelled(reason);
                return update;
            }
            Ok(error) => {
                ctx.record(&mut update, error);
                unavailable(&state.input)
            }
        },
    };

    update.draft = Some(answer);
    update
}

fn unavailable(input: &str) -> String {
    format!(
        "# {}\n\nNo answer could be produced right now because the language model \
         was unavailable. Please try again later.",
        input.trim()
    )
}
