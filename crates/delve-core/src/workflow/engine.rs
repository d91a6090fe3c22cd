use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use super::checkpoint::{Checkpoint, ReviewDecision};
use super::context::{CancelHandle, NodeContext};
use super::events::{EventSink, WorkflowEvent};
use super::node::{next_node, NodeId, Transition};
use super::nodes::step;
use super::services::ResearchServices;
use super::state::{RunStatus, StateUpdate, WorkflowState};
use super::WorkflowError;
use crate::storage::CheckpointStore;

/// How a call into the engine ended.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(WorkflowState),
    /// Waiting at `human_review`; resume with [`WorkflowEngine::resume`] or
    /// [`WorkflowEngine::resume_checkpoint`].
    Suspended(Checkpoint),
    Cancelled(WorkflowState),
}

impl RunOutcome {
    pub fn state(&self) -> &WorkflowState {
        match self {
            RunOutcome::Completed(state) | RunOutcome::Cancelled(state) => state,
            RunOutcome::Suspended(checkpoint) => &checkpoint.state,
        }
    }

    pub fn into_state(self) -> WorkflowState {
        match self {
            RunOutcome::Completed(state) | RunOutcome::Cancelled(state) => state,
            RunOutcome::Suspended(checkpoint) => checkpoint.state,
        }
    }
}

/// Drives a run from `router` to `human_review`.
///
/// The engine owns the state for the duration of a run and is the only
/// place updates are applied. Node failures become [`RunError`] entries;
/// only storage failures while suspending abort a call.
///
/// [`RunError`]: super::RunError
pub struct WorkflowEngine {
    services: Arc<ResearchServices>,
    store: Option<Arc<dyn CheckpointStore>>,
    events: EventSink,
}

impl WorkflowEngine {
    pub fn new(services: Arc<ResearchServices>) -> Self {
        Self {
            services,
            store: None,
            events: EventSink::none(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_events(mut self, sender: UnboundedSender<WorkflowEvent>) -> Self {
        self.events = EventSink::new(sender);
        self
    }

    pub fn services(&self) -> &ResearchServices {
        &self.services
    }

    /// Fresh state for `question` with this engine's budgets.
    pub fn new_state(&self, question: &str) -> WorkflowState {
        WorkflowState::new(question.trim(), &self.services.workflow)
    }

    /// Runs `question` to completion without external cancellation.
    pub async fn run(&self, question: &str) -> Result<RunOutcome, WorkflowError> {
        self.run_with(self.new_state(question), &CancelHandle::new()).await
    }

    /// Runs a prepared state from the router, observing `cancel`.
    pub async fn run_with(
        &self,
        state: WorkflowState,
        cancel: &CancelHandle,
    ) -> Result<RunOutcome, WorkflowError> {
        info!(run_id = %state.run_id, question = %state.input, "Starting research run");
        self.drive(state, NodeId::Router, cancel).await
    }

    /// Loads a suspended run from the store and completes it with `decision`.
    pub async fn resume(
        &self,
        run_id: &str,
        decision: ReviewDecision,
    ) -> Result<RunOutcome, WorkflowError> {
        let store = self.store.as_ref().ok_or(WorkflowError::NoStore)?;
        let checkpoint = store.load(run_id)?;
        self.resume_checkpoint(checkpoint, decision).await
    }

    /// Completes a suspended run from its checkpoint.
    ///
    /// This is the way back for runs suspended by an engine without a store,
    /// which hand their only checkpoint to the caller.
    pub async fn resume_checkpoint(
        &self,
        checkpoint: Checkpoint,
        decision: ReviewDecision,
    ) -> Result<RunOutcome, WorkflowError> {
        let run_id = checkpoint.run_id().to_string();
        if checkpoint.state.status != RunStatus::AwaitingReview {
            return Err(WorkflowError::NotSuspended {
                run_id,
                status: checkpoint.state.status,
            });
        }
        if checkpoint.next != Some(NodeId::HumanReview) {
            return Err(WorkflowError::NothingToResume(run_id));
        }

        let mut state = checkpoint.state;
        let report = match decision {
            ReviewDecision::Approve => state.report().unwrap_or_default().to_string(),
            ReviewDecision::Edit(text) => text,
        };
        state.apply(StateUpdate {
            status: Some(RunStatus::Completed),
            final_report: Some(report),
            ..Default::default()
        });

        info!(run_id = %state.run_id, "Review applied");
        if let Some(store) = &self.store {
            store.save(&Checkpoint::new(state.clone(), None))?;
        }
        self.events.emit(WorkflowEvent::Completed {
            run_id: state.run_id.clone(),
        });
        Ok(RunOutcome::Completed(state))
    }

    async fn drive(
        &self,
        mut state: WorkflowState,
        start: NodeId,
        cancel: &CancelHandle,
    ) -> Result<RunOutcome, WorkflowError> {
        let run_id = state.run_id.clone();
        let ctx = NodeContext {
            services: &self.services,
            cancel,
            events: &self.events,
            run_id: &run_id,
        };
        let mut node = start;

        loop {
            if cancel.is_cancelled() && !state.is_cancelled() {
                state.apply(StateUpdate::cancelled(cancel.reason()));
            }
            if state.is_cancelled() {
                return Ok(self.finish_cancelled(state));
            }

            step(&ctx, node, &mut state).await;
            if state.is_cancelled() {
                continue;
            }

            match next_node(node, &state, &self.services.workflow) {
                Transition::Next(next) => node = next,
                Transition::Suspend => {
                    let checkpoint = Checkpoint::new(state, Some(NodeId::HumanReview));
                    self.persist_suspended(&checkpoint)?;
                    info!(run_id = %run_id, "Run suspended for review");
                    self.events.emit(WorkflowEvent::Suspended {
                        run_id: run_id.clone(),
                    });
                    return Ok(RunOutcome::Suspended(checkpoint));
                }
                Transition::Done => {
                    self.persist_final(&state);
                    info!(
                        run_id = %run_id,
                        revisions = state.revision_count,
                        errors = state.errors.len(),
                        "Run completed"
                    );
                    self.events.emit(WorkflowEvent::Completed {
                        run_id: run_id.clone(),
                    });
                    return Ok(RunOutcome::Completed(state));
                }
            }
        }
    }

    fn finish_cancelled(&self, state: WorkflowState) -> RunOutcome {
        let reason = state.cancel_reason.clone().unwrap_or_default();
        info!(run_id = %state.run_id, reason = %reason, "Run cancelled");
        self.events.emit(WorkflowEvent::CancellationObserved {
            run_id: state.run_id.clone(),
            reason,
        });
        self.persist_final(&state);
        RunOutcome::Cancelled(state)
    }

    /// A suspended run that cannot be saved cannot be resumed by id, so this
    /// fails the call. Without a store the returned checkpoint is the only copy.
    fn persist_suspended(&self, checkpoint: &Checkpoint) -> Result<(), WorkflowError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        store.save(checkpoint)?;
        store.set_current_run_id(Some(checkpoint.run_id()))?;
        Ok(())
    }

    fn persist_final(&self, state: &WorkflowState) {
        let Some(store) = &self.store else {
            return;
        };
        let checkpoint = Checkpoint::new(state.clone(), None);
        let saved = store
            .save(&checkpoint)
            .and_then(|_| store.set_current_run_id(Some(checkpoint.run_id())));
        if let Err(err) = saved {
            warn!(run_id = %state.run_id, error = %err, "Failed to save final checkpoint");
        }
    }
}
