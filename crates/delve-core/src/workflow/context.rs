use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::events::{EventSink, WorkflowEvent};
use super::node::NodeId;
use super::services::ResearchServices;
use super::state::{ErrorKind, RunError, Route, StateUpdate};
use crate::llm::{complete_typed, LLMError};
use crate::search::SearchResult;

const DEFAULT_CANCEL_REASON: &str = "cancelled by caller";

/// Per-run cancellation token plus the reason it was triggered.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
    reason: Arc<Mutex<Option<String>>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self, reason: impl Into<String>) {
        if let Ok(mut slot) = self.reason.lock() {
            slot.get_or_insert_with(|| reason.into());
        }
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> String {
        self.reason
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
            .unwrap_or_else(|| DEFAULT_CANCEL_REASON.to_string())
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Resolves once the run is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

/// Why a guarded call produced no value.
#[derive(Debug)]
pub(crate) enum CallError {
    Cancelled(String),
    TimedOut(Duration),
    Llm(LLMError),
}

impl CallError {
    /// Splits the failure into a loggable run error or, when the run was
    /// cancelled, the cancellation reason.
    pub fn into_run_error(self, node: NodeId) -> Result<RunError, String> {
        match self {
            CallError::Cancelled(reason) => Err(reason),
            CallError::TimedOut(after) => Ok(RunError::new(
                node,
                ErrorKind::Timeout,
                format!("call timed out after {}s", after.as_secs()),
            )),
            CallError::Llm(err) => Ok(RunError::new(
                node,
                ErrorKind::LanguageModel,
                err.to_string(),
            )),
        }
    }
}

/// What a node sees of the run: services, cancellation and the event sink.
pub(crate) struct NodeContext<'a> {
    pub services: &'a ResearchServices,
    pub cancel: &'a CancelHandle,
    pub events: &'a EventSink,
    pub run_id: &'a str,
}

impl NodeContext<'_> {
    pub fn emit(&self, event: WorkflowEvent) {
        self.events.emit(event);
    }

    pub fn check_cancelled(&self) -> Result<(), CallError> {
        if self.cancel.is_cancelled() {
            Err(CallError::Cancelled(self.cancel.reason()))
        } else {
            Ok(())
        }
    }

    /// Runs `fut` under cancellation only, for waits with no natural bound
    /// such as queueing for a limiter permit.
    pub async fn cancellable<F: Future>(&self, fut: F) -> Result<F::Output, CallError> {
        self.check_cancelled()?;
        tokio::select! {
            _ = self.cancel.cancelled() => Err(CallError::Cancelled(self.cancel.reason())),
            output = fut => Ok(output),
        }
    }

    /// Runs `fut` under cancellation and a timeout, checking the token on
    /// both sides of the await.
    pub async fn guarded<F: Future>(
        &self,
        timeout: Duration,
        fut: F,
    ) -> Result<F::Output, CallError> {
        let output = self
            .cancellable(tokio::time::timeout(timeout, fut))
            .await?
            .map_err(|_| CallError::TimedOut(timeout))?;
        self.check_cancelled()?;
        Ok(output)
    }

    /// Structured model call deserialized into `T`.
    pub async fn llm_json<T: DeserializeOwned>(
        &self,
        system: &str,
        prompt: &str,
        schema: &str,
    ) -> Result<T, CallError> {
        let llm = self.services.llm.as_ref();
        self.guarded(
            self.services.llm_timeout,
            complete_typed::<T>(llm, system, prompt, schema),
        )
        .await?
        .map_err(CallError::Llm)
    }

    /// Free-text model call.
    pub async fn llm_text(&self, system: &str, prompt: &str) -> Result<String, CallError> {
        self.guarded(
            self.services.llm_timeout,
            self.services.llm.complete_with_system(system, prompt),
        )
        .await?
        .map_err(CallError::Llm)
    }

    /// One search through the orchestrator with the configured defaults and
    /// the provider profile of `route`.
    pub async fn search(
        &self,
        query: &str,
        route: Option<Route>,
    ) -> Result<Vec<SearchResult>, CallError> {
        let orchestrator = &self.services.orchestrator;
        let profile = self.services.search.profile_for(route.map(|r| r.as_str()));
        self.guarded(
            self.services.workflow.search_task_timeout(),
            orchestrator.search(
                query,
                orchestrator.default_max_results(),
                orchestrator.default_strategy(),
                profile,
            ),
        )
        .await
    }

    /// Records a non-fatal failure and reports it on the event channel.
    pub fn record(&self, update: &mut StateUpdate, error: RunError) {
        warn!(
            node = %error.node,
            kind = ?error.kind,
            message = %error.message,
            "Recoverable failure"
        );
        self.emit(WorkflowEvent::Error {
            run_id: self.run_id.to_string(),
            error: error.clone(),
        });
        update.errors.push(error);
    }
}
