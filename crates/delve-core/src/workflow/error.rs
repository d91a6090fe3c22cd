use thiserror::Error;

use super::state::RunStatus;
use crate::config::ConfigError;
use crate::llm::LLMError;
use crate::storage::StorageError;

/// Errors surfaced by engine entry points.
///
/// Failures inside a run never appear here; they are recorded as
/// [`RunError`](super::RunError) entries on the state.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM setup error: {0}")]
    Llm(#[from] LLMError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Run {run_id} is {status}, not awaiting review")]
    NotSuspended { run_id: String, status: RunStatus },

    #[error("Run {0} has no pending review step")]
    NothingToResume(String),

    #[error("No checkpoint store configured")]
    NoStore,
}
