mod error;
mod file;
mod memory;

pub use error::StorageError;
pub use file::FileCheckpointStore;
pub use memory::MemoryCheckpointStore;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::workflow::{Checkpoint, NodeId, RunStatus};

/// Trait for checkpoint storage backends.
///
/// Maps a run id to the last checkpoint written for it. The engine writes
/// one whenever a run suspends or finishes.
pub trait CheckpointStore: Send + Sync {
    /// Saves (or replaces) the checkpoint for its run.
    fn save(&self, checkpoint: &Checkpoint) -> Result<(), StorageError>;

    /// Loads the last checkpoint of a run.
    fn load(&self, run_id: &str) -> Result<Checkpoint, StorageError>;

    /// Lists all runs, most recently updated first.
    fn list(&self) -> Result<Vec<RunSummary>, StorageError>;

    /// Deletes a run and its checkpoint.
    fn delete(&self, run_id: &str) -> Result<(), StorageError>;

    /// Gets the most recent run id (if set).
    fn current_run_id(&self) -> Result<Option<String>, StorageError>;

    /// Sets or clears the most recent run id.
    fn set_current_run_id(&self, run_id: Option<&str>) -> Result<(), StorageError>;
}

/// Lightweight listing entry for a stored run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub input: String,
    pub status: RunStatus,
    pub next: Option<NodeId>,
    pub revision_count: u32,
    pub errors: usize,
    pub updated_at: DateTime<Utc>,
}

impl From<&Checkpoint> for RunSummary {
    fn from(checkpoint: &Checkpoint) -> Self {
        let state = &checkpoint.state;
        Self {
            run_id: state.run_id.clone(),
            input: state.input.clone(),
            status: state.status,
            next: checkpoint.next,
            revision_count: state.revision_count,
            errors: state.errors.len(),
            updated_at: state.updated_at,
        }
    }
}
