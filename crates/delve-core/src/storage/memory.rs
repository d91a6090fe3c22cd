use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{CheckpointStore, RunSummary, StorageError};
use crate::workflow::Checkpoint;

/// Process-local store, for tests and one-shot runs that never resume.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    runs: Mutex<HashMap<String, Checkpoint>>,
    current: Mutex<Option<String>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn runs(&self) -> MutexGuard<'_, HashMap<String, Checkpoint>> {
        self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn current(&self) -> MutexGuard<'_, Option<String>> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn save(&self, checkpoint: &Checkpoint) -> Result<(), StorageError> {
        self.runs()
            .insert(checkpoint.run_id().to_string(), checkpoint.clone());
        Ok(())
    }

    fn load(&self, run_id: &str) -> Result<Checkpoint, StorageError> {
        self.runs()
            .get(run_id)
            .cloned()
            .ok_or_else(|| StorageError::RunNotFound(run_id.to_string()))
    }

    fn list(&self) -> Result<Vec<RunSummary>, StorageError> {
        let mut summaries: Vec<RunSummary> = self.runs().values().map(RunSummary::from).collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    fn delete(&self, run_id: &str) -> Result<(), StorageError> {
        if self.runs().remove(run_id).is_none() {
            return Err(StorageError::RunNotFound(run_id.to_string()));
        }
        let mut current = self.current();
        if current.as_deref() == Some(run_id) {
            *current = None;
        }
        Ok(())
    }

    fn current_run_id(&self) -> Result<Option<String>, StorageError> {
        Ok(self.current().clone())
    }

    fn set_current_run_id(&self, run_id: Option<&str>) -> Result<(), StorageError> {
        *self.current() = run_id.map(str::to_string);
        Ok(())
    }
}
