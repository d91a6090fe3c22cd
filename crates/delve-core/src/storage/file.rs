use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{StorageConfig, DEFAULT_CURRENT_FILE};
use crate::workflow::Checkpoint;

use super::error::StorageError;
use super::{CheckpointStore, RunSummary};

/// File-based checkpoint storage.
///
/// ```text
/// <data_dir>/
///   current                      # Most recent run id
///   runs/{run-id}/
///     checkpoint.json            # Last checkpoint of the run
/// ```
pub struct FileCheckpointStore {
    config: StorageConfig,
}

impl FileCheckpointStore {
    /// Creates a store rooted at the default data directory.
    pub fn new() -> Self {
        Self::with_config(StorageConfig::default())
    }

    /// Creates a store with custom configuration.
    pub fn with_config(config: StorageConfig) -> Self {
        Self { config }
    }

    fn base_path(&self) -> PathBuf {
        PathBuf::from(&self.config.data_dir)
    }

    /// Returns the path to a specific run's directory.
    fn run_dir(&self, run_id: &str) -> Result<PathBuf, StorageError> {
        validate_run_id(run_id)?;
        Ok(self.config.run_path(run_id))
    }

    /// Returns the path to a run's checkpoint file.
    fn checkpoint_file(&self, run_id: &str) -> Result<PathBuf, StorageError> {
        Ok(self.run_dir(run_id)?.join(&self.config.checkpoint_file))
    }

    fn current_file(&self) -> PathBuf {
        self.base_path().join(DEFAULT_CURRENT_FILE)
    }

    fn ensure_dir(dir: &Path) -> Result<(), StorageError> {
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))?;
        }
        Ok(())
    }
}

impl Default for FileCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Run ids become directory names; refuse anything that could escape `runs/`.
fn validate_run_id(run_id: &str) -> Result<(), StorageError> {
    let valid = !run_id.is_empty()
        && run_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidRunId(run_id.to_string()))
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn save(&self, checkpoint: &Checkpoint) -> Result<(), StorageError> {
        let dir = self.run_dir(checkpoint.run_id())?;
        Self::ensure_dir(&dir)?;

        let path = dir.join(&self.config.checkpoint_file);
        let json = serde_json::to_string_pretty(checkpoint)?;
        // Write-then-rename so a crash never leaves a torn checkpoint
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| StorageError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| StorageError::io(&path, e))?;

        Ok(())
    }

    fn load(&self, run_id: &str) -> Result<Checkpoint, StorageError> {
        let path = self.checkpoint_file(run_id)?;
        if !path.exists() {
            return Err(StorageError::RunNotFound(run_id.to_string()));
        }

        let json = fs::read_to_string(&path).map_err(|e| StorageError::io(&path, e))?;
        Ok(serde_json::from_str(&json)?)
    }

    fn list(&self) -> Result<Vec<RunSummary>, StorageError> {
        let runs_dir = self.config.runs_path();
        if !runs_dir.exists() {
            return Ok(Vec::new());
        }

        let mut summaries = Vec::new();
        let entries = fs::read_dir(&runs_dir).map_err(|e| StorageError::io(&runs_dir, e))?;

        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(&runs_dir, e))?;
            let path = entry.path();

            if path.is_dir() {
                if let Some(id) = path.file_name().and_then(|n| n.to_str()) {
                    match self.load(id) {
                        Ok(checkpoint) => summaries.push(RunSummary::from(&checkpoint)),
                        Err(_) => continue, // Skip unreadable runs
                    }
                }
            }
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        Ok(summaries)
    }

    fn delete(&self, run_id: &str) -> Result<(), StorageError> {
        let dir = self.run_dir(run_id)?;
        if !dir.exists() {
            return Err(StorageError::RunNotFound(run_id.to_string()));
        }

        fs::remove_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;

        if let Ok(Some(current_id)) = self.current_run_id() {
            if current_id == run_id {
                self.set_current_run_id(None)?;
            }
        }

        Ok(())
    }

    fn current_run_id(&self) -> Result<Option<String>, StorageError> {
        let path = self.current_file();
        if !path.exists() {
            return Ok(None);
        }

        let id = fs::read_to_string(&path)
            .map_err(|e| StorageError::io(&path, e))?
            .trim()
            .to_string();

        if id.is_empty() {
            Ok(None)
        } else {
            Ok(Some(id))
        }
    }

    fn set_current_run_id(&self, run_id: Option<&str>) -> Result<(), StorageError> {
        let path = self.current_file();
        if let Some(parent) = path.parent() {
            Self::ensure_dir(parent)?;
        }

        match run_id {
            Some(id) => {
                validate_run_id(id)?;
                fs::write(&path, id).map_err(|e| StorageError::io(&path, e))?;
            }
            None => {
                if path.exists() {
                    fs::remove_file(&path).map_err(|e| StorageError::io(&path, e))?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_validation() {
        assert!(validate_run_id("3f2a-11ee_x").is_ok());
        assert!(validate_run_id("../etc").is_err());
        assert!(validate_run_id("").is_err());
    }
}
