//! Dataset files on disk.
//!
//! Every write goes to a hidden sibling temp file first and is then renamed
//! over the target, so readers see either the previous file or the new one.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use contractscope_shared::{AnalysisRecord, ContractScopeError, Result};

/// Whole-file checkpoint of the analysis dataset.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the file with `records`.
    pub fn persist(&self, records: &[AnalysisRecord]) -> Result<()> {
        write_json(&self.path, records)
    }

    /// Read the dataset back.
    pub fn load(&self) -> Result<Vec<AnalysisRecord>> {
        read_json(&self.path)
    }
}

/// Write `data` as pretty JSON, atomically.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).map_err(|e| {
        ContractScopeError::validation(format!("JSON serialization failed: {e}"))
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ContractScopeError::io(parent, e))?;
    }

    let temp = temp_path(path);
    std::fs::write(&temp, json).map_err(|e| ContractScopeError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| ContractScopeError::io(path, e))?;

    debug!(path = %path.display(), "wrote JSON file");
    Ok(())
}

/// Read and deserialize a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| ContractScopeError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| {
        ContractScopeError::validation(format!("invalid JSON in {}: {e}", path.display()))
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}
