//! Run bookkeeping for the run-config driven flow.
//!
//! Every run writes its [`RunMetadata`] to `<output>/run.json` at each status
//! transition, and is registered once in the per-user run registry at
//! `<home>/.ppdb/db.json`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use nfpipe_types::{NfpipeError, Result, RunMetadata};

use crate::naming::resolve_home_relative;

/// File name of the run checkpoint inside the output directory.
pub const RUN_FILE: &str = "run.json";

/// Location of the run registry relative to the home directory.
pub const REGISTRY_PATH: &str = ".ppdb/db.json";

/// Save a run checkpoint to `<output_dir>/run.json`.
///
/// The directory is created if it does not already exist.
pub async fn save_checkpoint(metadata: &RunMetadata, output_dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(output_dir).await?;
    let path = output_dir.join(RUN_FILE);
    let json = serde_json::to_string_pretty(metadata)?;
    tokio::fs::write(&path, json).await?;
    if metadata.status.is_final() {
        tracing::info!(run_id = %metadata.run_id, status = ?metadata.status, path = %path.display(), "Run finished");
    } else {
        tracing::debug!(path = %path.display(), status = ?metadata.status, "Checkpoint saved");
    }
    Ok(path)
}

/// Load the run checkpoint from a directory, `None` if there is none yet.
pub async fn load_checkpoint(output_dir: &Path) -> Result<Option<RunMetadata>> {
    let path = output_dir.join(RUN_FILE);
    if !tokio::fs::try_exists(&path).await? {
        return Ok(None);
    }
    let json = tokio::fs::read_to_string(&path).await?;
    Ok(Some(serde_json::from_str(&json)?))
}

/// A run request as submitted by the pipeline editor.
///
/// Keys beyond the known ones are kept so the registry stores the request
/// exactly as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub run_id: String,
    /// Output directory, relative to the home directory unless absolute.
    pub working_dir: String,
    /// Pipeline document, relative to the home directory unless absolute.
    pub pipeline_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_rev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RunConfig {
    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        serde_json::from_str(&json).map_err(|e| {
            NfpipeError::Document(format!("run config {}: {e}", path.display()))
        })
    }

    pub fn output_dir(&self, home: &Path) -> PathBuf {
        resolve_home_relative(&self.working_dir, home)
    }

    pub fn pipeline_file(&self, home: &Path) -> PathBuf {
        resolve_home_relative(&self.pipeline_path, home)
    }
}

/// The JSON list of every run ever submitted for a user.
#[derive(Debug, Clone)]
pub struct RunRegistry {
    path: PathBuf,
}

impl RunRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_home(home: &Path) -> Self {
        Self::new(home.join(REGISTRY_PATH))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every registered run. A missing or unreadable registry is empty.
    pub async fn entries(&self) -> Vec<serde_json::Value> {
        let json = match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_str(&json) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Run registry is not a JSON list; starting over");
                Vec::new()
            }
        }
    }

    /// Add `config` unless a run with the same id is already registered.
    /// Returns whether it was added.
    pub async fn register(&self, config: &RunConfig) -> Result<bool> {
        let mut entries = self.entries().await;
        let exists = entries
            .iter()
            .any(|e| e.get("run_id").and_then(|v| v.as_str()) == Some(config.run_id.as_str()));
        if exists {
            tracing::debug!(run_id = %config.run_id, "Run already registered");
            return Ok(false);
        }

        entries.push(serde_json::to_value(config)?);
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, serde_json::to_string_pretty(&entries)?).await?;
        tracing::info!(run_id = %config.run_id, registry = %self.path.display(), "Run registered");
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
