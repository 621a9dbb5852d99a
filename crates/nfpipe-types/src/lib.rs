//! Shared types and errors for the nfpipe workflow generator.
//!
//! This crate provides the foundational types used across all other nfpipe crates:
//! - `NfpipeError`: unified error taxonomy
//! - `RunStatus`: lifecycle status of a conversion/run
//! - `RunMetadata`: serializable `run.json` checkpoint written next to the output

use serde::{Deserialize, Serialize};

/// Unified error type for all nfpipe subsystems.
#[derive(Debug, thiserror::Error)]
pub enum NfpipeError {
    // === Graph structure errors ===
    #[error("Cyclic pipeline graph: node '{node_id}' is its own upstream ({path})")]
    CyclicGraph { node_id: String, path: String },

    #[error("Node '{node_id}' links to non-existent node '{missing_id}'")]
    DanglingReference { node_id: String, missing_id: String },

    #[error("Unsupported node '{node_name}' ({node_id}): {detail}")]
    UnsupportedNodeKind {
        node_id: String,
        node_name: String,
        detail: String,
    },

    #[error(
        "Ambiguous binding for '{filename}' on node '{node_name}' ({node_id}): produced by {}",
        candidates.join(", ")
    )]
    AmbiguousBinding {
        node_id: String,
        node_name: String,
        filename: String,
        candidates: Vec<String>,
    },

    #[error("Node '{node_id}' is missing required field '{field}'")]
    MissingField { node_id: String, field: String },

    // === Collaborator errors ===
    #[error("Environment does not exist: {path}")]
    EnvironmentNotFound { path: String },

    #[error("Unsupported kernel language '{language}'")]
    UnsupportedLanguage { language: String },

    #[error("Provisioning command `{command}` failed: {message}")]
    Provisioning { command: String, message: String },

    // === Input/output errors ===
    #[error("Invalid pipeline document: {0}")]
    Document(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Output directory already exists: {0}")]
    OutputExists(String),

    #[error("Pipeline validation failed: {0}")]
    Validation(String),

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl NfpipeError {
    /// Returns `true` for errors caused by the shape of the input graph.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            NfpipeError::CyclicGraph { .. }
                | NfpipeError::DanglingReference { .. }
                | NfpipeError::UnsupportedNodeKind { .. }
                | NfpipeError::AmbiguousBinding { .. }
        )
    }

    /// Returns `true` for errors surfaced by the runtime provisioning collaborators.
    pub fn is_provisioning(&self) -> bool {
        matches!(
            self,
            NfpipeError::EnvironmentNotFound { .. }
                | NfpipeError::UnsupportedLanguage { .. }
                | NfpipeError::Provisioning { .. }
        )
    }

    /// The graph node this error is attached to, if any.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            NfpipeError::CyclicGraph { node_id, .. }
            | NfpipeError::DanglingReference { node_id, .. }
            | NfpipeError::UnsupportedNodeKind { node_id, .. }
            | NfpipeError::AmbiguousBinding { node_id, .. }
            | NfpipeError::MissingField { node_id, .. } => Some(node_id),
            _ => None,
        }
    }
}

/// A convenience alias for `Result<T, NfpipeError>`.
pub type Result<T> = std::result::Result<T, NfpipeError>;

// ---------------------------------------------------------------------------
// RunStatus: lifecycle of a conversion run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Prepare,
    PrepareSuccess,
    PrepareFailure,
    Running,
    RunSuccess,
    RunError,
}

impl RunStatus {
    /// Whether no further transition is expected from this status.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            RunStatus::PrepareFailure | RunStatus::RunSuccess | RunStatus::RunError
        )
    }
}

// ---------------------------------------------------------------------------
// RunMetadata: the run.json checkpoint
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub start_time: String,
    pub server_time: String,
    pub status: RunStatus,
    pub error_message: String,
    pub log_message: String,
}

impl RunMetadata {
    /// Start a new run in the `prepare` state.
    pub fn new(run_id: impl Into<String>) -> Self {
        let started = now();
        Self {
            run_id: run_id.into(),
            start_time: started.clone(),
            server_time: started,
            status: RunStatus::Prepare,
            error_message: String::new(),
            log_message: String::new(),
        }
    }

    /// Move to `status`, refreshing `server_time`.
    pub fn transition(&mut self, status: RunStatus) {
        self.status = status;
        self.server_time = now();
    }

    /// Move to a failure status and record the reason.
    pub fn fail(&mut self, status: RunStatus, message: impl Into<String>) {
        self.transition(status);
        self.error_message = message.into();
    }
}

/// Local wall-clock time in the `dd/mm/YYYY HH:MM:SS` format used in run files.
pub fn now() -> String {
    chrono::Local::now().format("%d/%m/%Y %H:%M:%S").to_string()
}
