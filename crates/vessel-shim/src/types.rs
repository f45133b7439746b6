//! Task protocol requests and responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use vessel_vm::State;

// ============================================================================
// Lifecycle
// ============================================================================

/// Parameters for creating a sandbox or container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateRequest {
    /// Container identifier (the sandbox ID for a sandbox).
    pub id: String,
    /// OCI bundle directory.
    pub bundle: PathBuf,
    /// stdin FIFO path.
    #[serde(default)]
    pub stdin: String,
    /// stdout FIFO path.
    #[serde(default)]
    pub stdout: String,
    /// stderr FIFO path.
    #[serde(default)]
    pub stderr: String,
    /// Whether the init process gets a terminal.
    #[serde(default)]
    pub terminal: bool,
}

/// Result of a create.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResponse {
    /// Host pid of the new process.
    pub pid: u32,
}

/// Parameters for starting a container or exec session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartRequest {
    /// Container identifier.
    pub id: String,
    /// Exec session to start instead of the container.
    #[serde(default)]
    pub exec_id: Option<String>,
}

/// Result of a start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartResponse {
    /// Host pid of the started process.
    pub pid: u32,
}

/// Parameters for deleting a container or exec session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteRequest {
    /// Container identifier.
    pub id: String,
    /// Exec session to delete instead of the container.
    #[serde(default)]
    pub exec_id: Option<String>,
}

/// Result of a delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    /// Host pid the process had.
    pub pid: u32,
    /// Exit code (0 if the process never ran).
    pub exit_status: u32,
    /// When the process exited.
    pub exited_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Exec sessions
// ============================================================================

/// Parameters for registering an exec session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecRequest {
    /// Container identifier.
    pub id: String,
    /// New exec session identifier.
    pub exec_id: String,
    /// OCI runtime `process` object, JSON encoded.
    pub spec: String,
    /// stdin FIFO path.
    #[serde(default)]
    pub stdin: String,
    /// stdout FIFO path.
    #[serde(default)]
    pub stdout: String,
    /// stderr FIFO path.
    #[serde(default)]
    pub stderr: String,
    /// Whether the process gets a terminal.
    #[serde(default)]
    pub terminal: bool,
}

// ============================================================================
// Process control
// ============================================================================

/// Parameters for querying a container or exec session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateRequest {
    /// Container identifier.
    pub id: String,
    /// Exec session to query instead of the container.
    #[serde(default)]
    pub exec_id: Option<String>,
}

/// Current state of a container or exec session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateResponse {
    /// Container identifier.
    pub id: String,
    /// Exec session identifier, if the state is for one.
    pub exec_id: Option<String>,
    /// Bundle directory.
    pub bundle: PathBuf,
    /// Host pid.
    pub pid: u32,
    /// Lifecycle state.
    pub status: State,
    /// stdin FIFO path.
    pub stdin: String,
    /// stdout FIFO path.
    pub stdout: String,
    /// stderr FIFO path.
    pub stderr: String,
    /// Whether the process has a terminal.
    pub terminal: bool,
    /// Exit code, once exited.
    pub exit_status: Option<u32>,
    /// Exit time, once exited.
    pub exited_at: Option<DateTime<Utc>>,
}

/// Parameters for signalling a process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KillRequest {
    /// Container identifier.
    pub id: String,
    /// Exec session to signal instead of the init process.
    #[serde(default)]
    pub exec_id: Option<String>,
    /// Signal number.
    pub signal: u32,
    /// Also signal every exec session of the container.
    #[serde(default)]
    pub all: bool,
}

/// Parameters for waiting on a process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WaitRequest {
    /// Container identifier.
    pub id: String,
    /// Exec session to wait on instead of the init process.
    #[serde(default)]
    pub exec_id: Option<String>,
}

/// Result of a wait.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitResponse {
    /// Exit code.
    pub exit_status: u32,
    /// Exit time.
    pub exited_at: DateTime<Utc>,
}
