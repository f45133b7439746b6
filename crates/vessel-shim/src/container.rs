//! Container and exec session records.
//!
//! Each record guards its own mutable fields, so work on one container never
//! waits on another.

use crate::error::{Result, ShimError};
use crate::exit::ExitSignal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use vessel_vm::{ContainerType, ExecProcess, State};

/// Stdio paths and terminal flag of a process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessIo {
    /// stdin FIFO path
    pub stdin: String,
    /// stdout FIFO path
    pub stdout: String,
    /// stderr FIFO path
    pub stderr: String,
    /// Whether the process has a terminal
    pub terminal: bool,
}

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitInfo {
    /// Exit code
    pub exit_code: u32,
    /// When the exit was recorded
    pub exited_at: DateTime<Utc>,
}

/// Point-in-time view of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessSnapshot {
    /// Host pid (0 before start)
    pub pid: u32,
    /// Lifecycle state
    pub state: State,
    /// Exit, once recorded
    pub exit: Option<ExitInfo>,
}

/// Lifecycle of a single process: pid, state, exit and the exit signal.
#[derive(Debug)]
pub struct ProcessHandle {
    state: Mutex<ProcessSnapshot>,
    exited: ExitSignal,
}

impl ProcessHandle {
    /// Process in `state` with host pid `pid`.
    pub fn new(pid: u32, state: State) -> Self {
        Self {
            state: Mutex::new(ProcessSnapshot {
                pid,
                state,
                exit: None,
            }),
            exited: ExitSignal::new(),
        }
    }

    /// Current pid, state and exit.
    pub async fn snapshot(&self) -> ProcessSnapshot {
        *self.state.lock().await
    }

    /// Mark the process running. A zero `pid` keeps the current one.
    pub async fn set_running(&self, pid: u32) {
        let mut state = self.state.lock().await;
        if pid != 0 {
            state.pid = pid;
        }
        state.state = State::Running;
    }

    /// Record the exit and fire the exit signal. The first call wins; later
    /// calls return false and change nothing.
    pub async fn record_exit(&self, exit_code: u32) -> bool {
        let mut state = self.state.lock().await;
        if state.exit.is_some() {
            return false;
        }
        state.state = State::Stopped;
        state.exit = Some(ExitInfo {
            exit_code,
            exited_at: Utc::now(),
        });
        drop(state);
        self.exited.signal()
    }

    /// Wait for the exit and return it.
    pub async fn wait(&self) -> ExitInfo {
        loop {
            self.exited.wait().await;
            if let Some(exit) = self.state.lock().await.exit {
                return exit;
            }
        }
    }
}

/// A secondary process inside a container.
#[derive(Debug)]
pub struct Exec {
    /// Exec session identifier
    pub id: String,
    /// Owning container
    pub container_id: String,
    /// Process to launch
    pub process: ExecProcess,
    /// Stdio wiring
    pub io: ProcessIo,
    /// Process lifecycle
    pub handle: Arc<ProcessHandle>,
}

impl Exec {
    pub fn new(id: &str, container_id: &str, process: ExecProcess, io: ProcessIo) -> Self {
        Self {
            id: id.to_string(),
            container_id: container_id.to_string(),
            process,
            io,
            handle: Arc::new(ProcessHandle::new(0, State::Created)),
        }
    }
}

/// A container registered with this shim.
#[derive(Debug)]
pub struct Container {
    /// Container identifier
    pub id: String,
    /// Owning sandbox
    pub sandbox_id: String,
    /// Role inside the sandbox
    pub container_type: ContainerType,
    /// OCI bundle directory
    pub bundle: PathBuf,
    /// Rootfs mount point
    pub rootfs: PathBuf,
    /// Stdio wiring of the init process
    pub io: ProcessIo,
    /// Init process lifecycle
    pub handle: Arc<ProcessHandle>,
    execs: Mutex<HashMap<String, Arc<Exec>>>,
}

impl Container {
    pub fn new(
        id: &str,
        sandbox_id: &str,
        container_type: ContainerType,
        bundle: PathBuf,
        rootfs: PathBuf,
        io: ProcessIo,
        handle: ProcessHandle,
    ) -> Self {
        Self {
            id: id.to_string(),
            sandbox_id: sandbox_id.to_string(),
            container_type,
            bundle,
            rootfs,
            io,
            handle: Arc::new(handle),
            execs: Mutex::new(HashMap::new()),
        }
    }

    /// Whether this is the sandbox's root container.
    pub fn is_sandbox(&self) -> bool {
        self.container_type.is_sandbox()
    }

    /// Register an exec session. Exec IDs are unique per container.
    pub async fn add_exec(&self, exec: Arc<Exec>) -> Result<()> {
        let mut execs = self.execs.lock().await;
        if execs.contains_key(&exec.id) {
            return Err(ShimError::ExecExists {
                container_id: self.id.clone(),
                exec_id: exec.id.clone(),
            });
        }
        execs.insert(exec.id.clone(), exec);
        Ok(())
    }

    /// Look up an exec session.
    pub async fn exec(&self, exec_id: &str) -> Result<Arc<Exec>> {
        self.execs
            .lock()
            .await
            .get(exec_id)
            .cloned()
            .ok_or_else(|| self.exec_not_found(exec_id))
    }

    /// Remove an exec session.
    pub async fn remove_exec(&self, exec_id: &str) -> Result<Arc<Exec>> {
        self.execs
            .lock()
            .await
            .remove(exec_id)
            .ok_or_else(|| self.exec_not_found(exec_id))
    }

    /// Every registered exec session.
    pub async fn execs(&self) -> Vec<Arc<Exec>> {
        self.execs.lock().await.values().cloned().collect()
    }

    fn exec_not_found(&self, exec_id: &str) -> ShimError {
        ShimError::ExecNotFound {
            container_id: self.id.clone(),
            exec_id: exec_id.to_string(),
        }
    }
}
