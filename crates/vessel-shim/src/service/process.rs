//! Exec sessions and process control.

use super::Service;
use crate::container::{Container, Exec, ProcessHandle, ProcessIo};
use crate::error::{Result, ShimError};
use crate::types::{
    DeleteResponse, ExecRequest, KillRequest, StartResponse, StateRequest, StateResponse,
    WaitRequest, WaitResponse,
};
use oci_spec::runtime::Process;
use std::sync::Arc;
use vessel_vm::{ExecProcess, State};

impl Service {
    /// Register an exec session. The process runs on a later `start`.
    pub async fn exec(&self, req: ExecRequest) -> Result<()> {
        let container = self.registry.get(&req.id).await?;
        let spec: Process = serde_json::from_str(&req.spec)?;

        let process = ExecProcess {
            args: spec.args().clone().unwrap_or_default(),
            env: spec.env().clone().unwrap_or_default(),
            cwd: spec.cwd().to_string_lossy().into_owned(),
            terminal: req.terminal || spec.terminal().unwrap_or(false),
        };
        let io = ProcessIo {
            stdin: req.stdin,
            stdout: req.stdout,
            stderr: req.stderr,
            terminal: process.terminal,
        };
        container
            .add_exec(Arc::new(Exec::new(&req.exec_id, &req.id, process, io)))
            .await?;

        tracing::info!(container_id = %req.id, exec_id = %req.exec_id, "Exec registered");
        Ok(())
    }

    pub(super) async fn start_exec(&self, id: &str, exec_id: &str) -> Result<StartResponse> {
        let container = self.registry.get(id).await?;
        let exec = container.exec(exec_id).await?;
        let sandbox = self.active_sandbox(&container.sandbox_id).await?;

        let pid = sandbox
            .enter_container(id, exec_id, exec.process.clone())
            .await
            .map_err(ShimError::engine("enter_container", id))?;
        exec.handle.set_running(pid).await;
        self.registry.track_pid(pid, id).await;
        self.watch_exit(sandbox, id, exec_id, exec.handle.clone());

        tracing::info!(container_id = %id, exec_id, pid, "Exec started");
        Ok(StartResponse { pid })
    }

    pub(super) async fn delete_exec(&self, id: &str, exec_id: &str) -> Result<DeleteResponse> {
        let container = self.registry.get(id).await?;
        let exec = container.remove_exec(exec_id).await?;
        let snapshot = exec.handle.snapshot().await;
        if snapshot.pid != 0 {
            self.registry.untrack_pid(snapshot.pid).await;
        }

        tracing::info!(container_id = %id, exec_id, "Exec deleted");
        Ok(DeleteResponse {
            pid: snapshot.pid,
            exit_status: snapshot.exit.map_or(0, |exit| exit.exit_code),
            exited_at: snapshot.exit.map(|exit| exit.exited_at),
        })
    }

    /// Current state of a container or exec session.
    pub async fn state(&self, req: StateRequest) -> Result<StateResponse> {
        let container = self.registry.get(&req.id).await?;
        let (io, handle) = process_of(&container, req.exec_id.as_deref()).await?;
        let snapshot = handle.snapshot().await;

        Ok(StateResponse {
            id: req.id,
            exec_id: req.exec_id,
            bundle: container.bundle.clone(),
            pid: snapshot.pid,
            status: snapshot.state,
            stdin: io.stdin,
            stdout: io.stdout,
            stderr: io.stderr,
            terminal: io.terminal,
            exit_status: snapshot.exit.map(|exit| exit.exit_code),
            exited_at: snapshot.exit.map(|exit| exit.exited_at),
        })
    }

    /// Signal a container's init process or one of its exec sessions.
    pub async fn kill(&self, req: KillRequest) -> Result<()> {
        let id = req.id.as_str();
        let container = self.registry.get(id).await?;
        let process_id = match req.exec_id.as_deref() {
            Some(exec_id) => container.exec(exec_id).await?.id.clone(),
            None => id.to_string(),
        };
        let sandbox = self.active_sandbox(&container.sandbox_id).await?;

        tracing::debug!(container_id = %id, process_id = %process_id, signal = req.signal, "Signalling process");
        sandbox
            .signal_process(id, &process_id, req.signal)
            .await
            .map_err(ShimError::engine("signal_process", id))?;

        if req.all && req.exec_id.is_none() {
            for exec in container.execs().await {
                if exec.handle.snapshot().await.state != State::Running {
                    continue;
                }
                if let Err(e) = sandbox.signal_process(id, &exec.id, req.signal).await {
                    tracing::warn!(container_id = %id, exec_id = %exec.id, error = %e, "Failed to signal exec");
                }
            }
        }
        Ok(())
    }

    /// Wait for a container's init process or an exec session to exit.
    pub async fn wait(&self, req: WaitRequest) -> Result<WaitResponse> {
        let container = self.registry.get(&req.id).await?;
        let (_, handle) = process_of(&container, req.exec_id.as_deref()).await?;
        let exit = handle.wait().await;
        Ok(WaitResponse {
            exit_status: exit.exit_code,
            exited_at: exit.exited_at,
        })
    }
}

async fn process_of(
    container: &Container,
    exec_id: Option<&str>,
) -> Result<(ProcessIo, Arc<ProcessHandle>)> {
    match exec_id {
        Some(exec_id) => {
            let exec = container.exec(exec_id).await?;
            Ok((exec.io.clone(), exec.handle.clone()))
        }
        None => Ok((container.io.clone(), container.handle.clone())),
    }
}
