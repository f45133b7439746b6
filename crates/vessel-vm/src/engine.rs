//! Hypervisor-backed engine contract.
//!
//! The shim never drives a hypervisor directly. It talks to an implementation
//! of [`SandboxEngine`], which creates sandboxes, and to the [`Sandbox`]
//! handles it returns, which run containers and accept devices.

use crate::config::{ContainerConfig, SandboxConfig};
use crate::device::DeviceReceiver;
use crate::error::Result;
use crate::status::{ContainerStatus, ExecProcess, SandboxStatus};
use async_trait::async_trait;
use std::sync::Arc;

/// Creates sandboxes and reconnects to existing ones.
#[async_trait]
pub trait SandboxEngine: Send + Sync {
    /// Create (but do not start) a sandbox together with its root container.
    async fn create_sandbox(&self, config: SandboxConfig) -> Result<Arc<dyn Sandbox>>;

    /// Reconnect to a sandbox created by an earlier shim process.
    async fn fetch_sandbox(&self, sandbox_id: &str) -> Result<Arc<dyn Sandbox>>;
}

/// Handle to one sandbox.
///
/// Implementations do their own locking; every method takes `&self`.
#[async_trait]
pub trait Sandbox: DeviceReceiver {
    /// Sandbox identifier.
    fn id(&self) -> &str;

    /// Host pid of the process backing the sandbox (the VMM).
    fn pid(&self) -> u32;

    /// This sandbox as the receiver its devices are attached through.
    fn as_device_receiver(&self) -> &dyn DeviceReceiver;

    /// Boot the sandbox and its root container.
    async fn start(&self) -> Result<()>;

    /// Stop every container and shut the VM down.
    async fn stop(&self) -> Result<()>;

    /// Release all sandbox resources. The sandbox must be stopped.
    async fn delete(&self) -> Result<()>;

    /// Sandbox state and its members.
    async fn status(&self) -> Result<SandboxStatus>;

    /// Create a member container and return its host pid.
    async fn create_container(&self, config: ContainerConfig) -> Result<u32>;

    /// Start a created member container.
    async fn start_container(&self, container_id: &str) -> Result<()>;

    /// Stop a running container.
    async fn stop_container(&self, container_id: &str) -> Result<()>;

    /// Remove a stopped or created container.
    async fn delete_container(&self, container_id: &str) -> Result<()>;

    /// Engine view of a container.
    async fn status_container(&self, container_id: &str) -> Result<ContainerStatus>;

    /// Launch `process` inside a running container and return its host pid.
    async fn enter_container(
        &self,
        container_id: &str,
        process_id: &str,
        process: ExecProcess,
    ) -> Result<u32>;

    /// Deliver `signal` to a process. The container's init process uses the
    /// container ID as its process ID.
    async fn signal_process(&self, container_id: &str, process_id: &str, signal: u32)
        -> Result<()>;

    /// Block until a process exits and return its exit code.
    async fn wait_process(&self, container_id: &str, process_id: &str) -> Result<u32>;
}
