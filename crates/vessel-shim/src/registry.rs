//! Process-wide registry of containers, host pids and the sandbox handle.
//!
//! Both maps live behind one lock so a container and its pids are always
//! added or removed together. The lock is never held across an engine call.
//!
//! Member containers are only accepted while their sandbox is registered and
//! not being deleted, so a sandbox delete can never strand a member.

use crate::container::Container;
use crate::error::{Result, ShimError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use vessel_vm::Sandbox;

#[derive(Default)]
struct RegistryState {
    containers: HashMap<String, Arc<Container>>,
    processes: HashMap<u32, String>,
    sandbox: Option<Arc<dyn Sandbox>>,
    deleting: bool,
}

impl RegistryState {
    fn members(&self, sandbox_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .containers
            .values()
            .filter(|c| c.sandbox_id == sandbox_id && c.id != sandbox_id)
            .map(|c| c.id.clone())
            .collect();
        ids.sort();
        ids
    }
}

/// Containers, pids and the active sandbox of this shim.
#[derive(Default)]
pub struct Registry {
    state: Mutex<RegistryState>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").finish_non_exhaustive()
    }
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Active sandbox handle.
    pub async fn sandbox(&self) -> Option<Arc<dyn Sandbox>> {
        self.state.lock().await.sandbox.clone()
    }

    /// Register a new sandbox together with its root container.
    pub async fn insert_sandbox(
        &self,
        sandbox: Arc<dyn Sandbox>,
        container: Arc<Container>,
        pid: u32,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(existing) = &state.sandbox {
            return Err(ShimError::SandboxExists(existing.id().to_string()));
        }
        if state.containers.contains_key(&container.id) {
            return Err(ShimError::IdInUse(container.id.clone()));
        }
        state.sandbox = Some(sandbox);
        state.processes.insert(pid, container.id.clone());
        state.containers.insert(container.id.clone(), container);
        Ok(())
    }

    /// Register a member container.
    ///
    /// Fails with `SandboxNotCreated` unless the container's sandbox is the
    /// registered one and no delete of it is under way.
    pub async fn insert(&self, container: Arc<Container>, pid: u32) -> Result<()> {
        let mut state = self.state.lock().await;
        let accepting = !state.deleting
            && state
                .sandbox
                .as_ref()
                .is_some_and(|sandbox| sandbox.id() == container.sandbox_id);
        if !accepting {
            return Err(ShimError::SandboxNotCreated(container.sandbox_id.clone()));
        }
        if state.containers.contains_key(&container.id) {
            return Err(ShimError::IdInUse(container.id.clone()));
        }
        state.processes.insert(pid, container.id.clone());
        state.containers.insert(container.id.clone(), container);
        Ok(())
    }

    /// Look up a container.
    pub async fn get(&self, container_id: &str) -> Result<Arc<Container>> {
        self.state
            .lock()
            .await
            .containers
            .get(container_id)
            .cloned()
            .ok_or_else(|| ShimError::ContainerNotFound(container_id.to_string()))
    }

    /// Whether `container_id` is registered.
    pub async fn contains(&self, container_id: &str) -> bool {
        self.state.lock().await.containers.contains_key(container_id)
    }

    /// Remove a container and every pid that maps to it.
    pub async fn remove(&self, container_id: &str) -> Option<Arc<Container>> {
        let mut state = self.state.lock().await;
        let container = state.containers.remove(container_id)?;
        state.processes.retain(|_, id| id != container_id);
        Some(container)
    }

    /// Claim the sandbox for deletion.
    ///
    /// Fails with `SandboxInUse` while members are registered. Until
    /// [`Registry::remove_sandbox`] or [`Registry::abort_sandbox_delete`],
    /// member inserts are refused.
    pub async fn begin_sandbox_delete(&self, sandbox_id: &str) -> Result<Arc<dyn Sandbox>> {
        let mut state = self.state.lock().await;
        let sandbox = state
            .sandbox
            .clone()
            .filter(|sandbox| sandbox.id() == sandbox_id)
            .ok_or_else(|| ShimError::SandboxNotCreated(sandbox_id.to_string()))?;
        let members = state.members(sandbox_id);
        if !members.is_empty() {
            return Err(ShimError::SandboxInUse {
                sandbox_id: sandbox_id.to_string(),
                members: members.len(),
            });
        }
        state.deleting = true;
        Ok(sandbox)
    }

    /// Accept member inserts again after a failed sandbox delete.
    pub async fn abort_sandbox_delete(&self) {
        self.state.lock().await.deleting = false;
    }

    /// Remove the sandbox's root container and clear the sandbox handle.
    pub async fn remove_sandbox(&self, sandbox_id: &str) -> Option<Arc<dyn Sandbox>> {
        let mut state = self.state.lock().await;
        state.containers.remove(sandbox_id);
        state.processes.retain(|_, id| id != sandbox_id);
        state.deleting = false;
        state.sandbox.take()
    }

    /// Map an exec session's host pid to its container.
    pub async fn track_pid(&self, pid: u32, container_id: &str) {
        self.state
            .lock()
            .await
            .processes
            .insert(pid, container_id.to_string());
    }

    /// Forget a host pid.
    pub async fn untrack_pid(&self, pid: u32) {
        self.state.lock().await.processes.remove(&pid);
    }

    /// Container owning host pid `pid`.
    pub async fn container_for_pid(&self, pid: u32) -> Option<String> {
        self.state.lock().await.processes.get(&pid).cloned()
    }

    /// IDs of registered containers other than the sandbox's own.
    pub async fn members(&self, sandbox_id: &str) -> Vec<String> {
        self.state.lock().await.members(sandbox_id)
    }

    /// Number of registered containers.
    pub async fn len(&self) -> usize {
        self.state.lock().await.containers.len()
    }

    /// Whether no container is registered.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of tracked host pids.
    pub async fn pid_count(&self) -> usize {
        self.state.lock().await.processes.len()
    }
}
