//! Rebuild the registry after a shim restart.

use super::Service;
use crate::bundle::Bundle;
use crate::container::{Container, ProcessHandle, ProcessIo};
use crate::error::{Result, ShimError};
use std::sync::Arc;
use vessel_vm::{ContainerStatus, ContainerType, Sandbox, State};

impl Service {
    /// Re-register the sandbox `sandbox_id` and its containers from the
    /// identity mappings and the engine's status reports.
    ///
    /// Mappings the engine no longer knows are dropped. Returns the number
    /// of containers registered, root container included.
    pub async fn recover(&self, sandbox_id: &str) -> Result<usize> {
        if let Some(existing) = self.registry.sandbox().await {
            return Err(ShimError::SandboxExists(existing.id().to_string()));
        }

        let owned: Vec<String> = self
            .mappings
            .entries()
            .await
            .map_err(ShimError::mapping("entries", sandbox_id))?
            .into_iter()
            .filter(|(_, owner)| owner == sandbox_id)
            .map(|(container_id, _)| container_id)
            .collect();
        if !owned.iter().any(|id| id == sandbox_id) {
            return Err(ShimError::SandboxNotCreated(sandbox_id.to_string()));
        }

        let sandbox = self
            .engine
            .fetch_sandbox(sandbox_id)
            .await
            .map_err(ShimError::engine("fetch_sandbox", sandbox_id))?;
        let status = sandbox
            .status_container(sandbox_id)
            .await
            .map_err(ShimError::engine("status_container", sandbox_id))?;
        let pid = status.pid;
        let root = self.restore(&sandbox, sandbox_id, status);
        self.registry
            .insert_sandbox(sandbox.clone(), root, pid)
            .await?;

        let mut recovered = 1;
        for id in owned.iter().filter(|id| *id != sandbox_id) {
            match sandbox.status_container(id).await {
                Ok(status) => {
                    let pid = status.pid;
                    let container = self.restore(&sandbox, sandbox_id, status);
                    self.registry.insert(container, pid).await?;
                    recovered += 1;
                }
                Err(e) if e.is_not_found() => {
                    tracing::warn!(container_id = %id, sandbox_id, "Dropping stale mapping");
                    self.mappings
                        .delete(id)
                        .await
                        .map_err(ShimError::mapping("delete", id))?;
                }
                Err(e) => return Err(ShimError::engine("status_container", id)(e)),
            }
        }

        tracing::info!(sandbox_id, containers = recovered, "Sandbox recovered");
        Ok(recovered)
    }

    fn restore(
        &self,
        sandbox: &Arc<dyn Sandbox>,
        sandbox_id: &str,
        status: ContainerStatus,
    ) -> Arc<Container> {
        let container_type = status.container_type().unwrap_or(if status.id == sandbox_id {
            ContainerType::PodSandbox
        } else {
            ContainerType::PodContainer
        });
        let rootfs = Bundle::load(&status.bundle)
            .map(|bundle| bundle.rootfs())
            .unwrap_or_else(|_| status.bundle.join("rootfs"));

        let container = Arc::new(Container::new(
            &status.id,
            sandbox_id,
            container_type,
            status.bundle.clone(),
            rootfs,
            ProcessIo::default(),
            ProcessHandle::new(status.pid, status.state),
        ));
        if status.state != State::Created {
            self.watch_exit(
                sandbox.clone(),
                &status.id,
                &status.id,
                container.handle.clone(),
            );
        }
        container
    }
}
