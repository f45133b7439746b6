//! Delete: reverse everything create did.
//!
//! Status, stop, engine delete and mapping removal are fatal on error.
//! Rootfs unmount and device release only log.

use super::{reap_execs, Service, KILLED_EXIT_CODE};
use crate::container::Container;
use crate::error::{Result, ShimError};
use crate::mount;
use crate::types::{DeleteRequest, DeleteResponse};
use std::sync::Arc;
use vessel_vm::{Sandbox, State};

impl Service {
    /// Delete a container, or an exec session when `exec_id` is set.
    pub async fn delete(&self, req: DeleteRequest) -> Result<DeleteResponse> {
        if let Some(exec_id) = req.exec_id.as_deref() {
            return self.delete_exec(&req.id, exec_id).await;
        }

        let container = self.registry.get(&req.id).await?;
        if container.is_sandbox() {
            self.delete_sandbox(&container).await?;
        } else {
            self.delete_container(&container).await?;
        }

        let snapshot = container.handle.snapshot().await;
        Ok(DeleteResponse {
            pid: snapshot.pid,
            exit_status: snapshot.exit.map_or(0, |exit| exit.exit_code),
            exited_at: snapshot.exit.map(|exit| exit.exited_at),
        })
    }

    async fn delete_container(&self, container: &Container) -> Result<()> {
        let id = container.id.as_str();
        let sandbox = self.active_sandbox(&container.sandbox_id).await?;

        let status = sandbox
            .status_container(id)
            .await
            .map_err(ShimError::engine("status_container", id))?;
        if status.state == State::Running {
            tracing::debug!(container_id = %id, "Stopping running container");
            sandbox
                .stop_container(id)
                .await
                .map_err(ShimError::engine("stop_container", id))?;
            container.handle.record_exit(KILLED_EXIT_CODE).await;
        }

        sandbox
            .delete_container(id)
            .await
            .map_err(ShimError::engine("delete_container", id))?;

        self.finish_delete(container, &sandbox).await?;
        tracing::info!(container_id = %id, "Container deleted");
        Ok(())
    }

    async fn delete_sandbox(&self, container: &Container) -> Result<()> {
        let id = container.id.as_str();
        let sandbox = self.registry.begin_sandbox_delete(id).await?;
        if let Err(e) = self.teardown_sandbox(container, &sandbox).await {
            self.registry.abort_sandbox_delete().await;
            return Err(e);
        }
        tracing::info!(sandbox_id = %id, "Sandbox deleted");
        Ok(())
    }

    async fn teardown_sandbox(&self, container: &Container, sandbox: &Arc<dyn Sandbox>) -> Result<()> {
        let id = container.id.as_str();
        let status = sandbox
            .status()
            .await
            .map_err(ShimError::engine("status_sandbox", id))?;
        if status.state == State::Running {
            tracing::debug!(sandbox_id = %id, "Stopping running sandbox");
            sandbox
                .stop()
                .await
                .map_err(ShimError::engine("stop_sandbox", id))?;
            container.handle.record_exit(KILLED_EXIT_CODE).await;
        }

        sandbox
            .delete()
            .await
            .map_err(ShimError::engine("delete_sandbox", id))?;

        self.finish_delete(container, sandbox).await
    }

    /// Local cleanup once the engine no longer knows the container.
    async fn finish_delete(&self, container: &Container, sandbox: &Arc<dyn Sandbox>) -> Result<()> {
        let id = container.id.as_str();

        if let Err(e) = mount::unmount_all(&container.rootfs) {
            tracing::warn!(
                container_id = %id,
                rootfs = %container.rootfs.display(),
                error = %e,
                "Failed to unmount rootfs"
            );
        }

        self.mappings
            .delete(id)
            .await
            .map_err(ShimError::mapping("delete", id))?;

        if container.is_sandbox() {
            self.registry.remove_sandbox(id).await;
        } else {
            self.registry.remove(id).await;
        }

        // Nothing will report these exits any more.
        container.handle.record_exit(0).await;
        reap_execs(container).await;

        self.release_devices(id, sandbox).await;
        Ok(())
    }
}
