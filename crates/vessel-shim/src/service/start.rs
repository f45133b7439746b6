//! Start: decide between sandbox start and container start.

use super::Service;
use crate::error::{Result, ShimError};
use crate::types::{StartRequest, StartResponse};
use vessel_vm::annotations::CONTAINER_TYPE_KEY;
use vessel_vm::ContainerType;

impl Service {
    /// Start a container, or an exec session when `exec_id` is set.
    ///
    /// The engine's status report decides what is started: the container
    /// type it recorded at create time must be present and recognized.
    pub async fn start(&self, req: StartRequest) -> Result<StartResponse> {
        if let Some(exec_id) = req.exec_id.as_deref() {
            return self.start_exec(&req.id, exec_id).await;
        }

        let id = req.id.as_str();
        let container = self.registry.get(id).await?;
        let sandbox = self.active_sandbox(&container.sandbox_id).await?;
        let status = sandbox
            .status_container(id)
            .await
            .map_err(ShimError::engine("status_container", id))?;

        let container_type = match status.container_type_annotation() {
            None => return Err(ShimError::MissingContainerType(id.to_string())),
            Some(value) => value.parse::<ContainerType>().map_err(|_| {
                ShimError::InvalidContainerType {
                    key: CONTAINER_TYPE_KEY.to_string(),
                    value: value.to_string(),
                }
            })?,
        };

        if container_type.is_sandbox() {
            tracing::info!(sandbox_id = %id, "Starting sandbox");
            sandbox
                .start()
                .await
                .map_err(ShimError::engine("start_sandbox", id))?;
        } else {
            tracing::info!(container_id = %id, "Starting container");
            sandbox
                .start_container(id)
                .await
                .map_err(ShimError::engine("start_container", id))?;
        }

        container.handle.set_running(status.pid).await;
        self.watch_exit(sandbox, id, id, container.handle.clone());

        let pid = container.handle.snapshot().await.pid;
        tracing::info!(container_id = %id, pid, "Container started");
        Ok(StartResponse { pid })
    }
}
