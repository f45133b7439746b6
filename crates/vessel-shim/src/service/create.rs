//! Create: classify the bundle, then build a sandbox or a member container.

use super::Service;
use crate::bundle::{validate_container_id, Bundle, Role};
use crate::container::{Container, ProcessHandle, ProcessIo};
use crate::devices::DeviceSpec;
use crate::error::{Result, ShimError};
use crate::types::{CreateRequest, CreateResponse};
use std::sync::Arc;
use vessel_vm::{ContainerType, Sandbox, State, VhostUserDeviceAttrs};

impl Service {
    /// Create a sandbox or a container inside the registered sandbox.
    ///
    /// Either every effect lands (engine object, mapping, registry record) or
    /// none does.
    pub async fn create(&self, req: CreateRequest) -> Result<CreateResponse> {
        validate_container_id(&req.id)?;
        let bundle = Bundle::load(&req.bundle)?;
        let role = bundle.role(&req.id)?;
        bundle.validate_resources()?;

        let io = ProcessIo {
            stdin: req.stdin,
            stdout: req.stdout,
            stderr: req.stderr,
            terminal: req.terminal,
        };
        let pid = match &role {
            Role::Sandbox => self.create_sandbox(&req.id, &bundle, io).await?,
            Role::Container { sandbox_id } => {
                self.create_container(&req.id, sandbox_id, &bundle, &role, io)
                    .await?
            }
        };
        Ok(CreateResponse { pid })
    }

    async fn create_sandbox(&self, id: &str, bundle: &Bundle, io: ProcessIo) -> Result<u32> {
        if let Some(existing) = self.registry.sandbox().await {
            return Err(ShimError::SandboxExists(existing.id().to_string()));
        }
        self.ensure_unmapped(id).await?;

        let config = bundle.sandbox_config(id, &self.config.hypervisor, io.terminal);
        tracing::info!(
            sandbox_id = %id,
            vcpus = config.vcpus,
            memory_mib = config.memory_mib,
            "Creating sandbox"
        );
        let sandbox = self
            .engine
            .create_sandbox(config)
            .await
            .map_err(ShimError::engine("create_sandbox", id))?;

        if let Err(e) = self.register_sandbox(id, &sandbox, bundle, io).await {
            tracing::warn!(sandbox_id = %id, error = %e, "Sandbox registration failed, rolling back");
            self.release_devices(id, &sandbox).await;
            if let Err(e) = self.mappings.delete(id).await {
                tracing::warn!(sandbox_id = %id, error = %e, "Failed to remove mapping");
            }
            if let Err(e) = sandbox.delete().await {
                tracing::warn!(sandbox_id = %id, error = %e, "Failed to delete sandbox");
            }
            return Err(e);
        }

        tracing::info!(sandbox_id = %id, pid = sandbox.pid(), "Sandbox created");
        Ok(sandbox.pid())
    }

    async fn register_sandbox(
        &self,
        id: &str,
        sandbox: &Arc<dyn Sandbox>,
        bundle: &Bundle,
        io: ProcessIo,
    ) -> Result<()> {
        if let Some(fs) = &self.config.shared_fs {
            let spec = DeviceSpec::VhostUserFs(VhostUserDeviceAttrs {
                socket_path: fs.socket_path(id),
                tag: fs.tag.clone(),
                cache_size: fs.cache_size,
                cache: fs.cache.clone(),
            });
            self.devices
                .acquire(id, spec, sandbox.as_device_receiver())
                .await?;
        }

        self.mappings
            .add(id, id)
            .await
            .map_err(ShimError::mapping("add", id))?;

        let pid = sandbox.pid();
        let container = Arc::new(Container::new(
            id,
            id,
            ContainerType::PodSandbox,
            bundle.path().to_path_buf(),
            bundle.rootfs(),
            io,
            ProcessHandle::new(pid, State::Created),
        ));
        self.registry
            .insert_sandbox(sandbox.clone(), container, pid)
            .await
    }

    async fn create_container(
        &self,
        id: &str,
        sandbox_id: &str,
        bundle: &Bundle,
        role: &Role,
        io: ProcessIo,
    ) -> Result<u32> {
        let sandbox = self.active_sandbox(sandbox_id).await?;
        if self.registry.contains(id).await {
            return Err(ShimError::IdInUse(id.to_string()));
        }
        self.ensure_unmapped(id).await?;

        tracing::info!(container_id = %id, sandbox_id, "Creating container");
        for attrs in bundle.block_devices() {
            let acquired = self
                .devices
                .acquire(id, DeviceSpec::Block(attrs), sandbox.as_device_receiver())
                .await;
            if let Err(e) = acquired {
                self.release_devices(id, &sandbox).await;
                return Err(e);
            }
        }

        let config = bundle.container_config(id, role, io.terminal);
        let pid = match sandbox.create_container(config).await {
            Ok(pid) => pid,
            Err(e) => {
                self.release_devices(id, &sandbox).await;
                return Err(ShimError::engine("create_container", id)(e));
            }
        };

        if let Err(e) = self
            .register_container(id, sandbox_id, bundle, io, pid)
            .await
        {
            tracing::warn!(container_id = %id, error = %e, "Container registration failed, rolling back");
            if let Err(e) = self.mappings.delete(id).await {
                tracing::warn!(container_id = %id, error = %e, "Failed to remove mapping");
            }
            if let Err(e) = sandbox.delete_container(id).await {
                tracing::warn!(container_id = %id, error = %e, "Failed to delete container");
            }
            self.release_devices(id, &sandbox).await;
            return Err(e);
        }

        tracing::info!(container_id = %id, sandbox_id, pid, "Container created");
        Ok(pid)
    }

    async fn register_container(
        &self,
        id: &str,
        sandbox_id: &str,
        bundle: &Bundle,
        io: ProcessIo,
        pid: u32,
    ) -> Result<()> {
        self.mappings
            .add(id, sandbox_id)
            .await
            .map_err(ShimError::mapping("add", id))?;

        let container = Arc::new(Container::new(
            id,
            sandbox_id,
            ContainerType::PodContainer,
            bundle.path().to_path_buf(),
            bundle.rootfs(),
            io,
            ProcessHandle::new(pid, State::Created),
        ));
        self.registry.insert(container, pid).await
    }
}
