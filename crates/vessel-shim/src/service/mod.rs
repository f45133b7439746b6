//! Lifecycle controller.
//!
//! [`Service`] is the task protocol entry point. Each operation classifies
//! its target, drives the engine, then updates the identity mappings and
//! the registry. Operations are split across submodules by concern:
//!
//! - `create`: sandbox and container creation with rollback
//! - `start`: container start and exit watching
//! - `delete`: the deletion protocol
//! - `process`: exec sessions, state, kill and wait
//! - `recover`: registry rebuild after a shim restart

mod create;
mod delete;
mod process;
mod recover;
mod start;

use crate::config::ShimConfig;
use crate::container::{Container, ProcessHandle};
use crate::devices::DeviceManager;
use crate::error::{Result, ShimError};
use crate::mapping::{FsMappingStore, MappingStore};
use crate::registry::Registry;
use std::sync::Arc;
use vessel_vm::{Sandbox, SandboxEngine};

/// Exit code recorded for a process the shim stopped (128 + SIGKILL).
pub(crate) const KILLED_EXIT_CODE: u32 = 137;

/// Exit code recorded when the engine cannot report one.
pub(crate) const UNKNOWN_EXIT_CODE: u32 = 255;

/// Task service for one sandbox.
pub struct Service {
    config: ShimConfig,
    engine: Arc<dyn SandboxEngine>,
    mappings: Arc<dyn MappingStore>,
    registry: Registry,
    devices: DeviceManager,
}

impl Service {
    /// Service keeping identity mappings under `config.mapping_root`.
    pub fn new(config: ShimConfig, engine: Arc<dyn SandboxEngine>) -> Self {
        let mappings = Arc::new(FsMappingStore::new(&config.mapping_root));
        Self::with_mapping_store(config, engine, mappings)
    }

    /// Service with a custom mapping store.
    pub fn with_mapping_store(
        config: ShimConfig,
        engine: Arc<dyn SandboxEngine>,
        mappings: Arc<dyn MappingStore>,
    ) -> Self {
        Self {
            config,
            engine,
            mappings,
            registry: Registry::new(),
            devices: DeviceManager::new(),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &ShimConfig {
        &self.config
    }

    /// Registered containers and the sandbox handle.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Devices attached to the sandbox.
    pub fn devices(&self) -> &DeviceManager {
        &self.devices
    }

    /// Identity mapping store.
    pub fn mappings(&self) -> &dyn MappingStore {
        self.mappings.as_ref()
    }

    /// The registered sandbox, if its ID is `sandbox_id`.
    async fn active_sandbox(&self, sandbox_id: &str) -> Result<Arc<dyn Sandbox>> {
        self.registry
            .sandbox()
            .await
            .filter(|sandbox| sandbox.id() == sandbox_id)
            .ok_or_else(|| ShimError::SandboxNotCreated(sandbox_id.to_string()))
    }

    /// Fail with `IdInUse` if `container_id` already has a mapping.
    async fn ensure_unmapped(&self, container_id: &str) -> Result<()> {
        let existing = self
            .mappings
            .fetch(container_id)
            .await
            .map_err(ShimError::mapping("fetch", container_id))?;
        match existing {
            Some(_) => Err(ShimError::IdInUse(container_id.to_string())),
            None => Ok(()),
        }
    }

    /// Release every device `owner` holds, logging failures.
    async fn release_devices(&self, owner: &str, sandbox: &Arc<dyn Sandbox>) {
        if let Err(e) = self
            .devices
            .release(owner, sandbox.as_device_receiver())
            .await
        {
            tracing::warn!(container_id = %owner, error = %e, "Failed to release devices");
        }
    }

    /// Wait for a process in the background and record its exit.
    fn watch_exit(
        &self,
        sandbox: Arc<dyn Sandbox>,
        container_id: &str,
        process_id: &str,
        handle: Arc<ProcessHandle>,
    ) {
        let container_id = container_id.to_string();
        let process_id = process_id.to_string();
        tokio::spawn(async move {
            let exit_code = match sandbox.wait_process(&container_id, &process_id).await {
                Ok(code) => code,
                Err(e) => {
                    tracing::warn!(
                        container_id = %container_id,
                        process_id = %process_id,
                        error = %e,
                        "Failed to wait for process"
                    );
                    UNKNOWN_EXIT_CODE
                }
            };
            if handle.record_exit(exit_code).await {
                tracing::info!(
                    container_id = %container_id,
                    process_id = %process_id,
                    exit_code,
                    "Process exited"
                );
            }
        });
    }
}

/// Record a kill exit for every exec of `container` that has not exited.
async fn reap_execs(container: &Container) {
    for exec in container.execs().await {
        exec.handle.record_exit(KILLED_EXIT_CODE).await;
    }
}
