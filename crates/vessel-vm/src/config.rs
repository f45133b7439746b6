//! Configuration handed to the engine when creating sandboxes and containers.

use crate::error::{Result, VmError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Hypervisor settings shared by every sandbox a shim creates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HypervisorConfig {
    /// Path to the guest kernel image
    pub kernel_path: PathBuf,
    /// Path to the guest root image
    pub image_path: PathBuf,
    /// Path to the hypervisor binary
    pub hypervisor_path: PathBuf,
    /// Kernel boot arguments
    pub boot_args: String,
    /// vCPUs used when the bundle sets no CPU limit
    pub default_vcpus: u32,
    /// Memory (MiB) used when the bundle sets no memory limit
    pub default_memory_mib: u32,
}

impl Default for HypervisorConfig {
    fn default() -> Self {
        Self {
            kernel_path: PathBuf::from("/var/lib/vessel/vmlinux"),
            image_path: PathBuf::from("/var/lib/vessel/vessel-guest.img"),
            hypervisor_path: PathBuf::from("/usr/local/bin/cloud-hypervisor"),
            boot_args: "console=hvc0 quiet panic=1".into(),
            default_vcpus: 1,
            default_memory_mib: 2048,
        }
    }
}

/// Configuration for one container, either a sandbox's root container or a
/// member container created inside an existing sandbox.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Container identifier
    pub id: String,
    /// OCI bundle directory on the host
    pub bundle: PathBuf,
    /// Root filesystem of the container
    pub rootfs: PathBuf,
    /// Annotations, including the normalized container-type key
    pub annotations: HashMap<String, String>,
    /// Whether the init process gets a terminal
    pub terminal: bool,
    /// Init process arguments
    pub args: Vec<String>,
    /// Init process environment (`KEY=value`)
    pub env: Vec<String>,
    /// Init process working directory
    pub cwd: String,
}

impl ContainerConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(VmError::Config("container id is required".into()));
        }
        if self.bundle.as_os_str().is_empty() {
            return Err(VmError::Config(format!(
                "bundle path is required for container {}",
                self.id
            )));
        }
        Ok(())
    }
}

/// Configuration for a new sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Sandbox identifier (the ID of its root container)
    pub id: String,
    /// Hypervisor settings
    pub hypervisor: HypervisorConfig,
    /// Number of vCPUs for the sandbox VM
    pub vcpus: u32,
    /// Memory size in MiB for the sandbox VM
    pub memory_mib: u32,
    /// Sandbox-level annotations
    pub annotations: HashMap<String, String>,
    /// Root container of the sandbox
    pub container: ContainerConfig,
}

impl SandboxConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(VmError::Config("sandbox id is required".into()));
        }
        if self.vcpus == 0 {
            return Err(VmError::Config("vcpus must be > 0".into()));
        }
        if self.memory_mib == 0 {
            return Err(VmError::Config("memory_mib must be > 0".into()));
        }
        if self.container.id != self.id {
            return Err(VmError::Config(format!(
                "root container id {} does not match sandbox id {}",
                self.container.id, self.id
            )));
        }
        self.container.validate()
    }
}
