//! Annotation keys the engine records on every container.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Normalized container-type key written into each `ContainerConfig` and
/// reported back through `ContainerStatus::annotations`.
pub const CONTAINER_TYPE_KEY: &str = "io.vessel.pkg.oci.container_type";

/// Sandbox ID key recorded on member containers.
pub const SANDBOX_ID_KEY: &str = "io.vessel.pkg.oci.sandbox_id";

/// Role of a container inside a sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerType {
    /// The sandbox's own root container.
    PodSandbox,
    /// A workload created inside an existing sandbox.
    PodContainer,
}

impl ContainerType {
    /// Value stored under [`CONTAINER_TYPE_KEY`].
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerType::PodSandbox => "pod_sandbox",
            ContainerType::PodContainer => "pod_container",
        }
    }

    /// Whether this is the sandbox's root container.
    pub fn is_sandbox(&self) -> bool {
        matches!(self, ContainerType::PodSandbox)
    }
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pod_sandbox" => Ok(ContainerType::PodSandbox),
            "pod_container" => Ok(ContainerType::PodContainer),
            other => Err(format!("unknown container type {other:?}")),
        }
    }
}
