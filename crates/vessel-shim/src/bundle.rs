//! OCI bundle loading and request classification.
//!
//! The container manager tells the shim what a bundle is through annotations
//! in `config.json`. containerd and CRI-O use different keys for the same
//! two facts: the container type and, for member containers, the owning
//! sandbox ID. Both are accepted.

use crate::error::{Result, ShimError};
use oci_spec::runtime::{LinuxDeviceType, Spec};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use vessel_vm::annotations::{CONTAINER_TYPE_KEY, SANDBOX_ID_KEY};
use vessel_vm::{BlockDeviceAttrs, ContainerConfig, ContainerType, HypervisorConfig, SandboxConfig};

/// containerd CRI container-type annotation.
pub const CRI_CONTAINER_TYPE: &str = "io.kubernetes.cri.container-type";
/// CRI-O container-type annotation.
pub const CRIO_CONTAINER_TYPE: &str = "io.kubernetes.cri-o.ContainerType";
/// containerd CRI sandbox-ID annotation.
pub const CRI_SANDBOX_ID: &str = "io.kubernetes.cri.sandbox-id";
/// CRI-O sandbox-ID annotation.
pub const CRIO_SANDBOX_ID: &str = "io.kubernetes.cri-o.SandboxID";

const CONTAINER_TYPE_KEYS: [&str; 2] = [CRI_CONTAINER_TYPE, CRIO_CONTAINER_TYPE];
const SANDBOX_ID_KEYS: [&str; 2] = [CRI_SANDBOX_ID, CRIO_SANDBOX_ID];

const CONFIG_FILE: &str = "config.json";
const DEFAULT_ROOTFS: &str = "rootfs";
const MIB: u64 = 1 << 20;

/// What a create request targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// A new sandbox with the request ID as its root container.
    Sandbox,
    /// A member container of an existing sandbox.
    Container {
        /// Owning sandbox
        sandbox_id: String,
    },
}

impl Role {
    /// Container type recorded with the engine for this role.
    pub fn container_type(&self) -> ContainerType {
        match self {
            Role::Sandbox => ContainerType::PodSandbox,
            Role::Container { .. } => ContainerType::PodContainer,
        }
    }
}

/// Classify a request from its bundle annotations.
///
/// A bundle with no container-type annotation is a standalone sandbox.
pub fn classify(container_id: &str, annotations: &HashMap<String, String>) -> Result<Role> {
    let Some((key, value)) = CONTAINER_TYPE_KEYS
        .iter()
        .find_map(|key| annotations.get(*key).map(|value| (*key, value)))
    else {
        return Ok(Role::Sandbox);
    };

    match value.as_str() {
        "sandbox" => Ok(Role::Sandbox),
        "container" => SANDBOX_ID_KEYS
            .iter()
            .find_map(|key| annotations.get(*key))
            .filter(|id| !id.is_empty())
            .map(|sandbox_id| Role::Container {
                sandbox_id: sandbox_id.clone(),
            })
            .ok_or_else(|| ShimError::MissingSandboxId(container_id.to_string())),
        other => Err(ShimError::InvalidContainerType {
            key: key.to_string(),
            value: other.to_string(),
        }),
    }
}

/// Check that `id` is safe to use as a mapping file name.
pub fn validate_container_id(id: &str) -> Result<()> {
    let mut chars = id.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ShimError::InvalidContainerId(id.to_string()))
    }
}

/// A loaded OCI bundle.
#[derive(Debug, Clone)]
pub struct Bundle {
    path: PathBuf,
    spec: Spec,
}

impl Bundle {
    /// Load `<path>/config.json`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let config_path = path.join(CONFIG_FILE);
        if !config_path.is_file() {
            return Err(ShimError::Bundle {
                path,
                reason: format!("{CONFIG_FILE} not found"),
            });
        }
        let spec = Spec::load(&config_path).map_err(|e| ShimError::Bundle {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        tracing::debug!(bundle = %path.display(), "Loaded bundle");
        Ok(Self { path, spec })
    }

    /// Bundle directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bundle annotations (empty when unset).
    pub fn annotations(&self) -> HashMap<String, String> {
        self.spec.annotations().clone().unwrap_or_default()
    }

    /// Classify the request this bundle was submitted with.
    pub fn role(&self, container_id: &str) -> Result<Role> {
        classify(container_id, &self.annotations())
    }

    /// Absolute rootfs path.
    pub fn rootfs(&self) -> PathBuf {
        match self.spec.root() {
            Some(root) if root.path().is_absolute() => root.path().clone(),
            Some(root) => self.path.join(root.path()),
            None => self.path.join(DEFAULT_ROOTFS),
        }
    }

    /// Reject malformed CPU and memory limits.
    pub fn validate_resources(&self) -> Result<()> {
        let (quota, period) = self.cpu_limits();
        if let (Some(quota), Some(period)) = (quota, period) {
            if (quota == 0) != (period == 0) {
                return Err(ShimError::InvalidResources(format!(
                    "cpu quota {quota} and period {period} must both be zero or both be set"
                )));
            }
        }
        if let Some(limit) = self.memory_limit() {
            if limit < -1 {
                return Err(ShimError::InvalidResources(format!(
                    "memory limit {limit} is negative"
                )));
            }
        }
        Ok(())
    }

    /// vCPUs and memory (MiB) for a sandbox built from this bundle.
    pub fn sizing(&self, defaults: &HypervisorConfig) -> (u32, u32) {
        let vcpus = match self.cpu_limits() {
            (Some(quota), Some(period)) if quota > 0 && period > 0 => {
                u32::try_from((quota as u64).div_ceil(period)).unwrap_or(u32::MAX)
            }
            _ => defaults.default_vcpus,
        };
        let memory_mib = match self.memory_limit() {
            Some(limit) if limit > 0 => {
                u32::try_from((limit as u64).div_ceil(MIB)).unwrap_or(u32::MAX)
            }
            _ => defaults.default_memory_mib,
        };
        (vcpus, memory_mib)
    }

    /// Engine configuration for the container `id`, tagged with the
    /// normalized container type of `role`.
    pub fn container_config(
        &self,
        id: &str,
        role: &Role,
        terminal: bool,
    ) -> ContainerConfig {
        let mut annotations = self.annotations();
        annotations.insert(
            CONTAINER_TYPE_KEY.to_string(),
            role.container_type().as_str().to_string(),
        );
        if let Role::Container { sandbox_id } = role {
            annotations.insert(SANDBOX_ID_KEY.to_string(), sandbox_id.clone());
        }

        let process = self.spec.process().as_ref();
        ContainerConfig {
            id: id.to_string(),
            bundle: self.path.clone(),
            rootfs: self.rootfs(),
            annotations,
            terminal,
            args: process
                .and_then(|p| p.args().clone())
                .unwrap_or_default(),
            env: process.and_then(|p| p.env().clone()).unwrap_or_default(),
            cwd: process
                .map(|p| p.cwd().to_string_lossy().into_owned())
                .unwrap_or_else(|| "/".into()),
        }
    }

    /// Engine configuration for a new sandbox rooted at container `id`.
    pub fn sandbox_config(
        &self,
        id: &str,
        hypervisor: &HypervisorConfig,
        terminal: bool,
    ) -> SandboxConfig {
        let (vcpus, memory_mib) = self.sizing(hypervisor);
        SandboxConfig {
            id: id.to_string(),
            hypervisor: hypervisor.clone(),
            vcpus,
            memory_mib,
            annotations: self.annotations(),
            container: self.container_config(id, &Role::Sandbox, terminal),
        }
    }

    /// Block devices requested through `linux.devices`.
    pub fn block_devices(&self) -> Vec<BlockDeviceAttrs> {
        self.spec
            .linux()
            .as_ref()
            .and_then(|linux| linux.devices().as_ref())
            .map(|devices| {
                devices
                    .iter()
                    .filter(|dev| dev.typ() == LinuxDeviceType::B)
                    .map(|dev| BlockDeviceAttrs {
                        path: dev.path().clone(),
                        major: dev.major(),
                        minor: dev.minor(),
                        read_only: false,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn cpu_limits(&self) -> (Option<i64>, Option<u64>) {
        self.spec
            .linux()
            .as_ref()
            .and_then(|linux| linux.resources().as_ref())
            .and_then(|resources| resources.cpu().as_ref())
            .map(|cpu| (cpu.quota(), cpu.period()))
            .unwrap_or((None, None))
    }

    fn memory_limit(&self) -> Option<i64> {
        self.spec
            .linux()
            .as_ref()
            .and_then(|linux| linux.resources().as_ref())
            .and_then(|resources| resources.memory().as_ref())
            .and_then(|memory| memory.limit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn annotations(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn write_bundle(dir: &Path, linux: serde_json::Value) -> Bundle {
        let config = json!({
            "ociVersion": "1.0.2",
            "root": { "path": "rootfs" },
            "process": {
                "user": { "uid": 0, "gid": 0 },
                "args": ["sleep", "infinity"],
                "env": ["PATH=/usr/bin"],
                "cwd": "/work"
            },
            "annotations": { "io.kubernetes.cri.container-type": "sandbox" },
            "linux": linux
        });
        std::fs::write(dir.join(CONFIG_FILE), config.to_string()).unwrap();
        Bundle::load(dir).unwrap()
    }

    #[test]
    fn test_classify_sandbox_and_container() {
        assert_eq!(
            classify("s1", &annotations(&[(CRI_CONTAINER_TYPE, "sandbox")])).unwrap(),
            Role::Sandbox
        );
        assert_eq!(
            classify(
                "c1",
                &annotations(&[(CRIO_CONTAINER_TYPE, "container"), (CRIO_SANDBOX_ID, "s1")])
            )
            .unwrap(),
            Role::Container {
                sandbox_id: "s1".into()
            }
        );
    }

    #[test]
    fn test_classify_without_annotation_is_standalone_sandbox() {
        assert_eq!(classify("s1", &HashMap::new()).unwrap(), Role::Sandbox);
    }

    #[test]
    fn test_classify_rejects_bad_annotations() {
        let err = classify("c1", &annotations(&[(CRI_CONTAINER_TYPE, "pod")])).unwrap_err();
        assert!(matches!(err, ShimError::InvalidContainerType { ref value, .. } if value == "pod"));
        assert!(err.is_classification());

        let err = classify("c1", &annotations(&[(CRI_CONTAINER_TYPE, "container")])).unwrap_err();
        assert!(matches!(err, ShimError::MissingSandboxId(_)));
    }

    #[test]
    fn test_validate_container_id() {
        assert!(validate_container_id("abc-123_x.y").is_ok());
        assert!(validate_container_id("").is_err());
        assert!(validate_container_id(".hidden").is_err());
        assert!(validate_container_id("../escape").is_err());
        assert!(validate_container_id("a/b").is_err());
    }

    #[test]
    fn test_load_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        let err = Bundle::load(dir.path()).unwrap_err();
        assert!(matches!(err, ShimError::Bundle { .. }));
    }

    #[test]
    fn test_sizing_from_limits() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = write_bundle(
            dir.path(),
            json!({
                "resources": {
                    "cpu": { "quota": 150000, "period": 100000 },
                    "memory": { "limit": 536870912_i64 + 1 }
                }
            }),
        );
        assert!(bundle.validate_resources().is_ok());
        assert_eq!(bundle.sizing(&HypervisorConfig::default()), (2, 513));
    }

    #[test]
    fn test_sizing_defaults_when_unlimited() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = write_bundle(
            dir.path(),
            json!({ "resources": { "memory": { "limit": -1 } } }),
        );
        assert!(bundle.validate_resources().is_ok());
        assert_eq!(bundle.sizing(&HypervisorConfig::default()), (1, 2048));
    }

    #[test]
    fn test_rejects_zero_quota_with_period() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = write_bundle(
            dir.path(),
            json!({ "resources": { "cpu": { "quota": 0, "period": 100000 } } }),
        );
        assert!(matches!(
            bundle.validate_resources(),
            Err(ShimError::InvalidResources(_))
        ));
    }

    #[test]
    fn test_rejects_negative_memory() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = write_bundle(
            dir.path(),
            json!({ "resources": { "memory": { "limit": -4096 } } }),
        );
        assert!(bundle.validate_resources().is_err());
    }

    #[test]
    fn test_container_config_normalizes_type() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = write_bundle(dir.path(), json!({}));
        let role = Role::Container {
            sandbox_id: "s1".into(),
        };
        let config = bundle.container_config("c1", &role, false);

        assert_eq!(config.annotations[CONTAINER_TYPE_KEY], "pod_container");
        assert_eq!(config.annotations[SANDBOX_ID_KEY], "s1");
        assert_eq!(config.rootfs, dir.path().join("rootfs"));
        assert_eq!(config.args, vec!["sleep", "infinity"]);
        assert_eq!(config.cwd, "/work");
    }

    #[test]
    fn test_block_devices() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = write_bundle(
            dir.path(),
            json!({
                "devices": [
                    { "path": "/dev/vdb", "type": "b", "major": 253, "minor": 16 },
                    { "path": "/dev/null", "type": "c", "major": 1, "minor": 3 }
                ]
            }),
        );
        let devices = bundle.block_devices();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].path, PathBuf::from("/dev/vdb"));
        assert_eq!((devices[0].major, devices[0].minor), (253, 16));
    }
}
