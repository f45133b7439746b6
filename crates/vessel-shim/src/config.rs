//! Shim configuration.
//!
//! Configuration is loaded from environment variables with sensible defaults.

use std::path::{Path, PathBuf};
use vessel_vm::HypervisorConfig;

/// Cache modes accepted by the shared filesystem daemon.
const SHARED_FS_CACHE_MODES: &[&str] = &["none", "auto", "always"];

/// Shared filesystem served to every sandbox over vhost-user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedFsConfig {
    /// Directory holding one `<sandbox-id>/vhost-fs.sock` per sandbox.
    pub socket_dir: PathBuf,

    /// Mount tag seen by the guest.
    pub tag: String,

    /// DAX window size in MiB (0 disables DAX).
    pub cache_size: u32,

    /// Cache mode (`none`, `auto` or `always`).
    pub cache: String,
}

impl Default for SharedFsConfig {
    fn default() -> Self {
        Self {
            socket_dir: PathBuf::from("/run/vessel/vhost-fs"),
            tag: "vessel-shared".into(),
            cache_size: 0,
            cache: "auto".into(),
        }
    }
}

impl SharedFsConfig {
    /// Socket the daemon serving `sandbox_id` listens on.
    pub fn socket_path(&self, sandbox_id: &str) -> PathBuf {
        self.socket_dir.join(sandbox_id).join("vhost-fs.sock")
    }
}

/// Configuration for the vessel shim.
#[derive(Debug, Clone)]
pub struct ShimConfig {
    /// Root directory of the container-to-sandbox identity mappings.
    pub mapping_root: PathBuf,

    /// Hypervisor settings for new sandboxes.
    pub hypervisor: HypervisorConfig,

    /// Shared filesystem device, when enabled.
    pub shared_fs: Option<SharedFsConfig>,
}

/// Configuration validation error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("mapping root must be absolute: {0}")]
    RelativeMappingRoot(PathBuf),

    #[error("default vcpus must be > 0")]
    NoVcpus,

    #[error("default memory must be > 0 MiB")]
    NoMemory,

    #[error("shared filesystem tag must not be empty")]
    EmptySharedFsTag,

    #[error("unknown shared filesystem cache mode: {0}")]
    InvalidCacheMode(String),
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self {
            mapping_root: PathBuf::from("/run/vessel/containers-mapping"),
            hypervisor: HypervisorConfig::default(),
            shared_fs: None,
        }
    }
}

impl ShimConfig {
    /// Create a config that keeps identity mappings under `mapping_root`.
    pub fn with_mapping_root(mapping_root: impl AsRef<Path>) -> Self {
        Self {
            mapping_root: mapping_root.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `VESSEL_MAPPING_ROOT` | `/run/vessel/containers-mapping` |
    /// | `VESSEL_KERNEL` | `/var/lib/vessel/vmlinux` |
    /// | `VESSEL_IMAGE` | `/var/lib/vessel/vessel-guest.img` |
    /// | `VESSEL_HYPERVISOR` | `/usr/local/bin/cloud-hypervisor` |
    /// | `VESSEL_KERNEL_PARAMS` | `console=hvc0 quiet panic=1` |
    /// | `VESSEL_DEFAULT_VCPUS` | `1` |
    /// | `VESSEL_DEFAULT_MEMORY_MIB` | `2048` |
    /// | `VESSEL_SHARED_FS` | `false` |
    /// | `VESSEL_SHARED_FS_SOCKET_DIR` | `/run/vessel/vhost-fs` |
    /// | `VESSEL_SHARED_FS_TAG` | `vessel-shared` |
    /// | `VESSEL_SHARED_FS_CACHE` | `auto` |
    /// | `VESSEL_SHARED_FS_CACHE_SIZE` | `0` |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let default = Self::default();
        let hv = default.hypervisor;

        let hypervisor = HypervisorConfig {
            kernel_path: var("VESSEL_KERNEL")
                .map(PathBuf::from)
                .unwrap_or(hv.kernel_path),
            image_path: var("VESSEL_IMAGE")
                .map(PathBuf::from)
                .unwrap_or(hv.image_path),
            hypervisor_path: var("VESSEL_HYPERVISOR")
                .map(PathBuf::from)
                .unwrap_or(hv.hypervisor_path),
            boot_args: var("VESSEL_KERNEL_PARAMS").unwrap_or(hv.boot_args),
            default_vcpus: var("VESSEL_DEFAULT_VCPUS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(hv.default_vcpus),
            default_memory_mib: var("VESSEL_DEFAULT_MEMORY_MIB")
                .and_then(|v| v.parse().ok())
                .unwrap_or(hv.default_memory_mib),
        };

        let shared_fs_enabled = var("VESSEL_SHARED_FS")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(false);
        let shared_fs = shared_fs_enabled.then(|| {
            let fs = SharedFsConfig::default();
            SharedFsConfig {
                socket_dir: var("VESSEL_SHARED_FS_SOCKET_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(fs.socket_dir),
                tag: var("VESSEL_SHARED_FS_TAG").unwrap_or(fs.tag),
                cache_size: var("VESSEL_SHARED_FS_CACHE_SIZE")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(fs.cache_size),
                cache: var("VESSEL_SHARED_FS_CACHE").unwrap_or(fs.cache),
            }
        });

        Self {
            mapping_root: var("VESSEL_MAPPING_ROOT")
                .map(PathBuf::from)
                .unwrap_or(default.mapping_root),
            hypervisor,
            shared_fs,
        }
    }

    /// Validate the configuration.
    ///
    /// Hypervisor paths are not checked here; the engine reports them when a
    /// sandbox is created.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.mapping_root.is_absolute() {
            return Err(ConfigError::RelativeMappingRoot(self.mapping_root.clone()));
        }
        if self.hypervisor.default_vcpus == 0 {
            return Err(ConfigError::NoVcpus);
        }
        if self.hypervisor.default_memory_mib == 0 {
            return Err(ConfigError::NoMemory);
        }
        if let Some(fs) = &self.shared_fs {
            if fs.tag.is_empty() {
                return Err(ConfigError::EmptySharedFsTag);
            }
            if !SHARED_FS_CACHE_MODES.contains(&fs.cache.as_str()) {
                return Err(ConfigError::InvalidCacheMode(fs.cache.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ShimConfig::default();
        assert_eq!(
            config.mapping_root,
            PathBuf::from("/run/vessel/containers-mapping")
        );
        assert_eq!(config.hypervisor.default_vcpus, 1);
        assert!(config.shared_fs.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_uses_defaults() {
        let config = ShimConfig::from_lookup(lookup(&[]));
        assert_eq!(config.mapping_root, ShimConfig::default().mapping_root);
        assert_eq!(config.hypervisor.default_memory_mib, 2048);
        assert!(config.shared_fs.is_none());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ShimConfig::from_lookup(lookup(&[
            ("VESSEL_MAPPING_ROOT", "/tmp/mappings"),
            ("VESSEL_DEFAULT_VCPUS", "4"),
            ("VESSEL_DEFAULT_MEMORY_MIB", "not-a-number"),
            ("VESSEL_SHARED_FS", "1"),
            ("VESSEL_SHARED_FS_TAG", "kataShared"),
        ]));
        assert_eq!(config.mapping_root, PathBuf::from("/tmp/mappings"));
        assert_eq!(config.hypervisor.default_vcpus, 4);
        assert_eq!(config.hypervisor.default_memory_mib, 2048);

        let fs = config.shared_fs.unwrap();
        assert_eq!(fs.tag, "kataShared");
        assert_eq!(fs.cache, "auto");
        assert_eq!(
            fs.socket_path("pod-1"),
            PathBuf::from("/run/vessel/vhost-fs/pod-1/vhost-fs.sock")
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = ShimConfig::with_mapping_root("relative/dir");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::RelativeMappingRoot(_))
        ));

        let mut config = ShimConfig::default();
        config.shared_fs = Some(SharedFsConfig {
            cache: "sometimes".into(),
            ..Default::default()
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCacheMode(_))
        ));
    }
}
