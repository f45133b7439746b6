//! Virtual devices attachable to a sandbox.
//!
//! Every variant implements [`Device`] and embeds a [`GenericDevice`], which
//! owns the attach flag and the bump primitive guarding it. Variants only
//! contribute their type tag and attribute payload.
//!
//! Detach is bookkeeping only: it clears the attach flag but never calls the
//! receiver. Releasing hypervisor-side resources happens when the sandbox is
//! torn down.

mod block;
mod generic;
mod network;
mod vhost_user_fs;

pub use block::{BlockDevice, BlockDeviceAttrs};
pub use generic::GenericDevice;
pub use network::{NetworkDevice, NetworkDeviceAttrs};
pub use vhost_user_fs::{VhostUserDeviceAttrs, VhostUserFsDevice};

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Device type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceType {
    /// virtio-fs served by a vhost-user backend
    VhostUserFs,
    /// virtio-blk
    Block,
    /// virtio-net
    Network,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::VhostUserFs => write!(f, "vhost-user-fs"),
            DeviceType::Block => write!(f, "block"),
            DeviceType::Network => write!(f, "network"),
        }
    }
}

/// Type-specific attributes carried by a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DeviceAttrs {
    /// Shared filesystem attributes
    VhostUserFs(VhostUserDeviceAttrs),
    /// Block device attributes
    Block(BlockDeviceAttrs),
    /// Network interface attributes
    Network(NetworkDeviceAttrs),
}

/// What a [`DeviceReceiver`] gets on attach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Generated device identifier (hex, never caller supplied)
    pub id: String,
    /// Type tag
    pub device_type: DeviceType,
    /// Type-specific attributes
    pub attrs: DeviceAttrs,
}

/// Snapshot of a device returned by [`Device::device_info`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Identifier from the last successful attach, if any
    pub id: Option<String>,
    /// Type tag
    pub device_type: DeviceType,
    /// Type-specific attributes
    pub attrs: DeviceAttrs,
    /// 1 while attached, 0 otherwise
    pub attach_count: u32,
}

/// Sandbox/hypervisor side that accepts device descriptors.
#[async_trait]
pub trait DeviceReceiver: Send + Sync {
    /// Hot-plug or queue a device. No partial acceptance: success or error.
    async fn append_device(&self, device: DeviceDescriptor) -> Result<()>;
}

/// Attach/detach contract implemented by every device variant.
#[async_trait]
pub trait Device: Send + Sync + std::fmt::Debug {
    /// Submit the device to `receiver` unless it is already attached.
    async fn attach(&self, receiver: &dyn DeviceReceiver) -> Result<()>;

    /// Clear the attach flag. A device that is not attached is left alone.
    async fn detach(&self, receiver: &dyn DeviceReceiver) -> Result<()>;

    /// Type tag of this variant.
    fn device_type(&self) -> DeviceType;

    /// Attributes snapshot with the type tag populated.
    async fn device_info(&self) -> DeviceInfo;

    /// Current attach count (0 or 1).
    async fn attach_count(&self) -> u32;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::VmError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Mutex;

    /// Receiver that records submissions and can be told to refuse them.
    #[derive(Default)]
    pub struct RecordingReceiver {
        pub appended: Mutex<Vec<DeviceDescriptor>>,
        pub refuse: AtomicBool,
    }

    impl RecordingReceiver {
        pub async fn count(&self) -> usize {
            self.appended.lock().await.len()
        }
    }

    #[async_trait]
    impl DeviceReceiver for RecordingReceiver {
        async fn append_device(&self, device: DeviceDescriptor) -> Result<()> {
            if self.refuse.load(Ordering::SeqCst) {
                return Err(VmError::DeviceRejected {
                    id: device.id,
                    reason: "receiver refused".into(),
                });
            }
            // let a concurrent attach interleave here if it can
            tokio::task::yield_now().await;
            self.appended.lock().await.push(device);
            Ok(())
        }
    }
}
