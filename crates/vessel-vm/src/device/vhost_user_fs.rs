//! virtio-fs device served by a vhost-user daemon.

use super::{Device, DeviceAttrs, DeviceInfo, DeviceReceiver, DeviceType, GenericDevice};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Attributes of a vhost-user shared filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VhostUserDeviceAttrs {
    /// vhost-user socket exposed by the filesystem daemon
    pub socket_path: PathBuf,
    /// Mount tag the guest uses to find the filesystem
    pub tag: String,
    /// DAX window size in MiB (0 disables DAX)
    pub cache_size: u32,
    /// Cache mode passed to the daemon (`none`, `auto`, `always`)
    pub cache: String,
}

/// Shared filesystem transport for a sandbox.
#[derive(Debug)]
pub struct VhostUserFsDevice {
    generic: GenericDevice,
    attrs: VhostUserDeviceAttrs,
}

impl VhostUserFsDevice {
    /// Create a detached device.
    pub fn new(attrs: VhostUserDeviceAttrs) -> Self {
        Self {
            generic: GenericDevice::new(),
            attrs,
        }
    }
}

#[async_trait]
impl Device for VhostUserFsDevice {
    async fn attach(&self, receiver: &dyn DeviceReceiver) -> Result<()> {
        self.generic
            .attach(
                receiver,
                self.device_type(),
                DeviceAttrs::VhostUserFs(self.attrs.clone()),
            )
            .await
    }

    async fn detach(&self, _receiver: &dyn DeviceReceiver) -> Result<()> {
        self.generic.detach(self.device_type()).await
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::VhostUserFs
    }

    async fn device_info(&self) -> DeviceInfo {
        self.generic
            .info(
                self.device_type(),
                DeviceAttrs::VhostUserFs(self.attrs.clone()),
            )
            .await
    }

    async fn attach_count(&self) -> u32 {
        self.generic.attach_count().await
    }
}
