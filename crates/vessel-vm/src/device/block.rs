//! virtio-blk device backed by a host block device.

use super::{Device, DeviceAttrs, DeviceInfo, DeviceReceiver, DeviceType, GenericDevice};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Attributes of a host block device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDeviceAttrs {
    /// Device node on the host
    pub path: PathBuf,
    /// Major number
    pub major: i64,
    /// Minor number
    pub minor: i64,
    /// Read-only flag
    pub read_only: bool,
}

/// Block device passed through to a sandbox.
#[derive(Debug)]
pub struct BlockDevice {
    generic: GenericDevice,
    attrs: BlockDeviceAttrs,
}

impl BlockDevice {
    /// Create a detached device.
    pub fn new(attrs: BlockDeviceAttrs) -> Self {
        Self {
            generic: GenericDevice::new(),
            attrs,
        }
    }
}

#[async_trait]
impl Device for BlockDevice {
    async fn attach(&self, receiver: &dyn DeviceReceiver) -> Result<()> {
        self.generic
            .attach(receiver, self.device_type(), DeviceAttrs::Block(self.attrs.clone()))
            .await
    }

    async fn detach(&self, _receiver: &dyn DeviceReceiver) -> Result<()> {
        self.generic.detach(self.device_type()).await
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Block
    }

    async fn device_info(&self) -> DeviceInfo {
        self.generic
            .info(self.device_type(), DeviceAttrs::Block(self.attrs.clone()))
            .await
    }

    async fn attach_count(&self) -> u32 {
        self.generic.attach_count().await
    }
}
