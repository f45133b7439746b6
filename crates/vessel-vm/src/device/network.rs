//! virtio-net device bound to a host interface.

use super::{Device, DeviceAttrs, DeviceInfo, DeviceReceiver, DeviceType, GenericDevice};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Attributes of a network interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDeviceAttrs {
    /// Host-side interface (TAP) name
    pub if_name: String,
    /// Guest MAC address
    pub mac_address: String,
}

/// Network interface plugged into a sandbox.
#[derive(Debug)]
pub struct NetworkDevice {
    generic: GenericDevice,
    attrs: NetworkDeviceAttrs,
}

impl NetworkDevice {
    /// Create a detached device.
    pub fn new(attrs: NetworkDeviceAttrs) -> Self {
        Self {
            generic: GenericDevice::new(),
            attrs,
        }
    }
}

#[async_trait]
impl Device for NetworkDevice {
    async fn attach(&self, receiver: &dyn DeviceReceiver) -> Result<()> {
        self.generic
            .attach(
                receiver,
                self.device_type(),
                DeviceAttrs::Network(self.attrs.clone()),
            )
            .await
    }

    async fn detach(&self, _receiver: &dyn DeviceReceiver) -> Result<()> {
        self.generic.detach(self.device_type()).await
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Network
    }

    async fn device_info(&self) -> DeviceInfo {
        self.generic
            .info(self.device_type(), DeviceAttrs::Network(self.attrs.clone()))
            .await
    }

    async fn attach_count(&self) -> u32 {
        self.generic.attach_count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::testing::RecordingReceiver;

    #[tokio::test]
    async fn test_network_attach_detach_cycle() {
        let device = NetworkDevice::new(NetworkDeviceAttrs {
            if_name: "tap0_vessel".into(),
            mac_address: "02:42:ac:11:00:02".into(),
        });
        let receiver = RecordingReceiver::default();

        device.detach(&receiver).await.unwrap();
        device.attach(&receiver).await.unwrap();
        device.attach(&receiver).await.unwrap();
        assert_eq!(device.attach_count().await, 1);
        device.detach(&receiver).await.unwrap();
        device.detach(&receiver).await.unwrap();

        assert_eq!(device.attach_count().await, 0);
        assert_eq!(receiver.count().await, 1);
        assert_eq!(device.device_info().await.device_type, DeviceType::Network);
    }
}
