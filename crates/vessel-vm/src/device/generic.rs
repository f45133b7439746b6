//! Attach bookkeeping shared by every device variant.

use super::{DeviceAttrs, DeviceDescriptor, DeviceInfo, DeviceReceiver, DeviceType};
use crate::error::Result;
use rand::RngCore;
use tokio::sync::Mutex;

/// Direction of a bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bump {
    Attach,
    Detach,
}

#[derive(Debug, Default)]
struct AttachState {
    id: Option<String>,
    attach_count: u32,
}

impl AttachState {
    /// Whether the call is redundant and must be skipped.
    fn bump(&self, direction: Bump) -> bool {
        match direction {
            Bump::Attach => self.attach_count > 0,
            Bump::Detach => self.attach_count == 0,
        }
    }
}

/// Base record embedded by every device variant.
///
/// The attach count is a presence flag (0 or 1). The lock is held for the
/// whole attach, so two racing attaches cannot both see "not attached" and
/// submit twice.
#[derive(Debug, Default)]
pub struct GenericDevice {
    state: Mutex<AttachState>,
}

impl GenericDevice {
    /// Create a detached device record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach through `receiver` unless already attached.
    ///
    /// A fresh identifier is generated for every real submission. The flag
    /// is committed only once the receiver accepts the descriptor, so a
    /// refused submission leaves the device detached and retryable.
    pub async fn attach(
        &self,
        receiver: &dyn DeviceReceiver,
        device_type: DeviceType,
        attrs: DeviceAttrs,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.bump(Bump::Attach) {
            tracing::trace!(%device_type, "Device already attached, skipping");
            return Ok(());
        }

        let id = generate_device_id();
        tracing::debug!(device_id = %id, %device_type, "Attaching device");
        receiver
            .append_device(DeviceDescriptor {
                id: id.clone(),
                device_type,
                attrs,
            })
            .await?;

        state.id = Some(id);
        state.attach_count = 1;
        Ok(())
    }

    /// Clear the attach flag unless already detached.
    ///
    /// The receiver is not contacted.
    pub async fn detach(&self, device_type: DeviceType) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.bump(Bump::Detach) {
            tracing::trace!(%device_type, "Device not attached, skipping detach");
            return Ok(());
        }

        tracing::debug!(device_id = ?state.id, %device_type, "Detaching device");
        state.attach_count = 0;
        Ok(())
    }

    /// Current attach count.
    pub async fn attach_count(&self) -> u32 {
        self.state.lock().await.attach_count
    }

    /// Build an info snapshot for a variant.
    pub async fn info(&self, device_type: DeviceType, attrs: DeviceAttrs) -> DeviceInfo {
        let state = self.state.lock().await;
        DeviceInfo {
            id: state.id.clone(),
            device_type,
            attrs,
            attach_count: state.attach_count,
        }
    }
}

/// 8 random bytes, hex encoded. Never derived from caller input.
fn generate_device_id() -> String {
    let mut bytes = [0u8; 8];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
