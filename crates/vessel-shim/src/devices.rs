//! Device sharing across the containers of a sandbox.
//!
//! A device's own attach flag only says whether it is attached. Which
//! containers still use it is tracked here: each device carries the set of
//! container IDs referencing it, and is detached and dropped once that set
//! is empty.

use crate::error::{Result, ShimError};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use vessel_vm::{
    BlockDevice, BlockDeviceAttrs, Device, DeviceReceiver, VhostUserDeviceAttrs,
    VhostUserFsDevice,
};

/// A device requested by a container or sandbox.
#[derive(Debug, Clone)]
pub enum DeviceSpec {
    /// Shared filesystem over vhost-user
    VhostUserFs(VhostUserDeviceAttrs),
    /// Host block device
    Block(BlockDeviceAttrs),
}

impl DeviceSpec {
    /// Host path identifying the device.
    pub fn key(&self) -> PathBuf {
        match self {
            DeviceSpec::VhostUserFs(attrs) => attrs.socket_path.clone(),
            DeviceSpec::Block(attrs) => attrs.path.clone(),
        }
    }

    fn build(self) -> Arc<dyn Device> {
        match self {
            DeviceSpec::VhostUserFs(attrs) => Arc::new(VhostUserFsDevice::new(attrs)),
            DeviceSpec::Block(attrs) => Arc::new(BlockDevice::new(attrs)),
        }
    }
}

struct Entry {
    device: Arc<dyn Device>,
    owners: HashSet<String>,
}

/// Devices of the active sandbox, keyed by host path.
#[derive(Default)]
pub struct DeviceManager {
    devices: Mutex<HashMap<PathBuf, Entry>>,
}

impl std::fmt::Debug for DeviceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceManager").finish_non_exhaustive()
    }
}

impl DeviceManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the device described by `spec` on behalf of `owner`.
    ///
    /// The first reference creates the device. Attach is idempotent, so a
    /// device already attached for another container is not resubmitted.
    pub async fn acquire(
        &self,
        owner: &str,
        spec: DeviceSpec,
        receiver: &dyn DeviceReceiver,
    ) -> Result<Arc<dyn Device>> {
        let key = spec.key();
        // The owner is recorded before attaching so a concurrent release
        // never sees the entry as unreferenced while the attach is in flight.
        let (device, newly_owned) = {
            let mut devices = self.devices.lock().await;
            let entry = devices.entry(key.clone()).or_insert_with(|| Entry {
                device: spec.build(),
                owners: HashSet::new(),
            });
            let newly_owned = entry.owners.insert(owner.to_string());
            (entry.device.clone(), newly_owned)
        };

        // Attach outside the map lock; the device serialises its own attach.
        if let Err(e) = device.attach(receiver).await {
            let mut devices = self.devices.lock().await;
            let unreferenced = newly_owned
                && devices.get_mut(&key).is_some_and(|entry| {
                    entry.owners.remove(owner);
                    entry.owners.is_empty()
                });
            if unreferenced {
                devices.remove(&key);
            }
            return Err(ShimError::engine("attach_device", owner)(e));
        }

        tracing::debug!(owner, device = %key.display(), "Device acquired");
        Ok(device)
    }

    /// Drop every reference held by `owner`. Devices left without
    /// references are detached and discarded.
    pub async fn release(&self, owner: &str, receiver: &dyn DeviceReceiver) -> Result<()> {
        let orphaned: Vec<(PathBuf, Arc<dyn Device>)> = {
            let mut devices = self.devices.lock().await;
            for entry in devices.values_mut() {
                entry.owners.remove(owner);
            }
            let keys: Vec<PathBuf> = devices
                .iter()
                .filter(|(_, entry)| entry.owners.is_empty())
                .map(|(key, _)| key.clone())
                .collect();
            keys.into_iter()
                .filter_map(|key| devices.remove(&key).map(|entry| (key, entry.device)))
                .collect()
        };

        let mut result = Ok(());
        for (key, device) in orphaned {
            match device.detach(receiver).await {
                Ok(()) => tracing::debug!(owner, device = %key.display(), "Device detached"),
                Err(e) => {
                    tracing::warn!(owner, device = %key.display(), error = %e, "Device detach failed");
                    if result.is_ok() {
                        result = Err(ShimError::engine("detach_device", owner)(e));
                    }
                }
            }
        }
        result
    }

    /// Tracked device at host path `key`.
    pub async fn device(&self, key: &str) -> Result<Arc<dyn Device>> {
        self.devices
            .lock()
            .await
            .get(&PathBuf::from(key))
            .map(|entry| entry.device.clone())
            .ok_or_else(|| ShimError::DeviceNotFound(key.to_string()))
    }

    /// Containers referencing the device at `key`, sorted.
    pub async fn owners(&self, key: &str) -> Result<Vec<String>> {
        let devices = self.devices.lock().await;
        let entry = devices
            .get(&PathBuf::from(key))
            .ok_or_else(|| ShimError::DeviceNotFound(key.to_string()))?;
        let mut owners: Vec<String> = entry.owners.iter().cloned().collect();
        owners.sort();
        Ok(owners)
    }

    /// Number of tracked devices.
    pub async fn len(&self) -> usize {
        self.devices.lock().await.len()
    }

    /// Whether no device is tracked.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
