//! # vessel-vm
//!
//! Engine layer for vessel sandboxes. Defines the contract the shim uses to
//! drive a hypervisor-backed sandbox and the virtual devices that can be
//! attached to one.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐  create/fetch   ┌──────────────────┐
//! │  SandboxEngine   │ ──────────────► │ Arc<dyn Sandbox> │
//! └──────────────────┘                 └────────┬─────────┘
//!                                               │ DeviceReceiver
//!                                    ┌──────────▼─────────┐
//!                                    │  dyn Device        │
//!                                    │  (GenericDevice)   │
//!                                    └────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use vessel_vm::{Device, Sandbox, SandboxEngine, VhostUserDeviceAttrs, VhostUserFsDevice};
//!
//! # async fn example(engine: &dyn SandboxEngine) -> vessel_vm::Result<()> {
//! let sandbox = engine.fetch_sandbox("pod-1").await?;
//!
//! let fs = VhostUserFsDevice::new(VhostUserDeviceAttrs {
//!     socket_path: "/run/vessel/pod-1/vhost-fs.sock".into(),
//!     tag: "vessel-shared".into(),
//!     cache_size: 0,
//!     cache: "auto".into(),
//! });
//! fs.attach(sandbox.as_device_receiver()).await?;
//! assert_eq!(fs.attach_count().await, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - `mock`: in-memory [`mock::MockEngine`] with per-operation fault injection

pub mod annotations;
mod config;
pub mod device;
mod engine;
mod error;
#[cfg(feature = "mock")]
pub mod mock;
mod status;

pub use annotations::ContainerType;
pub use config::{ContainerConfig, HypervisorConfig, SandboxConfig};
pub use device::{
    BlockDevice, BlockDeviceAttrs, Device, DeviceAttrs, DeviceDescriptor, DeviceInfo,
    DeviceReceiver, DeviceType, GenericDevice, NetworkDevice, NetworkDeviceAttrs,
    VhostUserDeviceAttrs, VhostUserFsDevice,
};
pub use engine::{Sandbox, SandboxEngine};
pub use error::{Result, VmError};
pub use status::{ContainerStatus, ExecProcess, SandboxStatus, State};
