//! # vessel-shim
//!
//! Task lifecycle control layer for vessel sandboxes. Receives create,
//! start, delete and exec calls from a container manager and turns them
//! into sandbox and container operations on a [`vessel_vm::SandboxEngine`].
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                        Service                            │
//! │  ┌──────────┐  ┌────────────┐  ┌──────────┐  ┌─────────┐  │
//! │  │  Bundle  │  │  Registry  │  │ Mappings │  │ Devices │  │
//! │  └──────────┘  └────────────┘  └──────────┘  └─────────┘  │
//! └──────────────────────────┬────────────────────────────────┘
//!                            │ SandboxEngine / Sandbox
//!                   ┌────────▼────────┐
//!                   │   vessel-vm     │
//!                   └─────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use vessel_shim::{CreateRequest, Service, ShimConfig, StartRequest};
//!
//! let config = ShimConfig::from_env();
//! config.validate()?;
//! let service = Service::new(config, engine);
//!
//! service.create(CreateRequest {
//!     id: "pod-1".into(),
//!     bundle: "/run/containerd/io.containerd.runtime.v2.task/k8s.io/pod-1".into(),
//!     ..Default::default()
//! }).await?;
//! service.start(StartRequest { id: "pod-1".into(), exec_id: None }).await?;
//! ```

pub mod bundle;
mod config;
pub mod container;
pub mod devices;
mod error;
pub mod exit;
pub mod mapping;
pub mod mount;
pub mod registry;
mod service;
mod types;

pub use bundle::{Bundle, Role};
pub use config::{ConfigError, SharedFsConfig, ShimConfig};
pub use container::{Container, Exec, ExitInfo, ProcessHandle, ProcessIo, ProcessSnapshot};
pub use devices::{DeviceManager, DeviceSpec};
pub use error::{ErrorKind, Result, ShimError};
pub use exit::ExitSignal;
pub use mapping::{FsMappingStore, MappingStore};
pub use registry::Registry;
pub use service::Service;
pub use types::{
    CreateRequest, CreateResponse, DeleteRequest, DeleteResponse, ExecRequest, KillRequest,
    StartRequest, StartResponse, StateRequest, StateResponse, WaitRequest, WaitResponse,
};
