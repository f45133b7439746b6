//! Error types for vessel-shim.

use std::path::PathBuf;
use thiserror::Error;
use vessel_vm::VmError;

/// Result type alias for vessel-shim operations.
pub type Result<T> = std::result::Result<T, ShimError>;

/// Coarse error category reported to the task protocol caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed request, bundle or annotations. Never retried.
    Classification,
    /// Unknown container, exec session or device.
    NotFound,
    /// The identifier is already taken.
    AlreadyExists,
    /// The hypervisor-backed engine failed.
    Engine,
    /// Durable identity mappings could not be updated.
    StateCorruption,
    /// Local I/O or decoding failure.
    Internal,
}

/// Errors returned by the lifecycle controller.
#[derive(Debug, Error)]
pub enum ShimError {
    /// Container-type annotation holds an unknown value
    #[error("invalid container type {value:?} in annotation {key}")]
    InvalidContainerType {
        /// Annotation key
        key: String,
        /// Offending value
        value: String,
    },

    /// No container-type annotation where one is required
    #[error("container {0} has no container type annotation")]
    MissingContainerType(String),

    /// Member container without a sandbox-ID annotation
    #[error("container {0} has no sandbox id annotation")]
    MissingSandboxId(String),

    /// Referenced sandbox was never created by this shim
    #[error("sandbox {0} has not been created by this shim")]
    SandboxNotCreated(String),

    /// This shim already runs a sandbox
    #[error("shim already owns sandbox {0}")]
    SandboxExists(String),

    /// Sandbox deletion requested while members are still registered
    #[error("sandbox {sandbox_id} still has {members} member container(s)")]
    SandboxInUse {
        /// Sandbox identifier
        sandbox_id: String,
        /// Number of registered member containers
        members: usize,
    },

    /// Container identifier is not usable
    #[error("invalid container id {0:?}")]
    InvalidContainerId(String),

    /// Resource limits are malformed
    #[error("invalid resources: {0}")]
    InvalidResources(String),

    /// Bundle could not be loaded
    #[error("invalid bundle {path}: {reason}")]
    Bundle {
        /// Bundle directory
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// Exec process spec could not be decoded
    #[error("invalid exec process spec: {0}")]
    ProcessSpec(#[from] serde_json::Error),

    /// Container ID is already registered or mapped
    #[error("container id {0} is already in use")]
    IdInUse(String),

    /// Exec ID is already registered in the container
    #[error("exec {exec_id} already exists in container {container_id}")]
    ExecExists {
        /// Owning container
        container_id: String,
        /// Exec session identifier
        exec_id: String,
    },

    /// Container not registered
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// Exec session not registered
    #[error("exec does not exist: {exec_id} in container {container_id}")]
    ExecNotFound {
        /// Owning container
        container_id: String,
        /// Exec session identifier
        exec_id: String,
    },

    /// Device not tracked
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// An engine call failed
    #[error("{op} failed for {id}: {source}")]
    Engine {
        /// Engine operation name
        op: &'static str,
        /// Target sandbox or container
        id: String,
        /// Engine error
        #[source]
        source: VmError,
    },

    /// Identity mapping store failure
    #[error("identity mapping {op} failed for {id}: {source}")]
    Mapping {
        /// Store operation name
        op: &'static str,
        /// Container identifier
        id: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShimError {
    /// Wrap an engine error with the failing operation and target.
    ///
    /// ```ignore
    /// sandbox.start_container(id).await.map_err(ShimError::engine("start_container", id))?;
    /// ```
    pub fn engine(op: &'static str, id: &str) -> impl FnOnce(VmError) -> ShimError {
        let id = id.to_string();
        move |source| ShimError::Engine { op, id, source }
    }

    /// Wrap a mapping store error with the failing operation and target.
    pub fn mapping(op: &'static str, id: &str) -> impl FnOnce(std::io::Error) -> ShimError {
        let id = id.to_string();
        move |source| ShimError::Mapping { op, id, source }
    }

    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShimError::InvalidContainerType { .. }
            | ShimError::MissingContainerType(_)
            | ShimError::MissingSandboxId(_)
            | ShimError::SandboxNotCreated(_)
            | ShimError::SandboxExists(_)
            | ShimError::SandboxInUse { .. }
            | ShimError::InvalidContainerId(_)
            | ShimError::InvalidResources(_)
            | ShimError::Bundle { .. }
            | ShimError::ProcessSpec(_) => ErrorKind::Classification,
            ShimError::IdInUse(_) | ShimError::ExecExists { .. } => ErrorKind::AlreadyExists,
            ShimError::ContainerNotFound(_)
            | ShimError::ExecNotFound { .. }
            | ShimError::DeviceNotFound(_) => ErrorKind::NotFound,
            ShimError::Engine { .. } => ErrorKind::Engine,
            ShimError::Mapping { .. } => ErrorKind::StateCorruption,
            ShimError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Returns true for classification errors.
    pub fn is_classification(&self) -> bool {
        self.kind() == ErrorKind::Classification
    }

    /// Returns true for not-found errors.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Engine error carried by this error, if any.
    pub fn engine_error(&self) -> Option<&VmError> {
        match self {
            ShimError::Engine { source, .. } => Some(source),
            _ => None,
        }
    }
}
