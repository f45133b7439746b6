//! Error types for vessel-vm.

use thiserror::Error;

/// Result type alias for vessel-vm operations.
pub type Result<T> = std::result::Result<T, VmError>;

/// Errors reported by the hypervisor-backed engine and by device attachment.
#[derive(Debug, Error)]
pub enum VmError {
    /// The hypervisor failed to carry out an operation.
    #[error("hypervisor error: {0}")]
    Hypervisor(String),

    /// Sandbox or container is not in the state the operation needs
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// The engine does not know the sandbox.
    #[error("sandbox not found: {0}")]
    SandboxNotFound(String),

    /// The engine does not know the container.
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// The engine does not know the process.
    #[error("process {process_id} not found in container {container_id}")]
    ProcessNotFound {
        /// Owning container
        container_id: String,
        /// Process (exec) identifier
        process_id: String,
    },

    /// The receiver refused a device descriptor.
    #[error("device {id} rejected: {reason}")]
    DeviceRejected {
        /// Generated device identifier
        id: String,
        /// Receiver-provided reason
        reason: String,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Injected failure from the mock engine.
    #[error("mock failure in {0}")]
    Mock(&'static str),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VmError {
    /// Check if this error was injected by the mock engine.
    pub fn is_mock(&self) -> bool {
        matches!(self, VmError::Mock(_))
    }

    /// Check if this error indicates a not-found condition.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            VmError::SandboxNotFound(_)
                | VmError::ContainerNotFound(_)
                | VmError::ProcessNotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VmError::ProcessNotFound {
            container_id: "c1".into(),
            process_id: "e1".into(),
        };
        assert_eq!(err.to_string(), "process e1 not found in container c1");
    }

    #[test]
    fn test_is_not_found() {
        assert!(VmError::ContainerNotFound("c1".into()).is_not_found());
        assert!(!VmError::Hypervisor("boom".into()).is_not_found());
        assert!(!VmError::Hypervisor("boom".into()).is_mock());
    }
}
