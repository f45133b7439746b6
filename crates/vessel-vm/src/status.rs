//! Status reports returned by the engine.

use crate::annotations::{ContainerType, CONTAINER_TYPE_KEY};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Lifecycle state of a sandbox or container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    /// Created but not started
    Created,
    /// Running
    Running,
    /// Stopped
    Stopped,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Created => write!(f, "created"),
            State::Running => write!(f, "running"),
            State::Stopped => write!(f, "stopped"),
        }
    }
}

/// Engine view of a container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerStatus {
    /// Container identifier
    pub id: String,
    /// Current state
    pub state: State,
    /// Host process identifier of the container's init process
    pub pid: u32,
    /// OCI bundle directory the container was created from
    pub bundle: PathBuf,
    /// Annotations recorded at creation
    pub annotations: HashMap<String, String>,
}

impl ContainerStatus {
    /// Raw value of the container-type annotation, if any.
    pub fn container_type_annotation(&self) -> Option<&str> {
        self.annotations.get(CONTAINER_TYPE_KEY).map(String::as_str)
    }

    /// Parsed container type; `None` when the annotation is missing or
    /// holds an unrecognized value.
    pub fn container_type(&self) -> Option<ContainerType> {
        self.container_type_annotation()?.parse().ok()
    }
}

/// Engine view of a sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxStatus {
    /// Sandbox identifier
    pub id: String,
    /// Current state
    pub state: State,
    /// Member containers, root container included
    pub containers: Vec<ContainerStatus>,
}

/// A process to launch inside an existing container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecProcess {
    /// Command and arguments
    pub args: Vec<String>,
    /// Environment (`KEY=value`)
    pub env: Vec<String>,
    /// Working directory inside the container
    pub cwd: String,
    /// Whether the process gets a terminal
    pub terminal: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(annotations: HashMap<String, String>) -> ContainerStatus {
        ContainerStatus {
            id: "c1".into(),
            state: State::Created,
            pid: 42,
            bundle: PathBuf::from("/run/c1"),
            annotations,
        }
    }

    #[test]
    fn test_state_display() {
        assert_eq!(State::Created.to_string(), "created");
        assert_eq!(State::Running.to_string(), "running");
        assert_eq!(State::Stopped.to_string(), "stopped");
    }

    #[test]
    fn test_container_type_from_annotations() {
        let mut annotations = HashMap::new();
        annotations.insert(CONTAINER_TYPE_KEY.to_string(), "pod_container".to_string());
        assert_eq!(
            status(annotations).container_type(),
            Some(ContainerType::PodContainer)
        );
    }

    #[test]
    fn test_container_type_missing_or_unknown() {
        assert_eq!(status(HashMap::new()).container_type(), None);

        let mut annotations = HashMap::new();
        annotations.insert(CONTAINER_TYPE_KEY.to_string(), "errorType".to_string());
        let status = status(annotations);
        assert_eq!(status.container_type_annotation(), Some("errorType"));
        assert_eq!(status.container_type(), None);
    }
}
