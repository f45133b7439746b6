//! In-memory engine used by tests.
//!
//! Every engine operation can be made to fail with [`VmError::Mock`] by
//! naming it through [`MockEngine::fail`]. Operation names match the trait
//! methods, except sandbox lifecycle calls which are `start_sandbox`,
//! `stop_sandbox`, `delete_sandbox` and `status_sandbox`.

use crate::config::{ContainerConfig, SandboxConfig};
use crate::device::{DeviceDescriptor, DeviceReceiver};
use crate::engine::{Sandbox, SandboxEngine};
use crate::error::{Result, VmError};
use crate::status::{ContainerStatus, ExecProcess, SandboxStatus, State};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

const SIGKILL: u32 = 9;
const SIGTERM: u32 = 15;

/// Operations currently set to fail.
#[derive(Debug, Default)]
struct Failpoints {
    ops: Mutex<HashSet<&'static str>>,
}

impl Failpoints {
    async fn check(&self, op: &'static str) -> Result<()> {
        if self.ops.lock().await.contains(op) {
            tracing::debug!(op, "Injecting mock failure");
            return Err(VmError::Mock(op));
        }
        Ok(())
    }
}

/// Engine double that keeps every sandbox in memory.
#[derive(Debug, Default)]
pub struct MockEngine {
    sandboxes: Mutex<HashMap<String, Arc<MockSandbox>>>,
    failpoints: Arc<Failpoints>,
    next_pid: Arc<AtomicU32>,
}

impl MockEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self {
            next_pid: Arc::new(AtomicU32::new(1000)),
            ..Default::default()
        }
    }

    /// Make `op` fail until [`heal`](Self::heal) is called.
    pub async fn fail(&self, op: &'static str) {
        self.failpoints.ops.lock().await.insert(op);
    }

    /// Stop failing `op`.
    pub async fn heal(&self, op: &'static str) {
        self.failpoints.ops.lock().await.remove(op);
    }

    /// Look up a sandbox created through this engine.
    pub async fn sandbox(&self, sandbox_id: &str) -> Option<Arc<MockSandbox>> {
        self.sandboxes.lock().await.get(sandbox_id).cloned()
    }

    /// Number of sandboxes created and not yet deleted.
    pub async fn live_sandboxes(&self) -> usize {
        let sandboxes = self.sandboxes.lock().await;
        sandboxes.values().filter(|s| !s.is_deleted()).count()
    }
}

#[async_trait]
impl SandboxEngine for MockEngine {
    async fn create_sandbox(&self, config: SandboxConfig) -> Result<Arc<dyn Sandbox>> {
        self.failpoints.check("create_sandbox").await?;
        config.validate()?;

        let mut sandboxes = self.sandboxes.lock().await;
        if let Some(existing) = sandboxes.get(&config.id) {
            if !existing.is_deleted() {
                return Err(VmError::Hypervisor(format!(
                    "sandbox {} already exists",
                    config.id
                )));
            }
        }

        let sandbox = Arc::new(MockSandbox::new(
            &config,
            self.failpoints.clone(),
            self.next_pid.clone(),
        ));
        sandboxes.insert(config.id.clone(), sandbox.clone());
        Ok(sandbox)
    }

    async fn fetch_sandbox(&self, sandbox_id: &str) -> Result<Arc<dyn Sandbox>> {
        self.failpoints.check("fetch_sandbox").await?;
        match self.sandbox(sandbox_id).await {
            Some(sandbox) if !sandbox.is_deleted() => Ok(sandbox),
            _ => Err(VmError::SandboxNotFound(sandbox_id.to_string())),
        }
    }
}

/// Sandbox double.
#[derive(Debug)]
pub struct MockSandbox {
    id: String,
    pid: u32,
    state: Mutex<State>,
    deleted: AtomicBool,
    containers: Mutex<HashMap<String, ContainerStatus>>,
    /// Live exec processes keyed by (container, process)
    processes: Mutex<HashMap<(String, String), u32>>,
    exits: Mutex<HashMap<(String, String), u32>>,
    exit_notify: Notify,
    devices: Mutex<Vec<DeviceDescriptor>>,
    failpoints: Arc<Failpoints>,
    next_pid: Arc<AtomicU32>,
}

impl MockSandbox {
    fn new(config: &SandboxConfig, failpoints: Arc<Failpoints>, next_pid: Arc<AtomicU32>) -> Self {
        let pid = next_pid.fetch_add(1, Ordering::SeqCst);
        let root = ContainerStatus {
            id: config.container.id.clone(),
            state: State::Created,
            pid,
            bundle: config.container.bundle.clone(),
            annotations: config.container.annotations.clone(),
        };
        Self {
            id: config.id.clone(),
            pid,
            state: Mutex::new(State::Created),
            deleted: AtomicBool::new(false),
            containers: Mutex::new(HashMap::from([(root.id.clone(), root)])),
            processes: Mutex::new(HashMap::new()),
            exits: Mutex::new(HashMap::new()),
            exit_notify: Notify::new(),
            devices: Mutex::new(Vec::new()),
            failpoints,
            next_pid,
        }
    }

    /// Whether `delete` has completed.
    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }

    /// Current sandbox state.
    pub async fn state(&self) -> State {
        *self.state.lock().await
    }

    /// Devices appended so far, in order.
    pub async fn devices(&self) -> Vec<DeviceDescriptor> {
        self.devices.lock().await.clone()
    }

    /// Engine record of a container.
    pub async fn container(&self, container_id: &str) -> Option<ContainerStatus> {
        self.containers.lock().await.get(container_id).cloned()
    }

    /// Replace the annotations the engine reports for a container.
    pub async fn set_annotations(&self, container_id: &str, annotations: HashMap<String, String>) {
        if let Some(status) = self.containers.lock().await.get_mut(container_id) {
            status.annotations = annotations;
        }
    }

    /// Make a process exit with `code`, waking any `wait_process` caller.
    pub async fn exit_process(&self, container_id: &str, process_id: &str, code: u32) {
        if container_id == process_id {
            if let Some(status) = self.containers.lock().await.get_mut(container_id) {
                status.state = State::Stopped;
            }
        } else {
            self.processes
                .lock()
                .await
                .remove(&(container_id.to_string(), process_id.to_string()));
        }
        self.exits
            .lock()
            .await
            .insert((container_id.to_string(), process_id.to_string()), code);
        self.exit_notify.notify_waiters();
    }

    fn alloc_pid(&self) -> u32 {
        self.next_pid.fetch_add(1, Ordering::SeqCst)
    }

    async fn with_container<R>(
        &self,
        container_id: &str,
        f: impl FnOnce(&mut ContainerStatus) -> Result<R>,
    ) -> Result<R> {
        let mut containers = self.containers.lock().await;
        let status = containers
            .get_mut(container_id)
            .ok_or_else(|| VmError::ContainerNotFound(container_id.to_string()))?;
        f(status)
    }
}

#[async_trait]
impl DeviceReceiver for MockSandbox {
    async fn append_device(&self, device: DeviceDescriptor) -> Result<()> {
        self.failpoints.check("append_device").await?;
        self.devices.lock().await.push(device);
        Ok(())
    }
}

#[async_trait]
impl Sandbox for MockSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    fn pid(&self) -> u32 {
        self.pid
    }

    fn as_device_receiver(&self) -> &dyn DeviceReceiver {
        self
    }

    async fn start(&self) -> Result<()> {
        self.failpoints.check("start_sandbox").await?;
        *self.state.lock().await = State::Running;
        let id = self.id.clone();
        self.with_container(&id, |status| {
            status.state = State::Running;
            Ok(())
        })
        .await
    }

    async fn stop(&self) -> Result<()> {
        self.failpoints.check("stop_sandbox").await?;
        let ids: Vec<String> = {
            let mut containers = self.containers.lock().await;
            containers
                .values_mut()
                .filter(|status| status.state == State::Running)
                .map(|status| {
                    status.state = State::Stopped;
                    status.id.clone()
                })
                .collect()
        };
        for id in ids {
            self.exit_process(&id, &id, 128 + SIGKILL).await;
        }
        *self.state.lock().await = State::Stopped;
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        self.failpoints.check("delete_sandbox").await?;
        let state = *self.state.lock().await;
        if state == State::Running {
            return Err(VmError::InvalidState {
                expected: "stopped".into(),
                actual: state.to_string(),
            });
        }
        self.containers.lock().await.clear();
        self.deleted.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn status(&self) -> Result<SandboxStatus> {
        self.failpoints.check("status_sandbox").await?;
        let containers = self.containers.lock().await.values().cloned().collect();
        Ok(SandboxStatus {
            id: self.id.clone(),
            state: *self.state.lock().await,
            containers,
        })
    }

    async fn create_container(&self, config: ContainerConfig) -> Result<u32> {
        self.failpoints.check("create_container").await?;
        config.validate()?;
        let mut containers = self.containers.lock().await;
        if containers.contains_key(&config.id) {
            return Err(VmError::Hypervisor(format!(
                "container {} already exists",
                config.id
            )));
        }
        let pid = self.alloc_pid();
        containers.insert(
            config.id.clone(),
            ContainerStatus {
                id: config.id,
                state: State::Created,
                pid,
                bundle: config.bundle,
                annotations: config.annotations,
            },
        );
        Ok(pid)
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        self.failpoints.check("start_container").await?;
        self.with_container(container_id, |status| {
            status.state = State::Running;
            Ok(())
        })
        .await
    }

    async fn stop_container(&self, container_id: &str) -> Result<()> {
        self.failpoints.check("stop_container").await?;
        self.with_container(container_id, |status| {
            status.state = State::Stopped;
            Ok(())
        })
        .await?;
        self.exit_process(container_id, container_id, 128 + SIGKILL)
            .await;
        Ok(())
    }

    async fn delete_container(&self, container_id: &str) -> Result<()> {
        self.failpoints.check("delete_container").await?;
        let mut containers = self.containers.lock().await;
        match containers.get(container_id) {
            None => Err(VmError::ContainerNotFound(container_id.to_string())),
            Some(status) if status.state == State::Running => Err(VmError::InvalidState {
                expected: "stopped".into(),
                actual: status.state.to_string(),
            }),
            Some(_) => {
                containers.remove(container_id);
                Ok(())
            }
        }
    }

    async fn status_container(&self, container_id: &str) -> Result<ContainerStatus> {
        self.failpoints.check("status_container").await?;
        self.container(container_id)
            .await
            .ok_or_else(|| VmError::ContainerNotFound(container_id.to_string()))
    }

    async fn enter_container(
        &self,
        container_id: &str,
        process_id: &str,
        _process: ExecProcess,
    ) -> Result<u32> {
        self.failpoints.check("enter_container").await?;
        self.with_container(container_id, |status| match status.state {
            State::Running => Ok(()),
            state => Err(VmError::InvalidState {
                expected: "running".into(),
                actual: state.to_string(),
            }),
        })
        .await?;
        let pid = self.alloc_pid();
        self.processes
            .lock()
            .await
            .insert((container_id.to_string(), process_id.to_string()), pid);
        Ok(pid)
    }

    async fn signal_process(&self, container_id: &str, process_id: &str, signal: u32)
        -> Result<()> {
        self.failpoints.check("signal_process").await?;
        let known = if container_id == process_id {
            self.container(container_id).await.is_some()
        } else {
            self.processes
                .lock()
                .await
                .contains_key(&(container_id.to_string(), process_id.to_string()))
        };
        if !known {
            return Err(VmError::ProcessNotFound {
                container_id: container_id.to_string(),
                process_id: process_id.to_string(),
            });
        }
        if signal == SIGKILL || signal == SIGTERM {
            self.exit_process(container_id, process_id, 128 + signal)
                .await;
        }
        Ok(())
    }

    async fn wait_process(&self, container_id: &str, process_id: &str) -> Result<u32> {
        self.failpoints.check("wait_process").await?;
        let key = (container_id.to_string(), process_id.to_string());
        loop {
            let notified = self.exit_notify.notified();
            if let Some(code) = self.exits.lock().await.get(&key) {
                return Ok(*code);
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HypervisorConfig;
    use std::path::PathBuf;

    fn sandbox_config(id: &str) -> SandboxConfig {
        SandboxConfig {
            id: id.into(),
            hypervisor: HypervisorConfig::default(),
            vcpus: 1,
            memory_mib: 256,
            annotations: HashMap::new(),
            container: ContainerConfig {
                id: id.into(),
                bundle: PathBuf::from("/run/bundle"),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_mock_failpoint() {
        let engine = MockEngine::new();
        engine.fail("create_sandbox").await;
        let err = engine.create_sandbox(sandbox_config("sb")).await.err().unwrap();
        assert!(err.is_mock());

        engine.heal("create_sandbox").await;
        assert!(engine.create_sandbox(sandbox_config("sb")).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_wait_process_wakes_on_exit() {
        let engine = MockEngine::new();
        let sandbox = engine.create_sandbox(sandbox_config("sb")).await.unwrap();
        sandbox.start().await.unwrap();

        let mock = engine.sandbox("sb").await.unwrap();
        let waiter = tokio::spawn(async move { mock.wait_process("sb", "sb").await });
        tokio::task::yield_now().await;

        sandbox.signal_process("sb", "sb", SIGTERM).await.unwrap();
        assert_eq!(waiter.await.unwrap().unwrap(), 128 + SIGTERM);
    }

    #[tokio::test]
    async fn test_mock_delete_requires_stop() {
        let engine = MockEngine::new();
        let sandbox = engine.create_sandbox(sandbox_config("sb")).await.unwrap();
        sandbox.start().await.unwrap();
        assert!(sandbox.delete().await.is_err());

        sandbox.stop().await.unwrap();
        sandbox.delete().await.unwrap();
        assert_eq!(engine.live_sandboxes().await, 0);
        assert!(engine.fetch_sandbox("sb").await.is_err());
    }
}
