#![allow(dead_code)]

use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;
use vessel_shim::{CreateRequest, CreateResponse, MappingStore, Result, Service, ShimConfig};
use vessel_vm::mock::{MockEngine, MockSandbox};

pub const CRI_TYPE: &str = "io.kubernetes.cri.container-type";
pub const CRI_SANDBOX_ID: &str = "io.kubernetes.cri.sandbox-id";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A service over a mock engine with bundles and mappings in a temp dir.
pub struct Harness {
    pub dir: TempDir,
    pub engine: Arc<MockEngine>,
    pub service: Service,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(configure: impl FnOnce(&mut ShimConfig)) -> Self {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let mut config = ShimConfig::with_mapping_root(dir.path().join("mapping"));
        configure(&mut config);
        let engine = Arc::new(MockEngine::new());
        let service = Service::new(config, engine.clone());
        Self {
            dir,
            engine,
            service,
        }
    }

    pub fn with_store(store: Arc<dyn MappingStore>) -> Self {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let config = ShimConfig::with_mapping_root(dir.path().join("mapping"));
        let engine = Arc::new(MockEngine::new());
        let service = Service::with_mapping_store(config, engine.clone(), store);
        Self {
            dir,
            engine,
            service,
        }
    }

    /// A second service sharing this harness's engine and mapping root, as
    /// after a shim restart.
    pub fn restarted(&self) -> Service {
        let config = ShimConfig::with_mapping_root(self.dir.path().join("mapping"));
        Service::new(config, self.engine.clone())
    }

    /// Write a bundle whose config.json carries `annotations` and `linux`.
    pub fn bundle_with(&self, name: &str, annotations: &[(&str, &str)], linux: Value) -> PathBuf {
        let path = self.dir.path().join("bundles").join(name);
        std::fs::create_dir_all(&path).unwrap();
        let annotations: HashMap<&str, &str> = annotations.iter().copied().collect();
        let config = json!({
            "ociVersion": "1.0.2",
            "root": { "path": "rootfs" },
            "process": {
                "user": { "uid": 0, "gid": 0 },
                "args": ["/pause"],
                "cwd": "/"
            },
            "annotations": annotations,
            "linux": linux
        });
        std::fs::write(path.join("config.json"), config.to_string()).unwrap();
        path
    }

    pub fn bundle(&self, name: &str, annotations: &[(&str, &str)]) -> PathBuf {
        self.bundle_with(name, annotations, json!({}))
    }

    pub async fn create_sandbox(&self, id: &str) -> Result<CreateResponse> {
        let bundle = self.bundle(id, &[(CRI_TYPE, "sandbox")]);
        self.service.create(request(id, bundle)).await
    }

    pub async fn create_container(&self, id: &str, sandbox_id: &str) -> Result<CreateResponse> {
        let bundle = self.bundle(id, &[(CRI_TYPE, "container"), (CRI_SANDBOX_ID, sandbox_id)]);
        self.service.create(request(id, bundle)).await
    }

    pub async fn mapping(&self, id: &str) -> Option<String> {
        self.service.mappings().fetch(id).await.unwrap()
    }

    pub async fn sandbox(&self, id: &str) -> Arc<MockSandbox> {
        self.engine.sandbox(id).await.unwrap()
    }
}

pub fn request(id: &str, bundle: PathBuf) -> CreateRequest {
    CreateRequest {
        id: id.to_string(),
        bundle,
        stdout: format!("/run/vessel/{id}/stdout"),
        ..Default::default()
    }
}
