//! Durable container-to-sandbox identity mappings.
//!
//! An entry exists for every container this shim has created and not yet
//! deleted. After a restart the entries are the only record of which
//! containers belong to which sandbox.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};

/// Storage for container-ID to sandbox-ID mappings.
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Record that `container_id` belongs to `sandbox_id`.
    async fn add(&self, container_id: &str, sandbox_id: &str) -> io::Result<()>;

    /// Owning sandbox of `container_id`, if mapped.
    async fn fetch(&self, container_id: &str) -> io::Result<Option<String>>;

    /// Remove the mapping. Removing an absent mapping succeeds.
    async fn delete(&self, container_id: &str) -> io::Result<()>;

    /// Every `(container_id, sandbox_id)` pair.
    async fn entries(&self) -> io::Result<Vec<(String, String)>>;
}

/// One file per container under a root directory; content is the sandbox ID.
#[derive(Debug, Clone)]
pub struct FsMappingStore {
    root: PathBuf,
}

impl FsMappingStore {
    /// Store rooted at `root`. The directory is created on first write.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, container_id: &str) -> PathBuf {
        self.root.join(container_id)
    }
}

#[async_trait]
impl MappingStore for FsMappingStore {
    async fn add(&self, container_id: &str, sandbox_id: &str) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;

        // Temp names start with '.' so `entries` never reports them.
        let tmp = self
            .root
            .join(format!(".{container_id}.{}.tmp", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, sandbox_id).await?;
        if let Err(e) = tokio::fs::rename(&tmp, self.entry_path(container_id)).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }

        tracing::debug!(container_id, sandbox_id, "Mapping added");
        Ok(())
    }

    async fn fetch(&self, container_id: &str) -> io::Result<Option<String>> {
        match tokio::fs::read_to_string(self.entry_path(container_id)).await {
            Ok(sandbox_id) => Ok(Some(sandbox_id.trim().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, container_id: &str) -> io::Result<()> {
        match tokio::fs::remove_file(self.entry_path(container_id)).await {
            Ok(()) => {
                tracing::debug!(container_id, "Mapping deleted");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn entries(&self) -> io::Result<Vec<(String, String)>> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let Ok(container_id) = entry.file_name().into_string() else {
                continue;
            };
            if container_id.starts_with('.') {
                continue;
            }
            if let Some(sandbox_id) = self.fetch(&container_id).await? {
                entries.push((container_id, sandbox_id));
            }
        }
        entries.sort();
        Ok(entries)
    }
}
