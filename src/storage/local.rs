use crate::error::{EtlError, Result};
use crate::storage::ObjectStore;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Object store on the local filesystem: `<root>/<container>/<blob>`.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    fn path_for(&self, container: &str, blob: &str) -> Result<PathBuf> {
        let relative = Path::new(container).join(blob);
        if relative.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Err(EtlError::Storage {
                container: container.to_string(),
                blob: blob.to_string(),
                message: "container and blob must be relative paths without '..'".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn download(&self, container: &str, blob: &str) -> Result<Vec<u8>> {
        let path = self.path_for(container, blob)?;
        tokio::fs::read(&path).await.map_err(|e| EtlError::Storage {
            container: container.to_string(),
            blob: blob.to_string(),
            message: e.to_string(),
        })
    }

    async fn upload(&self, container: &str, blob: &str, data: Vec<u8>, overwrite: bool) -> Result<()> {
        let path = self.path_for(container, blob)?;
        if !overwrite && tokio::fs::try_exists(&path).await? {
            return Err(EtlError::Storage {
                container: container.to_string(),
                blob: blob.to_string(),
                message: "blob exists and overwrite is disabled".to_string(),
            });
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // write beside the target then rename, so readers never see half a blob
        let mut tmp = path.clone().into_os_string();
        tmp.push(".partial");
        if let Err(e) = tokio::fs::write(&tmp, &data).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!("Wrote {} bytes to {}", data.len(), path.display());
        Ok(())
    }
}
