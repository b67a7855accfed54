pub mod local;
pub mod tabular;

use crate::error::{EtlError, Result};
use crate::types::RowSet;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

pub use local::LocalObjectStore;

/// Blob storage split into containers (the raw and curated tiers).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn download(&self, container: &str, blob: &str) -> Result<Vec<u8>>;

    /// Store `data`. With `overwrite` false an existing blob is an error.
    async fn upload(&self, container: &str, blob: &str, data: Vec<u8>, overwrite: bool) -> Result<()>;
}

/// Encode `rows` and upload them, replacing whatever was there.
pub async fn upload_rowset(store: &dyn ObjectStore, container: &str, blob: &str, rows: &RowSet) -> Result<()> {
    let data = tabular::encode(rows)?;
    store.upload(container, blob, data, true).await?;
    info!("Uploaded dataset of {} rows to {}/{}", rows.len(), container, blob);
    Ok(())
}

/// Download and decode a dataset.
pub async fn download_rowset(store: &dyn ObjectStore, container: &str, blob: &str) -> Result<RowSet> {
    let data = store.download(container, blob).await?;
    let rows = tabular::decode(&data)?;
    info!("Downloaded dataset of {} rows from {}/{}", rows.len(), container, blob);
    Ok(rows)
}

/// In-memory object store for development/testing
#[derive(Default, Clone)]
pub struct InMemoryObjectStore {
    blobs: Arc<Mutex<HashMap<(String, String), Vec<u8>>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, container: &str, blob: &str) -> bool {
        self.lock().contains_key(&(container.to_string(), blob.to_string()))
    }

    pub fn blob_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), Vec<u8>>> {
        // a poisoned map is still consistent: every write is a single insert
        self.blobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn download(&self, container: &str, blob: &str) -> Result<Vec<u8>> {
        self.lock()
            .get(&(container.to_string(), blob.to_string()))
            .cloned()
            .ok_or_else(|| EtlError::Storage {
                container: container.to_string(),
                blob: blob.to_string(),
                message: "blob not found".to_string(),
            })
    }

    async fn upload(&self, container: &str, blob: &str, data: Vec<u8>, overwrite: bool) -> Result<()> {
        let key = (container.to_string(), blob.to_string());
        let mut blobs = self.lock();
        if !overwrite && blobs.contains_key(&key) {
            return Err(EtlError::Storage {
                container: container.to_string(),
                blob: blob.to_string(),
                message: "blob exists and overwrite is disabled".to_string(),
            });
        }
        debug!("Stored {} bytes at {}/{}", data.len(), container, blob);
        blobs.insert(key, data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_upload_and_download() {
        let store = InMemoryObjectStore::new();
        store.upload("raw", "a.csv", b"id\n1\n".to_vec(), true).await.unwrap();
        assert_eq!(store.download("raw", "a.csv").await.unwrap(), b"id\n1\n".to_vec());
        assert!(store.download("curated", "a.csv").await.is_err());
    }

    #[tokio::test]
    async fn test_in_memory_respects_overwrite_flag() {
        let store = InMemoryObjectStore::new();
        store.upload("raw", "a.csv", b"1".to_vec(), false).await.unwrap();
        assert!(store.upload("raw", "a.csv", b"2".to_vec(), false).await.is_err());
        store.upload("raw", "a.csv", b"3".to_vec(), true).await.unwrap();
        assert_eq!(store.download("raw", "a.csv").await.unwrap(), b"3".to_vec());
        assert_eq!(store.blob_count(), 1);
    }

    #[tokio::test]
    async fn test_rowset_helpers_round_trip_through_store() {
        let store = InMemoryObjectStore::new();
        let rows = RowSet::from_rows(
            vec!["id".to_string(), "name".to_string()],
            vec![vec![Some("1".into()), None]],
        )
        .unwrap();

        upload_rowset(&store, "raw", "users.csv", &rows).await.unwrap();
        let back = download_rowset(&store, "raw", "users.csv").await.unwrap();
        assert_eq!(back, rows);
    }
}
