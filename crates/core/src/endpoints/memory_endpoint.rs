//! In-memory endpoint used as a test double and for dry runs.
//!
//! Records every upload and delete so tests can assert on exactly what the
//! sync engine did. Failures can be injected per photo id.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use log::debug;

use super::endpoints_traits::{Endpoint, EndpointCapabilities};
use super::lifecycle::Lifecycle;
use crate::errors::{Error, Result};
use crate::photos::{Photo, PhotoBackend};

#[derive(Debug, Clone)]
struct StoredItem {
    id: String,
    filename: String,
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct MemoryStore {
    items: Mutex<Vec<StoredItem>>,
    failing_uploads: Mutex<HashSet<String>>,
    refuse_deletes: Mutex<bool>,
    upload_calls: Mutex<Vec<String>>,
    delete_calls: Mutex<Vec<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl PhotoBackend for MemoryStore {
    async fn download(&self, photo_id: &str) -> Result<Vec<u8>> {
        lock(&self.items)
            .iter()
            .find(|item| item.id == photo_id)
            .map(|item| item.bytes.clone())
            .ok_or_else(|| Error::transfer(format!("photo '{}' no longer exists", photo_id)))
    }

    async fn delete(&self, photo_id: &str) -> Result<bool> {
        lock(&self.delete_calls).push(photo_id.to_string());
        if *lock(&self.refuse_deletes) {
            return Ok(false);
        }
        let mut items = lock(&self.items);
        let before = items.len();
        items.retain(|item| item.id != photo_id);
        Ok(items.len() != before)
    }
}

/// Endpoint backed by a `Vec` in memory.
pub struct MemoryEndpoint {
    name: String,
    lifecycle: Lifecycle,
    store: Arc<MemoryStore>,
    read_only: bool,
}

impl MemoryEndpoint {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            lifecycle: Lifecycle::new(name.clone()),
            name,
            store: Arc::new(MemoryStore::default()),
            read_only: false,
        }
    }

    /// Reject uploads, like a cloud source.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn with_photo(self, id: &str, filename: &str, bytes: &[u8]) -> Self {
        self.add_photo(id, filename, bytes);
        self
    }

    pub fn add_photo(&self, id: &str, filename: &str, bytes: &[u8]) {
        lock(&self.store.items).push(StoredItem {
            id: id.to_string(),
            filename: filename.to_string(),
            bytes: bytes.to_vec(),
        });
    }

    /// Make every upload of `photo_id` fail with a transfer error.
    pub fn fail_uploads_for(&self, photo_id: &str) {
        lock(&self.store.failing_uploads).insert(photo_id.to_string());
    }

    /// Make deletes report `false` and keep the photo.
    pub fn refuse_deletes(&self) {
        *lock(&self.store.refuse_deletes) = true;
    }

    /// Ids passed to `upload()`, in call order, including failed attempts.
    pub fn upload_calls(&self) -> Vec<String> {
        lock(&self.store.upload_calls).clone()
    }

    /// Ids passed to `delete()` on photos from this endpoint, in call order.
    pub fn delete_calls(&self) -> Vec<String> {
        lock(&self.store.delete_calls).clone()
    }

    /// Ids currently stored.
    pub fn ids(&self) -> Vec<String> {
        lock(&self.store.items).iter().map(|item| item.id.clone()).collect()
    }
}

#[async_trait]
impl Endpoint for MemoryEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> EndpointCapabilities {
        EndpointCapabilities {
            albums: false,
            upload: !self.read_only,
            delete: true,
        }
    }

    async fn initialize(&self) -> Result<()> {
        self.lifecycle.mark_ready();
        Ok(())
    }

    async fn photos(&self) -> Result<Vec<Photo>> {
        self.lifecycle.ensure_ready()?;
        let backend: Arc<dyn PhotoBackend> = self.store.clone();
        let photos = lock(&self.store.items)
            .iter()
            .map(|item| {
                Photo::new(&item.id, &item.filename, backend.clone())
                    .with_size(item.bytes.len() as u64)
            })
            .collect();
        Ok(photos)
    }

    async fn upload(&self, photo: &Photo) -> Result<String> {
        self.lifecycle.ensure_ready()?;
        if self.read_only {
            return Err(Error::unsupported(&self.name, "upload"));
        }
        lock(&self.store.upload_calls).push(photo.id.clone());
        if lock(&self.store.failing_uploads).contains(&photo.id) {
            return Err(Error::transfer(format!("injected failure for '{}'", photo.id)));
        }

        let bytes = photo.download().await?;
        debug!("[{}] stored '{}' ({} bytes)", self.name, photo.id, bytes.len());
        lock(&self.store.items).push(StoredItem {
            id: photo.id.clone(),
            filename: photo.filename.clone(),
            bytes,
        });
        Ok(photo.id.clone())
    }

    async fn close(&self) -> Result<()> {
        self.lifecycle.mark_closed();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_calls_before_initialize_fail_fast() {
        let endpoint = MemoryEndpoint::new("mem").with_photo("p1", "p1.jpg", b"x");
        assert!(matches!(
            endpoint.photos().await,
            Err(Error::NotInitialized(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_copies_bytes_and_keeps_id() {
        let source = MemoryEndpoint::new("src").with_photo("p1", "p1.jpg", b"abc");
        let dest = MemoryEndpoint::new("dst");
        source.initialize().await.unwrap();
        dest.initialize().await.unwrap();

        let photo = source.photos().await.unwrap().remove(0);
        assert_eq!(dest.upload(&photo).await.unwrap(), "p1");

        let stored = dest.photos().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].download().await.unwrap(), b"abc".to_vec());
    }

    #[tokio::test]
    async fn test_read_only_rejects_upload() {
        let source = MemoryEndpoint::new("src").with_photo("p1", "p1.jpg", b"abc");
        let cloud = MemoryEndpoint::new("cloud").read_only();
        source.initialize().await.unwrap();
        cloud.initialize().await.unwrap();

        let photo = source.photos().await.unwrap().remove(0);
        assert!(matches!(
            cloud.upload(&photo).await,
            Err(Error::Unsupported { .. })
        ));
        assert!(!cloud.capabilities().upload);
    }

    #[tokio::test]
    async fn test_snapshot_is_not_mutated_by_delete() {
        let endpoint = MemoryEndpoint::new("mem")
            .with_photo("p1", "p1.jpg", b"1")
            .with_photo("p2", "p2.jpg", b"2");
        endpoint.initialize().await.unwrap();

        let snapshot = endpoint.photos().await.unwrap();
        assert!(snapshot[0].delete().await.unwrap());
        assert_eq!(snapshot.len(), 2);
        assert_eq!(endpoint.ids(), vec!["p2".to_string()]);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let endpoint = MemoryEndpoint::new("mem");
        endpoint.initialize().await.unwrap();
        endpoint.close().await.unwrap();
        endpoint.close().await.unwrap();
        assert!(endpoint.photos().await.is_err());
    }
}
