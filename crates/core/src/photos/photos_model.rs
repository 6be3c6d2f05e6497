//! Photo and album value types.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use super::photos_traits::{AlbumLoader, PhotoBackend};
use crate::errors::Result;

/// Pixel dimensions of an image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// A transferable image as reported by an endpoint.
///
/// `id` is the identity used for dedup and must be treated as opaque. The
/// value is a read-only snapshot: uploads or deletes on the owning endpoint
/// do not change photos that were already handed out.
#[derive(Clone)]
pub struct Photo {
    pub id: String,
    pub filename: String,
    pub dimensions: Dimensions,
    pub size: u64,
    pub thumbnail_url: Option<String>,
    backend: Arc<dyn PhotoBackend>,
}

impl Photo {
    /// Create a photo owned by `backend`.
    pub fn new(
        id: impl Into<String>,
        filename: impl Into<String>,
        backend: Arc<dyn PhotoBackend>,
    ) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            dimensions: Dimensions::default(),
            size: 0,
            thumbnail_url: None,
            backend,
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.dimensions = Dimensions::new(width, height);
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn with_thumbnail_url(mut self, url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(url.into());
        self
    }

    /// Fetch the image bytes from the owning endpoint.
    pub async fn download(&self) -> Result<Vec<u8>> {
        self.backend.download(&self.id).await
    }

    /// Delete the image from the owning endpoint.
    pub async fn delete(&self) -> Result<bool> {
        self.backend.delete(&self.id).await
    }

    /// Lower-cased file extension, if the filename carries one.
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }
}

impl fmt::Debug for Photo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Photo")
            .field("id", &self.id)
            .field("filename", &self.filename)
            .field("dimensions", &self.dimensions)
            .field("size", &self.size)
            .field("thumbnail_url", &self.thumbnail_url)
            .finish()
    }
}

/// A named container whose photos are fetched on first access.
///
/// The fetched list is cached for the lifetime of this value; fetch the
/// album again to observe newer content.
pub struct Album {
    pub id: String,
    pub name: String,
    loader: Arc<dyn AlbumLoader>,
    photos: OnceCell<Vec<Photo>>,
}

impl Album {
    pub fn new(id: impl Into<String>, name: impl Into<String>, loader: Arc<dyn AlbumLoader>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            loader,
            photos: OnceCell::new(),
        }
    }

    /// Photos in this album, loading them on the first call.
    pub async fn photos(&self) -> Result<&[Photo]> {
        let photos = self
            .photos
            .get_or_try_init(|| self.loader.load_photos(&self.id))
            .await?;
        Ok(photos.as_slice())
    }

    /// Whether the photo list has already been fetched.
    pub fn is_loaded(&self) -> bool {
        self.photos.initialized()
    }
}

impl fmt::Debug for Album {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Album")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullBackend;

    #[async_trait]
    impl PhotoBackend for NullBackend {
        async fn download(&self, photo_id: &str) -> Result<Vec<u8>> {
            Ok(photo_id.as_bytes().to_vec())
        }

        async fn delete(&self, _photo_id: &str) -> Result<bool> {
            Ok(true)
        }
    }

    struct CountingLoader {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AlbumLoader for CountingLoader {
        async fn load_photos(&self, album_id: &str) -> Result<Vec<Photo>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let backend: Arc<dyn PhotoBackend> = Arc::new(NullBackend);
            Ok(vec![Photo::new(format!("{}-1", album_id), "a.jpg", backend)])
        }
    }

    #[tokio::test]
    async fn test_album_loads_photos_once() {
        let loader = Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
        });
        let album = Album::new("holiday", "Holiday", loader.clone());
        assert!(!album.is_loaded());

        assert_eq!(album.photos().await.unwrap().len(), 1);
        assert_eq!(album.photos().await.unwrap()[0].id, "holiday-1");
        assert!(album.is_loaded());
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_photo_download_goes_through_backend() {
        let backend: Arc<dyn PhotoBackend> = Arc::new(NullBackend);
        let photo = Photo::new("IMG_0001.HEIC", "IMG_0001.HEIC", backend)
            .with_dimensions(4032, 3024)
            .with_size(2_048);

        assert_eq!(photo.download().await.unwrap(), b"IMG_0001.HEIC".to_vec());
        assert!(photo.delete().await.unwrap());
        assert_eq!(photo.extension().as_deref(), Some("heic"));
        assert_eq!(photo.dimensions, Dimensions::new(4032, 3024));
    }
}
