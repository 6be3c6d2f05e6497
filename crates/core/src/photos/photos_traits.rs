//! Backend hooks behind [`Photo`](super::Photo) and [`Album`](super::Album) behaviours.
//!
//! A photo value is a snapshot; these traits are how it reaches back into the
//! endpoint that produced it to fetch bytes or remove the original.

use async_trait::async_trait;

use super::photos_model::Photo;
use crate::errors::Result;

/// Storage operations a photo delegates to its owning endpoint.
#[async_trait]
pub trait PhotoBackend: Send + Sync {
    /// Fetches the full payload for `photo_id`.
    async fn download(&self, photo_id: &str) -> Result<Vec<u8>>;

    /// Removes `photo_id` from the backing store.
    ///
    /// Returns `false` when the remote accepted the call but did not delete
    /// anything (already gone, or rejected without an error).
    async fn delete(&self, photo_id: &str) -> Result<bool>;
}

/// Fetches the content of an album on first access.
#[async_trait]
pub trait AlbumLoader: Send + Sync {
    async fn load_photos(&self, album_id: &str) -> Result<Vec<Photo>>;
}
