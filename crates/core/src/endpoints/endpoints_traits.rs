//! Endpoint trait.
//!
//! Every backing system (cloud source, Frame TV, in-memory double) is its own
//! type behind this trait. Optional capabilities are declared up front in
//! [`EndpointCapabilities`] and checked explicitly by callers.

use async_trait::async_trait;

use crate::errors::Result;
use crate::photos::{Album, Photo};

/// Capabilities an endpoint offers beyond listing photos.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointCapabilities {
    /// `albums()` returns `Some`.
    pub albums: bool,
    /// `upload()` can succeed.
    pub upload: bool,
    /// Photos produced by this endpoint can be deleted.
    pub delete: bool,
}

/// A capability-bearing source or sink of photos in the sync graph.
///
/// `initialize()` must complete before any other method is called; calls
/// made earlier fail with [`Error::NotInitialized`](crate::Error::NotInitialized).
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Stable display name used in logs and summaries.
    fn name(&self) -> &str;

    fn capabilities(&self) -> EndpointCapabilities;

    /// Authenticates and opens the endpoint's transport.
    ///
    /// Fails with `Authentication` or `Connection`. Calling it again after
    /// success is a no-op.
    async fn initialize(&self) -> Result<()>;

    /// Current snapshot of the endpoint's configured collection.
    async fn photos(&self) -> Result<Vec<Photo>>;

    /// All albums, or `None` for endpoints with a single implicit collection.
    async fn albums(&self) -> Result<Option<Vec<Album>>> {
        Ok(None)
    }

    /// Stores `photo` and returns the id of the created item.
    ///
    /// Fails with `Unsupported` on read-only endpoints and `Transfer` when the
    /// remote rejects or loses the payload.
    async fn upload(&self, photo: &Photo) -> Result<String>;

    /// Releases transport resources. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}
