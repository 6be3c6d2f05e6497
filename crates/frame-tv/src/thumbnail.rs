//! Thumbnail retrieval over the d2d data channel.
//!
//! A control request makes the TV open a socket and report where it
//! listens; the client connects there and reads framed image payloads.
//! Every failure is logged and collapses to an empty result.

use std::sync::Arc;

use log::{debug, warn};
use tokio::time::Duration;

use framesync_core::Result;

use crate::channel::ControlChannel;
use crate::framing::{read_frame, read_frame_list, READ_TIMEOUT};
use crate::tls::DataConnector;
use crate::types::{ArtRequest, ConnectionInfo};

pub struct ThumbnailClient {
    channel: Arc<dyn ControlChannel>,
    connector: Arc<dyn DataConnector>,
    read_timeout: Duration,
}

impl ThumbnailClient {
    pub fn new(channel: Arc<dyn ControlChannel>, connector: Arc<dyn DataConnector>) -> Self {
        Self {
            channel,
            connector,
            read_timeout: READ_TIMEOUT,
        }
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Thumbnail bytes for `content_id`, or an empty vec on any failure.
    pub async fn thumbnail(&self, content_id: &str) -> Vec<u8> {
        match self.fetch_single(content_id).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("get_thumbnail for '{}' failed: {}", content_id, e);
                Vec::new()
            }
        }
    }

    /// Thumbnails for `content_ids` in the order the device sends them, or an
    /// empty vec on any failure.
    pub async fn thumbnails(&self, content_ids: &[String]) -> Vec<Vec<u8>> {
        if content_ids.is_empty() {
            return Vec::new();
        }
        match self.fetch_list(content_ids).await {
            Ok(payloads) => payloads,
            Err(e) => {
                warn!(
                    "get_thumbnail_list for {} items failed: {}",
                    content_ids.len(),
                    e
                );
                Vec::new()
            }
        }
    }

    /// Tries the single request first, then a one-item list request.
    ///
    /// Older firmware only answers one of the two.
    pub async fn thumbnail_or_fallback(&self, content_id: &str) -> Vec<u8> {
        let single = self.thumbnail(content_id).await;
        if !single.is_empty() {
            return single;
        }
        debug!("Falling back to get_thumbnail_list for '{}'", content_id);
        self.thumbnails(&[content_id.to_string()])
            .await
            .into_iter()
            .next()
            .unwrap_or_default()
    }

    async fn fetch_single(&self, content_id: &str) -> Result<Vec<u8>> {
        let request = ArtRequest::get_thumbnail(content_id);
        let answer = self.channel.request(&request, "get_thumbnail").await?;
        let info = ConnectionInfo::from_envelope(&answer.raw)?;

        let mut stream = self.connector.connect(&info, info.secured.unwrap_or(true)).await?;
        let frame = read_frame(&mut *stream, self.read_timeout).await?;
        debug!("Thumbnail '{}': {} bytes", content_id, frame.payload.len());
        Ok(frame.payload)
    }

    async fn fetch_list(&self, content_ids: &[String]) -> Result<Vec<Vec<u8>>> {
        let request = ArtRequest::get_thumbnail_list(content_ids);
        let answer = self.channel.request(&request, "get_thumbnail_list").await?;
        let info = ConnectionInfo::from_envelope(&answer.raw)?;

        let mut stream = self.connector.connect(&info, info.secured.unwrap_or(true)).await?;
        Ok(read_frame_list(&mut *stream, self.read_timeout).await?)
    }
}
