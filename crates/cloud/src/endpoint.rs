//! Cloud photo source endpoint.
//!
//! Read-only: photos are listed and downloaded from the configured album and
//! may be deleted after transfer, but nothing is ever uploaded to the cloud.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use log::{debug, info, warn};

use framesync_core::endpoints::Lifecycle;
use framesync_core::photos::{AlbumLoader, PhotoBackend};
use framesync_core::{Album, Endpoint, EndpointCapabilities, Error, Photo, Result};

use crate::client::CloudApi;
use crate::types::{AlbumInfo, PhotoInfo, SessionResponse};

/// How long an interactive challenge may take to be answered.
pub const CHALLENGE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Supplies the code for a verification challenge.
pub type ChallengeResolver = Arc<dyn Fn() -> BoxFuture<'static, Result<String>> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// Album id or name whose photos are synchronized.
    pub album: String,
    pub challenge_timeout: Duration,
}

impl CloudConfig {
    pub fn new(album: impl Into<String>) -> Self {
        Self {
            album: album.into(),
            challenge_timeout: CHALLENGE_TIMEOUT,
        }
    }
}

/// Photo operations delegated back to the API.
struct CloudBackend {
    api: Arc<dyn CloudApi>,
}

#[async_trait]
impl PhotoBackend for CloudBackend {
    async fn download(&self, photo_id: &str) -> Result<Vec<u8>> {
        Ok(self.api.download(photo_id).await?)
    }

    async fn delete(&self, photo_id: &str) -> Result<bool> {
        let deleted = self.api.delete_photo(photo_id).await?;
        if deleted {
            debug!("Deleted '{}' from the cloud", photo_id);
        }
        Ok(deleted)
    }
}

struct CloudAlbumLoader {
    api: Arc<dyn CloudApi>,
    backend: Arc<dyn PhotoBackend>,
}

#[async_trait]
impl AlbumLoader for CloudAlbumLoader {
    async fn load_photos(&self, album_id: &str) -> Result<Vec<Photo>> {
        let photos = self.api.album_photos(album_id).await?;
        Ok(photos
            .into_iter()
            .map(|info| to_photo(info, self.backend.clone()))
            .collect())
    }
}

fn to_photo(info: PhotoInfo, backend: Arc<dyn PhotoBackend>) -> Photo {
    let mut photo = Photo::new(info.id, info.filename, backend)
        .with_dimensions(info.width, info.height)
        .with_size(info.size);
    if let Some(url) = info.thumbnail_url {
        photo = photo.with_thumbnail_url(url);
    }
    photo
}

pub struct CloudEndpoint {
    name: String,
    config: CloudConfig,
    api: Arc<dyn CloudApi>,
    backend: Arc<dyn PhotoBackend>,
    resolver: Option<ChallengeResolver>,
    lifecycle: Lifecycle,
}

impl CloudEndpoint {
    pub fn new(config: CloudConfig, api: Arc<dyn CloudApi>) -> Self {
        let name = format!("cloud:{}", config.album);
        Self {
            lifecycle: Lifecycle::new(name.clone()),
            name,
            config,
            backend: Arc::new(CloudBackend { api: api.clone() }),
            api,
            resolver: None,
        }
    }

    /// Resolver awaited when the service asks for a verification code.
    pub fn with_challenge_resolver(mut self, resolver: ChallengeResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    async fn answer_challenge(&self, session: SessionResponse) -> Result<()> {
        let challenge = session
            .challenge
            .ok_or_else(|| Error::authentication("session rejected without a challenge"))?;
        let resolver = self.resolver.as_ref().ok_or_else(|| {
            Error::authentication(format!(
                "{} challenge required but no resolver is configured",
                challenge.kind
            ))
        })?;

        info!(
            "[{}] {} challenge requested{}",
            self.name,
            challenge.kind,
            challenge
                .message
                .as_deref()
                .map(|m| format!(": {}", m))
                .unwrap_or_default()
        );
        let code = tokio::time::timeout(self.config.challenge_timeout, (**resolver)())
            .await
            .map_err(|_| {
                Error::authentication(format!(
                    "challenge not answered within {} s",
                    self.config.challenge_timeout.as_secs()
                ))
            })??;

        let verified = self.api.verify(code.trim()).await?;
        if !verified.authenticated {
            return Err(Error::authentication("verification code rejected"));
        }
        Ok(())
    }

    async fn find_album(&self) -> Result<AlbumInfo> {
        self.api
            .albums()
            .await?
            .into_iter()
            .find(|album| album.id == self.config.album || album.name == self.config.album)
            .ok_or_else(|| Error::not_found(format!("album '{}'", self.config.album)))
    }
}

#[async_trait]
impl Endpoint for CloudEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> EndpointCapabilities {
        EndpointCapabilities {
            albums: true,
            upload: false,
            delete: true,
        }
    }

    async fn initialize(&self) -> Result<()> {
        if self.lifecycle.is_ready() {
            debug!("[{}] already initialized", self.name);
            return Ok(());
        }
        let session = self.api.session().await?;
        if !session.authenticated {
            self.answer_challenge(session).await?;
        }
        self.lifecycle.mark_ready();
        info!("[{}] authenticated", self.name);
        Ok(())
    }

    async fn photos(&self) -> Result<Vec<Photo>> {
        self.lifecycle.ensure_ready()?;
        let album = self.find_album().await?;
        let photos: Vec<Photo> = self
            .api
            .album_photos(&album.id)
            .await?
            .into_iter()
            .map(|info| to_photo(info, self.backend.clone()))
            .collect();
        debug!("[{}] {} photos in '{}'", self.name, photos.len(), album.name);
        Ok(photos)
    }

    async fn albums(&self) -> Result<Option<Vec<Album>>> {
        self.lifecycle.ensure_ready()?;
        let loader: Arc<dyn AlbumLoader> = Arc::new(CloudAlbumLoader {
            api: self.api.clone(),
            backend: self.backend.clone(),
        });
        let albums = self
            .api
            .albums()
            .await?
            .into_iter()
            .map(|album| Album::new(album.id, album.name, loader.clone()))
            .collect();
        Ok(Some(albums))
    }

    async fn upload(&self, _photo: &Photo) -> Result<String> {
        self.lifecycle.ensure_ready()?;
        warn!("[{}] upload requested on a read-only source", self.name);
        Err(Error::unsupported(&self.name, "upload"))
    }

    async fn close(&self) -> Result<()> {
        if self.lifecycle.mark_closed() {
            info!("[{}] closed", self.name);
        }
        Ok(())
    }
}
