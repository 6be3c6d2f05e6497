//! Frame TV endpoint: art-mode photos on the device as a sync sink.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::time::Duration;

use framesync_core::endpoints::Lifecycle;
use framesync_core::photos::PhotoBackend;
use framesync_core::secrets::{MemorySecretStore, SecretStore};
use framesync_core::{Endpoint, EndpointCapabilities, Error, Photo, Result};

use crate::channel::{wait_for_event, ArtChannel, ArtChannelConfig, ControlChannel};
use crate::error::ProtocolError;
use crate::framing::write_frame;
use crate::thumbnail::ThumbnailClient;
use crate::tls::{build_client_config, DataConnector, TlsDataConnector, TrustPolicy};
use crate::types::{
    ArtRequest, ArtRequestKind, ConnInfoRequest, ConnectionInfo, ContentItem, ContentListResponse,
    ImageAddedEvent, UploadHeader,
};

/// Art-mode category holding user-uploaded photos.
pub const MY_PHOTOS_CATEGORY: &str = "MY-C0002";

/// Connection and upload settings for one TV.
#[derive(Debug, Clone)]
pub struct FrameTvConfig {
    pub host: String,
    pub port: u16,
    /// Client name shown on the pairing prompt.
    pub name: String,
    pub category: String,
    pub matte_id: String,
    pub trust: TrustPolicy,
    /// Covers the pairing prompt on first connect.
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
    /// How long the TV may take to store an uploaded image.
    pub upload_timeout: Duration,
}

impl Default for FrameTvConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 8002,
            name: "framesync".to_string(),
            category: MY_PHOTOS_CATEGORY.to_string(),
            matte_id: "none".to_string(),
            trust: TrustPolicy::default(),
            connect_timeout: Duration::from_secs(30),
            response_timeout: Duration::from_secs(10),
            upload_timeout: Duration::from_secs(60),
        }
    }
}

impl FrameTvConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Secret store key of the pairing token for this TV.
    pub fn token_key(&self) -> String {
        format!("frame_tv_token_{}", self.host)
    }
}

/// Open transport to the device, shared with the photos it hands out.
struct DeviceSession {
    channel: Arc<dyn ControlChannel>,
    connector: Arc<dyn DataConnector>,
    thumbnails: ThumbnailClient,
}

impl DeviceSession {
    fn new(channel: Arc<dyn ControlChannel>, connector: Arc<dyn DataConnector>) -> Self {
        Self {
            thumbnails: ThumbnailClient::new(channel.clone(), connector.clone()),
            channel,
            connector,
        }
    }
}

#[async_trait]
impl PhotoBackend for DeviceSession {
    /// The device does not hand out originals; the thumbnail is the best
    /// available rendition.
    async fn download(&self, photo_id: &str) -> Result<Vec<u8>> {
        let bytes = self.thumbnails.thumbnail_or_fallback(photo_id).await;
        if bytes.is_empty() {
            return Err(Error::transfer(format!("no thumbnail available for '{}'", photo_id)));
        }
        Ok(bytes)
    }

    async fn delete(&self, photo_id: &str) -> Result<bool> {
        let request = ArtRequest::delete_image(photo_id);
        self.channel.request(&request, "image_deleted").await?;
        debug!("Deleted '{}' from the TV", photo_id);
        Ok(true)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Maps a file extension onto the `file_type` values the art app accepts.
fn device_file_type(photo: &Photo) -> &'static str {
    match photo.extension().as_deref() {
        Some("png") => "png",
        _ => "jpg",
    }
}

pub struct FrameTvEndpoint {
    name: String,
    config: FrameTvConfig,
    secrets: Arc<dyn SecretStore>,
    lifecycle: Lifecycle,
    session: Mutex<Option<Arc<DeviceSession>>>,
    /// Serializes reconnect attempts.
    reconnect: tokio::sync::Mutex<()>,
    /// Whether a dropped channel may be replaced by dialing the TV again.
    can_reconnect: bool,
}

impl FrameTvEndpoint {
    /// Endpoint that connects on `initialize()`, reusing and persisting the
    /// pairing token through `secrets`.
    pub fn new(config: FrameTvConfig, secrets: Arc<dyn SecretStore>) -> Self {
        let name = format!("frame-tv:{}", config.host);
        Self {
            lifecycle: Lifecycle::new(name.clone()),
            name,
            config,
            secrets,
            session: Mutex::new(None),
            reconnect: tokio::sync::Mutex::new(()),
            can_reconnect: true,
        }
    }

    /// Endpoint over an already open control channel and data connector.
    ///
    /// The endpoint cannot redial on its own: once `channel` closes, calls
    /// fail with `Error::Connection`.
    pub fn with_channel(
        config: FrameTvConfig,
        channel: Arc<dyn ControlChannel>,
        connector: Arc<dyn DataConnector>,
    ) -> Self {
        let mut endpoint = Self::new(config, Arc::new(MemorySecretStore::default()));
        endpoint.can_reconnect = false;
        *lock(&endpoint.session) = Some(Arc::new(DeviceSession::new(channel, connector)));
        endpoint
    }

    fn open_session(&self) -> Option<Arc<DeviceSession>> {
        lock(&self.session)
            .clone()
            .filter(|session| session.channel.is_open())
    }

    /// Current session, reconnecting first when the TV dropped the channel
    /// (standby, reboot, network loss).
    async fn session(&self) -> Result<Arc<DeviceSession>> {
        self.lifecycle.ensure_ready()?;
        if let Some(session) = self.open_session() {
            return Ok(session);
        }

        let _gate = self.reconnect.lock().await;
        if let Some(session) = self.open_session() {
            return Ok(session);
        }
        if lock(&self.session).take().is_some() {
            warn!("[{}] control channel closed", self.name);
        }
        if !self.can_reconnect {
            return Err(Error::connection(format!("{}: control channel closed", self.name)));
        }

        info!("[{}] reconnecting", self.name);
        let session = Arc::new(self.connect().await?);
        *lock(&self.session) = Some(session.clone());
        Ok(session)
    }

    async fn connect(&self) -> Result<DeviceSession> {
        let stored_token = self.secrets.get_secret(&self.config.token_key())?;
        let channel_config = ArtChannelConfig {
            host: self.config.host.clone(),
            port: self.config.port,
            name: self.config.name.clone(),
            token: stored_token.clone(),
            trust: self.config.trust,
            connect_timeout: self.config.connect_timeout,
            response_timeout: self.config.response_timeout,
        };
        let channel = ArtChannel::connect(&channel_config).await?;

        if let Some(token) = channel.token() {
            if stored_token.as_deref() != Some(token) {
                info!("Storing new pairing token for {}", self.config.host);
                self.secrets.set_secret(&self.config.token_key(), token)?;
            }
        }

        let tls = build_client_config(self.config.trust)?;
        let connector = TlsDataConnector::new(tls, self.config.connect_timeout);
        Ok(DeviceSession::new(Arc::new(channel), Arc::new(connector)))
    }

    fn photo_from_item(&self, item: ContentItem, backend: Arc<dyn PhotoBackend>) -> Photo {
        let filename = format!("{}.jpg", item.content_id);
        let mut photo = Photo::new(item.content_id, filename, backend)
            .with_size(item.file_size.unwrap_or_default());
        if let (Some(width), Some(height)) = (item.width, item.height) {
            photo = photo.with_dimensions(width, height);
        }
        photo
    }
}

#[async_trait]
impl Endpoint for FrameTvEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> EndpointCapabilities {
        EndpointCapabilities {
            albums: false,
            upload: true,
            delete: true,
        }
    }

    async fn initialize(&self) -> Result<()> {
        if self.lifecycle.is_ready() {
            debug!("[{}] already initialized", self.name);
            return Ok(());
        }
        let existing = lock(&self.session).is_some();
        if !existing {
            let session = self.connect().await?;
            *lock(&self.session) = Some(Arc::new(session));
        }
        self.lifecycle.mark_ready();
        info!("[{}] ready", self.name);
        Ok(())
    }

    async fn photos(&self) -> Result<Vec<Photo>> {
        let session = self.session().await?;
        let request = ArtRequest::new(ArtRequestKind::GetContentList {
            category: self.config.category.clone(),
        });
        let answer = session.channel.request(&request, "get_content_list").await?;

        let response: ContentListResponse = serde_json::from_str(&answer.raw)?;
        let items: Vec<ContentItem> = serde_json::from_str(&response.content_list)?;
        let backend: Arc<dyn PhotoBackend> = session.clone();
        let photos: Vec<Photo> = items
            .into_iter()
            .filter(|item| {
                item.category_id
                    .as_deref()
                    .map_or(true, |category| category == self.config.category)
            })
            .map(|item| self.photo_from_item(item, backend.clone()))
            .collect();
        debug!("[{}] {} photos on device", self.name, photos.len());
        Ok(photos)
    }

    async fn upload(&self, photo: &Photo) -> Result<String> {
        let session = self.session().await?;
        let bytes = photo.download().await?;
        let file_type = device_file_type(photo);

        let request = ArtRequest::new(ArtRequestKind::SendImage {
            file_type: file_type.to_string(),
            conn_info: ConnInfoRequest::random(),
            image_date: chrono::Local::now().format("%Y:%m:%d %H:%M:%S").to_string(),
            matte_id: self.config.matte_id.clone(),
            portrait_matte_id: self.config.matte_id.clone(),
            file_size: bytes.len() as u64,
        });

        let mut events = session.channel.subscribe();
        session.channel.send(&request).await?;
        let ready = wait_for_event(
            &mut events,
            &request,
            "ready_to_use",
            self.config.response_timeout,
        )
        .await?;

        let info = ConnectionInfo::from_envelope(&ready.raw)?;
        let sec_key = info
            .key
            .clone()
            .ok_or_else(|| ProtocolError::invalid_connection_info("key missing"))?;
        let header = UploadHeader::single(bytes.len() as u64, file_type, &sec_key);
        {
            let mut stream = session
                .connector
                .connect(&info, info.secured.unwrap_or(false))
                .await?;
            write_frame(&mut *stream, &header, &bytes).await?;
        }

        let added = wait_for_event(
            &mut events,
            &request,
            "image_added",
            self.config.upload_timeout,
        )
        .await?;
        let added: ImageAddedEvent = serde_json::from_str(&added.raw)?;
        info!(
            "[{}] uploaded '{}' as '{}' ({} bytes)",
            self.name,
            photo.id,
            added.content_id,
            bytes.len()
        );
        Ok(added.content_id)
    }

    async fn close(&self) -> Result<()> {
        if !self.lifecycle.mark_closed() {
            debug!("[{}] close on an endpoint that is not open", self.name);
            return Ok(());
        }
        let session = lock(&self.session).take();
        if let Some(session) = session {
            if let Err(e) = session.channel.close().await {
                warn!("[{}] closing control channel failed: {}", self.name, e);
            }
        }
        info!("[{}] closed", self.name);
        Ok(())
    }
}
