//! Art-app control channel.
//!
//! Requests are emitted over the device's WebSocket as `ms.channel.emit`
//! messages; answers come back as `d2d_service_message` events that a reader
//! task fans out on a broadcast channel. Callers subscribe before sending so
//! no answer can be missed.

use std::sync::Mutex;

use async_trait::async_trait;
use base64::Engine;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};

use framesync_core::{Error, Result};

use crate::tls::{build_client_config, TrustPolicy};
use crate::types::{ArtRequest, D2dEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const EVENT_BUFFER: usize = 64;
const CHANNEL_PATH: &str = "/api/v2/channels/com.samsung.art-app";

/// Request/response transport to the art app.
#[async_trait]
pub trait ControlChannel: Send + Sync {
    /// New receiver for every `d2d_service_message` arriving from now on.
    fn subscribe(&self) -> broadcast::Receiver<D2dEvent>;

    async fn send(&self, request: &ArtRequest) -> Result<()>;

    /// Whether the transport is still connected. Once this turns false every
    /// pending and future request fails with `Error::Connection`.
    fn is_open(&self) -> bool;

    /// How long a request waits for its answer.
    fn response_timeout(&self) -> Duration;

    /// Sends `request` and waits for the `expected` event answering it.
    async fn request(&self, request: &ArtRequest, expected: &str) -> Result<D2dEvent> {
        let mut events = self.subscribe();
        self.send(request).await?;
        wait_for_event(&mut events, request, expected, self.response_timeout()).await
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Waits on `events` for an `expected` event answering `request`.
///
/// Events that carry a different `request_id` are ignored. An `error` event
/// referring to the request fails with `Transfer`.
pub async fn wait_for_event(
    events: &mut broadcast::Receiver<D2dEvent>,
    request: &ArtRequest,
    expected: &str,
    timeout: Duration,
) -> Result<D2dEvent> {
    let deadline = Instant::now() + timeout;
    loop {
        let received = tokio::time::timeout_at(deadline, events.recv())
            .await
            .map_err(|_| {
                Error::transfer(format!(
                    "no '{}' answer to {} within {} ms",
                    expected,
                    request.name(),
                    timeout.as_millis()
                ))
            })?;

        let event = match received {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Control channel receiver lagged, {} events dropped", skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => {
                return Err(Error::connection("control channel closed"));
            }
        };

        if event.is_error() {
            if event.correlates(&request.request_id) {
                return Err(Error::transfer(format!(
                    "{} rejected by device (error_code {})",
                    request.name(),
                    event.error_code().unwrap_or_else(|| "unknown".to_string())
                )));
            }
            continue;
        }

        let answers_request = match event.request_id.as_deref() {
            Some(id) => id == request.request_id,
            None => true,
        };
        if event.event == expected && answers_request {
            return Ok(event);
        }
    }
}

/// Settings for [`ArtChannel::connect`].
#[derive(Debug, Clone)]
pub struct ArtChannelConfig {
    pub host: String,
    pub port: u16,
    /// Client name shown on the TV's pairing prompt.
    pub name: String,
    /// Pairing token from a previous session.
    pub token: Option<String>,
    pub trust: TrustPolicy,
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
}

impl ArtChannelConfig {
    pub fn url(&self) -> String {
        let name = base64::engine::general_purpose::STANDARD.encode(self.name.as_bytes());
        let mut url = format!(
            "wss://{}:{}{}?name={}",
            self.host, self.port, CHANNEL_PATH, name
        );
        if let Some(token) = self.token.as_deref().filter(|t| !t.is_empty()) {
            url.push_str("&token=");
            url.push_str(token);
        }
        url
    }
}

#[derive(Debug, Deserialize)]
struct ChannelMessage {
    event: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

/// WebSocket connection to the art app.
pub struct ArtChannel {
    writer: tokio::sync::Mutex<SplitSink<WsStream, Message>>,
    // The sender lives in the reader task, so receivers observe `Closed`
    // as soon as the socket goes away.
    events: broadcast::Receiver<D2dEvent>,
    reader: Mutex<Option<JoinHandle<()>>>,
    token: Option<String>,
    response_timeout: Duration,
}

impl ArtChannel {
    /// Opens the socket and waits for `ms.channel.connect`.
    ///
    /// A first connection triggers the pairing prompt on the TV, so the
    /// connect timeout must leave the user time to accept it.
    pub async fn connect(config: &ArtChannelConfig) -> Result<Self> {
        let tls = build_client_config(config.trust)?;
        let url = config.url();
        debug!("Connecting to art channel at {}:{}", config.host, config.port);

        let (ws, _) = tokio::time::timeout(
            config.connect_timeout,
            connect_async_tls_with_config(url, None, false, Some(Connector::Rustls(tls))),
        )
        .await
        .map_err(|_| Error::connection(format!("timed out connecting to {}", config.host)))?
        .map_err(|e| Error::connection(format!("{}: {}", config.host, e)))?;

        let (writer, mut stream) = ws.split();
        let token = tokio::time::timeout(config.connect_timeout, Self::handshake(&mut stream))
            .await
            .map_err(|_| Error::connection("no ms.channel.connect from device"))??
            .or_else(|| config.token.clone());
        info!("Art channel connected to {}", config.host);

        let (sender, events) = broadcast::channel(EVENT_BUFFER);
        let reader = tokio::spawn(Self::read_loop(stream, sender));

        Ok(Self {
            writer: tokio::sync::Mutex::new(writer),
            events,
            reader: Mutex::new(Some(reader)),
            token,
            response_timeout: config.response_timeout,
        })
    }

    /// Pairing token the device handed out (or the one we connected with).
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    async fn handshake(stream: &mut SplitStream<WsStream>) -> Result<Option<String>> {
        while let Some(message) = stream.next().await {
            let message = message.map_err(|e| Error::connection(e.to_string()))?;
            let Message::Text(text) = message else {
                continue;
            };
            let Ok(parsed) = serde_json::from_str::<ChannelMessage>(text.as_str()) else {
                continue;
            };
            match parsed.event.as_str() {
                "ms.channel.connect" => {
                    let token = parsed
                        .data
                        .as_ref()
                        .and_then(|data| data.get("token"))
                        .and_then(|token| token.as_str())
                        .map(str::to_string);
                    return Ok(token);
                }
                "ms.channel.unauthorized" => {
                    return Err(Error::authentication("pairing rejected on the TV"));
                }
                "ms.channel.timeOut" => {
                    return Err(Error::authentication("pairing prompt timed out on the TV"));
                }
                other => debug!("Ignoring '{}' during handshake", other),
            }
        }
        Err(Error::connection("socket closed during handshake"))
    }

    async fn read_loop(mut stream: SplitStream<WsStream>, events: broadcast::Sender<D2dEvent>) {
        while let Some(message) = stream.next().await {
            let text = match message {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Art channel read failed: {}", e);
                    break;
                }
            };

            let parsed = match serde_json::from_str::<ChannelMessage>(text.as_str()) {
                Ok(parsed) => parsed,
                Err(e) => {
                    debug!("Skipping unparseable channel message: {}", e);
                    continue;
                }
            };
            if parsed.event != "d2d_service_message" {
                continue;
            }
            let Some(serde_json::Value::String(data)) = parsed.data else {
                continue;
            };
            match D2dEvent::parse(&data) {
                Ok(event) => {
                    debug!("d2d event '{}'", event.event);
                    // No subscribers is fine: nobody is waiting for this answer.
                    let _ = events.send(event);
                }
                Err(e) => debug!("Skipping malformed d2d payload: {}", e),
            }
        }
        info!("Art channel reader stopped");
    }

    fn reader_alive(&self) -> bool {
        self.reader
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn abort_reader(&self) {
        let handle = self
            .reader
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

#[async_trait]
impl ControlChannel for ArtChannel {
    fn subscribe(&self) -> broadcast::Receiver<D2dEvent> {
        self.events.resubscribe()
    }

    fn is_open(&self) -> bool {
        self.reader_alive()
    }

    async fn send(&self, request: &ArtRequest) -> Result<()> {
        if !self.reader_alive() {
            return Err(Error::connection(format!(
                "control channel closed, cannot send {}",
                request.name()
            )));
        }
        let data = serde_json::to_string(request)?;
        let envelope = json!({
            "method": "ms.channel.emit",
            "params": {
                "event": "art_app_request",
                "to": "host",
                "data": data,
            }
        });
        debug!("Sending {} ({})", request.name(), request.request_id);
        self.writer
            .lock()
            .await
            .send(Message::Text(envelope.to_string().into()))
            .await
            .map_err(|e| Error::connection(format!("send {}: {}", request.name(), e)))
    }

    fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    async fn close(&self) -> Result<()> {
        self.abort_reader();
        if let Err(e) = self.writer.lock().await.close().await {
            debug!("Art channel already closed: {}", e);
        }
        Ok(())
    }
}

impl Drop for ArtChannel {
    fn drop(&mut self) {
        self.abort_reader();
    }
}
