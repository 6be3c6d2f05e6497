//! Hand-written doubles for the control channel and the d2d connector.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use serde_json::{json, Value};
use tokio::io::{duplex, AsyncWriteExt, DuplexStream};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::tungstenite::protocol::Message;

use framesync_core::{Error, Result};

use crate::channel::ControlChannel;
use crate::error::ProtocolError;
use crate::tls::{DataConnector, DataStream};
use crate::types::{ArtRequest, ConnectionInfo, D2dEvent};

type Responder = Box<dyn Fn(&ArtRequest, &Value) -> Vec<Value> + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Control channel that answers each request through a closure.
///
/// The closure gets the request and its JSON form and returns the `data`
/// documents to emit; `request_id` is filled in when absent.
pub struct FakeChannel {
    events: Mutex<Option<broadcast::Sender<D2dEvent>>>,
    responder: Responder,
    sent: Mutex<Vec<Value>>,
}

impl FakeChannel {
    pub fn new(
        responder: impl Fn(&ArtRequest, &Value) -> Vec<Value> + Send + Sync + 'static,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            events: Mutex::new(Some(events)),
            responder: Box::new(responder),
            sent: Mutex::new(Vec::new()),
        })
    }

    /// JSON of every request sent, in order.
    pub fn sent(&self) -> Vec<Value> {
        lock(&self.sent).clone()
    }

    pub fn sent_names(&self) -> Vec<String> {
        self.sent()
            .iter()
            .filter_map(|value| value["request"].as_str().map(str::to_string))
            .collect()
    }

    /// Drops the transport the way a sleeping TV does.
    pub fn disconnect(&self) {
        lock(&self.events).take();
    }
}

#[async_trait]
impl ControlChannel for FakeChannel {
    fn subscribe(&self) -> broadcast::Receiver<D2dEvent> {
        match lock(&self.events).as_ref() {
            Some(events) => events.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    fn is_open(&self) -> bool {
        lock(&self.events).is_some()
    }

    async fn send(&self, request: &ArtRequest) -> Result<()> {
        let Some(events) = lock(&self.events).clone() else {
            return Err(Error::connection("fake channel disconnected"));
        };
        let value = serde_json::to_value(request)?;
        lock(&self.sent).push(value.clone());
        for mut answer in (self.responder)(request, &value) {
            if answer.get("request_id").is_none() && answer["event"] != "error" {
                answer["request_id"] = json!(request.request_id);
            }
            let event = D2dEvent::parse(&answer.to_string())?;
            let _ = events.send(event);
        }
        Ok(())
    }

    fn response_timeout(&self) -> Duration {
        Duration::from_secs(2)
    }
}

/// Connector that hands out pre-built in-memory streams.
#[derive(Default)]
pub struct FakeConnector {
    streams: Mutex<VecDeque<DuplexStream>>,
    connections: Mutex<Vec<(ConnectionInfo, bool)>>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues a stream whose peer has already written `bytes` and closed.
    pub async fn push_bytes(&self, bytes: &[u8]) {
        let (client, mut server) = duplex(bytes.len().max(1) + 1024);
        server.write_all(bytes).await.unwrap();
        drop(server);
        lock(&self.streams).push_back(client);
    }

    /// Queues a stream and returns the peer half to the test.
    pub fn push_peer(&self) -> DuplexStream {
        let (client, server) = duplex(64 * 1024);
        lock(&self.streams).push_back(client);
        server
    }

    pub fn connections(&self) -> Vec<(ConnectionInfo, bool)> {
        lock(&self.connections).clone()
    }
}

#[async_trait]
impl DataConnector for FakeConnector {
    async fn connect(
        &self,
        info: &ConnectionInfo,
        tls: bool,
    ) -> std::result::Result<Box<dyn DataStream>, ProtocolError> {
        lock(&self.connections).push((info.clone(), tls));
        let stream = lock(&self.streams)
            .pop_front()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "no stream queued"))?;
        Ok(Box::new(stream))
    }
}

/// `conn_info` answer pointing at a fake socket.
pub fn conn_info_answer(event: &str) -> Value {
    json!({
        "event": event,
        "conn_info": json!({ "ip": "10.0.0.5", "port": "40459", "key": "sec-key" }).to_string(),
    })
}

/// One encoded d2d frame.
pub fn encode_frame(header: Value, payload: &[u8]) -> Vec<u8> {
    let header = serde_json::to_vec(&header).unwrap();
    let mut bytes = (header.len() as u32).to_be_bytes().to_vec();
    bytes.extend_from_slice(&header);
    bytes.extend_from_slice(payload);
    bytes
}

/// TLS acceptor presenting a freshly generated self-signed certificate.
pub fn self_signed_acceptor() -> TlsAcceptor {
    let key_pair = rcgen::KeyPair::generate().unwrap();
    let cert = rcgen::CertificateParams::new(vec!["localhost".to_string()])
        .unwrap()
        .self_signed(&key_pair)
        .unwrap();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert.der().clone()], key)
        .unwrap();
    TlsAcceptor::from(Arc::new(config))
}

/// Loopback art-app server over `wss`.
///
/// Serves one connection per entry of `sessions`, in order. Each session
/// completes the handshake with pairing token `"42"`, answers that many
/// requests with an empty `content_list`, then closes the socket.
pub async fn spawn_art_server(sessions: Vec<usize>) -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let acceptor = self_signed_acceptor();

    let handle = tokio::spawn(async move {
        for answers in sessions {
            let (tcp, _) = listener.accept().await.unwrap();
            let tls = acceptor.accept(tcp).await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tls).await.unwrap();

            let connect = json!({ "event": "ms.channel.connect", "data": { "token": "42" } });
            ws.send(Message::Text(connect.to_string().into())).await.unwrap();

            let mut answered = 0;
            while answered < answers {
                let Some(Ok(Message::Text(text))) = ws.next().await else {
                    break;
                };
                let envelope: Value = serde_json::from_str(text.as_str()).unwrap();
                let data = envelope["params"]["data"].as_str().unwrap_or_default();
                let request: Value = serde_json::from_str(data).unwrap();
                let answer = json!({
                    "event": request["request"],
                    "request_id": request["request_id"],
                    "content_list": "[]",
                });
                let message = json!({ "event": "d2d_service_message", "data": answer.to_string() });
                ws.send(Message::Text(message.to_string().into())).await.unwrap();
                answered += 1;
            }
            let _ = ws.close(None).await;
        }
    });
    (port, handle)
}
