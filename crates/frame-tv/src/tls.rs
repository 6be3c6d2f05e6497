//! TLS trust policy and data-channel connector.
//!
//! Frame TVs present a self-signed certificate on both the control WebSocket
//! and the d2d socket. Accepting it is only sound when the device is reached
//! over a trusted local network, so the relaxed mode is an explicit
//! [`TrustPolicy`] value rather than a hidden default of the transport.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::Duration;
use tokio_rustls::TlsConnector;

use crate::error::ProtocolError;
use crate::types::ConnectionInfo;

/// How the device certificate is verified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrustPolicy {
    /// Skip chain and hostname validation; handshake signatures are still
    /// checked. Valid only on a trusted LAN.
    #[default]
    AcceptSelfSigned,
    /// Standard WebPKI validation against the bundled Mozilla roots.
    WebPki,
}

impl std::str::FromStr for TrustPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "self-signed" | "accept-self-signed" | "false" | "off" => Ok(Self::AcceptSelfSigned),
            "webpki" | "true" | "on" | "strict" => Ok(Self::WebPki),
            other => Err(format!("unknown TLS trust policy '{}'", other)),
        }
    }
}

/// Verifier that accepts any server certificate.
#[derive(Debug)]
struct AcceptSelfSignedVerifier {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptSelfSignedVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Builds the rustls client configuration for `policy`.
pub fn build_client_config(policy: TrustPolicy) -> Result<Arc<ClientConfig>, ProtocolError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| ProtocolError::Tls(e.to_string()))?;

    let config = match policy {
        TrustPolicy::AcceptSelfSigned => {
            warn!("TLS certificate verification disabled for the Frame TV (trusted LAN only)");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptSelfSignedVerifier { provider }))
                .with_no_client_auth()
        }
        TrustPolicy::WebPki => {
            let mut roots = RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            builder.with_root_certificates(roots).with_no_client_auth()
        }
    };
    Ok(Arc::new(config))
}

/// Byte stream returned by a [`DataConnector`].
pub trait DataStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> DataStream for T {}

/// Opens the ephemeral d2d socket described by a control response.
#[async_trait]
pub trait DataConnector: Send + Sync {
    async fn connect(
        &self,
        info: &ConnectionInfo,
        tls: bool,
    ) -> Result<Box<dyn DataStream>, ProtocolError>;
}

/// TCP connector with optional TLS on top.
pub struct TlsDataConnector {
    connector: TlsConnector,
    connect_timeout: Duration,
}

impl TlsDataConnector {
    pub fn new(config: Arc<ClientConfig>, connect_timeout: Duration) -> Self {
        Self {
            connector: TlsConnector::from(config),
            connect_timeout,
        }
    }
}

#[async_trait]
impl DataConnector for TlsDataConnector {
    async fn connect(
        &self,
        info: &ConnectionInfo,
        tls: bool,
    ) -> Result<Box<dyn DataStream>, ProtocolError> {
        let addr = (info.ip.as_str(), info.port);
        let tcp = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ProtocolError::Timeout {
                expected: 0,
                received: 0,
                timeout_ms: self.connect_timeout.as_millis() as u64,
            })??;
        tcp.set_nodelay(true)?;
        debug!("d2d socket connected to {}:{} (tls={})", info.ip, info.port, tls);

        if !tls {
            return Ok(Box::new(tcp));
        }

        let server_name = ServerName::try_from(info.ip.clone())
            .map_err(|e| ProtocolError::Tls(format!("invalid server name '{}': {}", info.ip, e)))?;
        let stream = tokio::time::timeout(
            self.connect_timeout,
            self.connector.connect(server_name, tcp),
        )
        .await
        .map_err(|_| ProtocolError::Tls("handshake timed out".into()))?
        .map_err(|e| ProtocolError::Tls(e.to_string()))?;
        Ok(Box::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::self_signed_acceptor;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_trust_policy_parsing() {
        assert_eq!("webpki".parse::<TrustPolicy>(), Ok(TrustPolicy::WebPki));
        assert_eq!("false".parse::<TrustPolicy>(), Ok(TrustPolicy::AcceptSelfSigned));
        assert!("maybe".parse::<TrustPolicy>().is_err());
        assert_eq!(TrustPolicy::default(), TrustPolicy::AcceptSelfSigned);
    }

    #[test]
    fn test_both_policies_build() {
        assert!(build_client_config(TrustPolicy::AcceptSelfSigned).is_ok());
        assert!(build_client_config(TrustPolicy::WebPki).is_ok());
    }

    /// Loopback TLS server with a self-signed certificate that writes
    /// `b"ok"` to the first client completing the handshake.
    async fn self_signed_server() -> (ConnectionInfo, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let acceptor = self_signed_acceptor();
        let handle = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            if let Ok(mut tls) = acceptor.accept(tcp).await {
                tls.write_all(b"ok").await.unwrap();
                tls.shutdown().await.unwrap();
            }
        });
        let info = ConnectionInfo {
            ip: "127.0.0.1".to_string(),
            port,
            key: None,
            secured: Some(true),
        };
        (info, handle)
    }

    fn connector(policy: TrustPolicy) -> TlsDataConnector {
        TlsDataConnector::new(build_client_config(policy).unwrap(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_accept_self_signed_completes_handshake() {
        let (info, server) = self_signed_server().await;

        let mut stream = connector(TrustPolicy::AcceptSelfSigned)
            .connect(&info, true)
            .await
            .unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();

        assert_eq!(buf, b"ok".to_vec());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_webpki_rejects_self_signed_certificate() {
        let (info, server) = self_signed_server().await;

        let result = connector(TrustPolicy::WebPki).connect(&info, true).await;

        assert!(matches!(result, Err(ProtocolError::Tls(_))));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_plain_connection_skips_tls() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut tcp, _) = listener.accept().await.unwrap();
            tcp.write_all(b"raw").await.unwrap();
        });
        let info = ConnectionInfo {
            ip: "127.0.0.1".to_string(),
            port,
            key: None,
            secured: Some(false),
        };

        let mut stream = connector(TrustPolicy::WebPki).connect(&info, false).await.unwrap();
        let mut buf = [0u8; 3];
        stream.read_exact(&mut buf).await.unwrap();

        assert_eq!(&buf, b"raw");
        server.await.unwrap();
    }
}
