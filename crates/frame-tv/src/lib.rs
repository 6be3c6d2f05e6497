//! Frame TV sink for framesync.
//!
//! Talks to the TV's art app over its WebSocket control channel and moves
//! image bytes over the ephemeral d2d sockets the TV opens on request.

pub mod channel;
pub mod endpoint;
pub mod error;
pub mod framing;
pub mod thumbnail;
pub mod tls;
pub mod types;

#[cfg(test)]
mod test_support;

pub use channel::{ArtChannel, ArtChannelConfig, ControlChannel};
pub use endpoint::{FrameTvConfig, FrameTvEndpoint, MY_PHOTOS_CATEGORY};
pub use error::ProtocolError;
pub use framing::{read_exactly, read_frame, read_frame_list, write_frame, Frame, READ_TIMEOUT};
pub use thumbnail::ThumbnailClient;
pub use tls::{build_client_config, DataConnector, TlsDataConnector, TrustPolicy};
