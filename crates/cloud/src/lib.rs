//! Cloud photo source for framesync.
//!
//! Wraps the REST photo service in an [`Endpoint`](framesync_core::Endpoint)
//! that exposes one configured album as the sync source.

pub mod client;
pub mod endpoint;
pub mod error;
pub mod types;

pub use client::{CloudApi, CloudApiClient};
pub use endpoint::{ChallengeResolver, CloudConfig, CloudEndpoint, CHALLENGE_TIMEOUT};
pub use error::CloudError;
