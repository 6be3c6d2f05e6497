//! framesync core - photo model, endpoint capabilities, sync engine and scheduler.
//!
//! This crate is transport-agnostic. Concrete endpoints (the cloud source and
//! the Frame TV sink) live in their own crates and implement [`Endpoint`].

pub mod endpoints;
pub mod errors;
pub mod photos;
pub mod scheduler;
pub mod secrets;
pub mod sync;

pub use endpoints::{Endpoint, EndpointCapabilities, MemoryEndpoint};
pub use photos::{Album, Dimensions, Photo};
pub use scheduler::SyncScheduler;
pub use sync::{FailurePolicy, SyncConfig, SyncService};

// Re-export error types
pub use errors::Error;
pub use errors::Result;
