//! Endpoints module - the capability contract every photo source or sink implements.

mod endpoints_traits;
mod lifecycle;
mod memory_endpoint;

pub use endpoints_traits::{Endpoint, EndpointCapabilities};
pub use lifecycle::Lifecycle;
pub use memory_endpoint::MemoryEndpoint;
