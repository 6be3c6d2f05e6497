//! Photos module - transferable image descriptors and lazily-loaded albums.

mod photos_model;
mod photos_traits;

pub use photos_model::{Album, Dimensions, Photo};
pub use photos_traits::{AlbumLoader, PhotoBackend};
