//! Request and response types for the cloud photo API.

use serde::{Deserialize, Serialize};

/// Error body returned on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub code: String,
    pub message: String,
}

/// Additional verification the service asks for before granting access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    /// Delivery channel of the code, e.g. `sms` or `device`.
    pub kind: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// `GET /api/v1/session` and `POST /api/v1/session/verify` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub authenticated: bool,
    #[serde(default)]
    pub challenge: Option<Challenge>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyRequest {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub photo_count: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlbumsResponse {
    pub albums: Vec<AlbumInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoInfo {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotosResponse {
    pub photos: Vec<PhotoInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}
