//! REST client for the cloud photo service.

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;

use crate::error::{CloudError, Result};
use crate::types::*;

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Operations the cloud endpoint needs from the photo service.
#[async_trait]
pub trait CloudApi: Send + Sync {
    async fn session(&self) -> Result<SessionResponse>;
    async fn verify(&self, code: &str) -> Result<SessionResponse>;
    async fn albums(&self) -> Result<Vec<AlbumInfo>>;
    async fn album_photos(&self, album_id: &str) -> Result<Vec<PhotoInfo>>;
    async fn download(&self, photo_id: &str) -> Result<Vec<u8>>;
    async fn delete_photo(&self, photo_id: &str) -> Result<bool>;
}

/// Client for the cloud photo REST API.
#[derive(Debug, Clone)]
pub struct CloudApiClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl CloudApiClient {
    /// Create a new client.
    ///
    /// * `base_url` - The base URL of the API (e.g., "https://photos.example.com")
    /// * `token` - Bearer token sent with every request
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let auth_value = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|_| CloudError::auth("Invalid access token format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        Ok(headers)
    }

    async fn error_from(response: reqwest::Response) -> CloudError {
        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return CloudError::Http(e),
        };
        match serde_json::from_str::<ApiErrorResponse>(&body) {
            Ok(error) => CloudError::api(status, format!("{}: {}", error.code, error.message)),
            Err(_) => CloudError::api(status, format!("Request failed: {}", body)),
        }
    }

    /// Parse a JSON response body.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(Self::error_from(response).await);
        }

        let body = response.text().await?;
        debug!("API response ({}): {} bytes", status, body.len());
        serde_json::from_str(&body).map_err(|e| {
            log::error!("Failed to deserialize response. Body: {}, Error: {}", body, e);
            CloudError::api(status.as_u16(), format!("Failed to parse response: {}", e))
        })
    }
}

#[async_trait]
impl CloudApi for CloudApiClient {
    /// GET /api/v1/session
    async fn session(&self) -> Result<SessionResponse> {
        let response = self
            .client
            .get(self.url("/api/v1/session"))
            .headers(self.headers()?)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// POST /api/v1/session/verify
    async fn verify(&self, code: &str) -> Result<SessionResponse> {
        let response = self
            .client
            .post(self.url("/api/v1/session/verify"))
            .headers(self.headers()?)
            .json(&VerifyRequest {
                code: code.to_string(),
            })
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// GET /api/v1/albums
    async fn albums(&self) -> Result<Vec<AlbumInfo>> {
        let response = self
            .client
            .get(self.url("/api/v1/albums"))
            .headers(self.headers()?)
            .send()
            .await?;

        let albums: AlbumsResponse = Self::parse_response(response).await?;
        Ok(albums.albums)
    }

    /// GET /api/v1/albums/{albumId}/photos
    async fn album_photos(&self, album_id: &str) -> Result<Vec<PhotoInfo>> {
        let url = self.url(&format!(
            "/api/v1/albums/{}/photos",
            urlencoding::encode(album_id)
        ));
        debug!("[Cloud] album_photos URL: {}", url);

        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await?;

        let photos: PhotosResponse = Self::parse_response(response).await?;
        Ok(photos.photos)
    }

    /// GET /api/v1/photos/{photoId}/original
    async fn download(&self, photo_id: &str) -> Result<Vec<u8>> {
        let url = self.url(&format!(
            "/api/v1/photos/{}/original",
            urlencoding::encode(photo_id)
        ));

        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let bytes = response.bytes().await?;
        debug!("Downloaded '{}' ({} bytes)", photo_id, bytes.len());
        Ok(bytes.to_vec())
    }

    /// DELETE /api/v1/photos/{photoId}
    ///
    /// A photo that is already gone reports `false`.
    async fn delete_photo(&self, photo_id: &str) -> Result<bool> {
        let url = self.url(&format!("/api/v1/photos/{}", urlencoding::encode(photo_id)));

        let response = self
            .client
            .delete(&url)
            .headers(self.headers()?)
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }

        let deleted: DeleteResponse = Self::parse_response(response).await?;
        Ok(deleted.deleted)
    }
}
