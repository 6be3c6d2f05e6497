//! Wire types for the art-app control channel and the d2d data socket.

use std::fmt::Display;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ProtocolError;

/// Upper bound (exclusive) for `conn_info.connection_id`.
pub const CONNECTION_ID_LIMIT: u64 = 4 * 1024 * 1024 * 1024;

// Lenient number decoding

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString<T> {
    Number(T),
    String(String),
}

impl<T> NumberOrString<T>
where
    T: FromStr,
    T::Err: Display,
{
    fn into_number(self) -> Result<T, String> {
        match self {
            NumberOrString::Number(n) => Ok(n),
            NumberOrString::String(s) => s
                .trim()
                .parse()
                .map_err(|e| format!("'{}' is not a number: {}", s, e)),
        }
    }
}

/// Devices emit some numeric fields as JSON strings; accept both.
fn lenient_number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Deserialize<'de>,
    T::Err: Display,
{
    NumberOrString::<T>::deserialize(deserializer)?
        .into_number()
        .map_err(serde::de::Error::custom)
}

fn lenient_optional_number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Deserialize<'de>,
    T::Err: Display,
{
    Option::<NumberOrString<T>>::deserialize(deserializer)?
        .map(NumberOrString::into_number)
        .transpose()
        .map_err(serde::de::Error::custom)
}

// Data channel

/// JSON header preceding every payload on the d2d socket.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameHeader {
    #[serde(deserialize_with = "lenient_number")]
    pub file_length: u64,
    #[serde(default, deserialize_with = "lenient_optional_number")]
    pub num: Option<u32>,
    #[serde(default, deserialize_with = "lenient_optional_number")]
    pub total: Option<u32>,
}

/// Header written ahead of an uploaded image.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadHeader {
    pub num: u32,
    pub total: u32,
    pub file_length: u64,
    pub file_name: String,
    pub file_type: String,
    pub sec_key: String,
    pub version: String,
}

impl UploadHeader {
    pub fn single(file_length: u64, file_type: &str, sec_key: &str) -> Self {
        Self {
            num: 0,
            total: 1,
            file_length,
            file_name: "dummy".to_string(),
            file_type: file_type.to_string(),
            sec_key: sec_key.to_string(),
            version: "0.0.1".to_string(),
        }
    }
}

/// Where to open the data channel, decoded from a control response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionInfo {
    pub ip: String,
    #[serde(deserialize_with = "lenient_number")]
    pub port: u16,
    /// Security key echoed back in upload headers.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub secured: Option<bool>,
}

#[derive(Deserialize)]
struct ConnInfoEnvelope {
    conn_info: Option<serde_json::Value>,
}

impl ConnectionInfo {
    /// Decodes `{"conn_info": "<JSON string>"}`.
    ///
    /// The descriptor is itself a JSON document carried as a string, so the
    /// response is parsed twice.
    pub fn from_envelope(raw: &str) -> Result<Self, ProtocolError> {
        let envelope: ConnInfoEnvelope = serde_json::from_str(raw)
            .map_err(|e| ProtocolError::invalid_connection_info(format!("response: {}", e)))?;
        let nested = match envelope.conn_info {
            Some(serde_json::Value::String(nested)) => nested,
            Some(other) => {
                return Err(ProtocolError::invalid_connection_info(format!(
                    "conn_info is not a string: {}",
                    other
                )))
            }
            None => return Err(ProtocolError::invalid_connection_info("conn_info missing")),
        };
        serde_json::from_str(&nested)
            .map_err(|e| ProtocolError::invalid_connection_info(format!("conn_info: {}", e)))
    }
}

// Control channel requests

/// `conn_info` block asking the device to open a socket for us.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnInfoRequest {
    pub d2d_mode: String,
    pub connection_id: u64,
    pub id: String,
}

impl ConnInfoRequest {
    /// Random connection id in `[0, 4 * 1024^3)` and a 16-byte hex id.
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let id: [u8; 16] = rng.gen();
        Self {
            d2d_mode: "socket".to_string(),
            connection_id: rng.gen_range(0..CONNECTION_ID_LIMIT),
            id: hex::encode(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentIdRef {
    pub content_id: String,
}

/// Art-app request bodies, tagged by `request`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum ArtRequestKind {
    GetContentList {
        category: String,
    },
    GetThumbnail {
        content_id: String,
        conn_info: ConnInfoRequest,
    },
    GetThumbnailList {
        content_id_list: Vec<ContentIdRef>,
        conn_info: ConnInfoRequest,
    },
    SendImage {
        file_type: String,
        conn_info: ConnInfoRequest,
        image_date: String,
        matte_id: String,
        portrait_matte_id: String,
        file_size: u64,
    },
    DeleteImageList {
        content_id_list: Vec<ContentIdRef>,
    },
}

/// A request plus the correlation ids the device echoes back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtRequest {
    #[serde(flatten)]
    pub kind: ArtRequestKind,
    pub id: String,
    pub request_id: String,
}

impl ArtRequest {
    pub fn new(kind: ArtRequestKind) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        Self {
            kind,
            request_id: id.clone(),
            id,
        }
    }

    pub fn get_thumbnail(content_id: &str) -> Self {
        Self::new(ArtRequestKind::GetThumbnail {
            content_id: content_id.to_string(),
            conn_info: ConnInfoRequest::random(),
        })
    }

    pub fn get_thumbnail_list(content_ids: &[String]) -> Self {
        Self::new(ArtRequestKind::GetThumbnailList {
            content_id_list: content_ids
                .iter()
                .map(|id| ContentIdRef {
                    content_id: id.clone(),
                })
                .collect(),
            conn_info: ConnInfoRequest::random(),
        })
    }

    pub fn delete_image(content_id: &str) -> Self {
        Self::new(ArtRequestKind::DeleteImageList {
            content_id_list: vec![ContentIdRef {
                content_id: content_id.to_string(),
            }],
        })
    }

    /// Name of the request, as sent in the `request` field.
    pub fn name(&self) -> &'static str {
        match self.kind {
            ArtRequestKind::GetContentList { .. } => "get_content_list",
            ArtRequestKind::GetThumbnail { .. } => "get_thumbnail",
            ArtRequestKind::GetThumbnailList { .. } => "get_thumbnail_list",
            ArtRequestKind::SendImage { .. } => "send_image",
            ArtRequestKind::DeleteImageList { .. } => "delete_image_list",
        }
    }
}

// Control channel events

/// A `d2d_service_message` from the device.
///
/// `raw` is the decoded `data` string: the JSON document that carries the
/// event name, correlation ids and event-specific fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct D2dEvent {
    pub event: String,
    pub request_id: Option<String>,
    pub id: Option<String>,
    pub raw: String,
}

#[derive(Deserialize)]
struct D2dHeader {
    event: String,
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

impl D2dEvent {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let header: D2dHeader = serde_json::from_str(raw)?;
        Ok(Self {
            event: header.event,
            request_id: header.request_id,
            id: header.id,
            raw: raw.to_string(),
        })
    }

    /// Whether this event answers the request with correlation id `id`.
    pub fn correlates(&self, id: &str) -> bool {
        self.request_id.as_deref() == Some(id)
            || self.id.as_deref() == Some(id)
            || (self.is_error() && self.raw.contains(id))
    }

    pub fn is_error(&self) -> bool {
        self.event == "error"
    }

    /// `error_code` of an error event, if present.
    pub fn error_code(&self) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(&self.raw).ok()?;
        match value.get("error_code")? {
            serde_json::Value::String(code) => Some(code.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// One item from `get_content_list`.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentItem {
    pub content_id: String,
    #[serde(default, deserialize_with = "lenient_optional_number")]
    pub width: Option<u32>,
    #[serde(default, deserialize_with = "lenient_optional_number")]
    pub height: Option<u32>,
    #[serde(default, deserialize_with = "lenient_optional_number")]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub category_id: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct ContentListResponse {
    pub content_list: String,
}

#[derive(Deserialize)]
pub(crate) struct ImageAddedEvent {
    pub content_id: String,
}
