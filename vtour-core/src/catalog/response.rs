//! Search response envelope
//!
//! ```json
//! {"stat": "ok", "photos": {"page": 1, "pages": 12, "total": "2950",
//!   "photo": [{"title": "...", "url_m": "https://...", "height_m": "375", "width_m": "500"}]}}
//! ```
//!
//! Numeric fields arrive as numbers or numeric strings depending on the
//! service; both are accepted and anything else reads as absent.

use super::CatalogError;
use crate::model::Photo;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

const OK_STATUS: &str = "ok";

#[derive(Debug, Deserialize)]
pub struct SearchEnvelope {
    pub stat: Option<String>,
    pub message: Option<String>,
    pub photos: Option<PhotosPage>,
}

#[derive(Debug, Deserialize)]
pub struct PhotosPage {
    #[serde(default, deserialize_with = "lenient_u32")]
    pub page: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub pages: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub total: Option<u32>,
    pub photo: Option<Vec<PhotoRecord>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoRecord {
    pub title: Option<String>,
    pub url_m: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub height_m: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub width_m: Option<u32>,
}

impl PhotoRecord {
    pub fn into_photo(self) -> Photo {
        Photo::from_catalog(self.title, self.url_m, self.width_m, self.height_m)
    }
}

fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

/// Decode a response body and unwrap its `photos` object
///
/// A non-`ok` status is a rejection carrying the service's message; a body
/// that is not JSON or lacks `photos` is malformed.
pub fn decode_page(body: &[u8]) -> Result<PhotosPage, CatalogError> {
    let envelope: SearchEnvelope = serde_json::from_slice(body)
        .map_err(|e| CatalogError::MalformedResponse(format!("invalid JSON: {}", e)))?;

    if let Some(stat) = envelope.stat.as_deref() {
        if stat != OK_STATUS {
            return Err(CatalogError::Rejected {
                message: envelope
                    .message
                    .unwrap_or_else(|| format!("service status '{}'", stat)),
            });
        }
    }

    envelope
        .photos
        .ok_or_else(|| CatalogError::MalformedResponse("missing 'photos' object".to_string()))
}
