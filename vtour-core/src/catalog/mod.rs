//! Remote photo catalog client
//!
//! Turns a marker location into a bounded album of photo candidates using
//! two searches: one to learn the page count, one for a random page. A
//! random contiguous window of that page becomes the album.
//!
//! Nothing here writes to the store. Results are transient [`Photo`] records
//! the caller decides to persist. No request is retried.

pub mod response;
pub mod sampling;

use crate::model::{sort_album, Photo};
use crate::transport::{Transport, TransportError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info};
use vtour_common::config::CatalogConfig;

pub use sampling::BoundingBox;

/// Catalog client errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Malformed catalog response: {0}")]
    MalformedResponse(String),

    #[error("Photo search failed: no photos found")]
    EmptyResult,

    #[error("Catalog rejected request: {message}")]
    Rejected { message: String },

    #[error("Catalog API key not configured")]
    NotConfigured,
}

/// Query parameter names
mod keys {
    pub const METHOD: &str = "method";
    pub const API_KEY: &str = "api_key";
    pub const BBOX: &str = "bbox";
    pub const FORMAT: &str = "format";
    pub const NO_JSON_CALLBACK: &str = "nojsoncallback";
    pub const EXTRAS: &str = "extras";
    pub const PER_PAGE: &str = "per_page";
    pub const SAFE_SEARCH: &str = "safe_search";
    pub const PAGE: &str = "page";
}

/// Image search client bound to one transport
pub struct CatalogClient {
    transport: Arc<Transport>,
    config: CatalogConfig,
    api_key: Option<String>,
    rng: Mutex<StdRng>,
}

impl CatalogClient {
    /// Searches need `api_key`; single-image fetches work without it
    pub fn new(transport: Arc<Transport>, config: CatalogConfig, api_key: Option<String>) -> Self {
        Self::with_rng(transport, config, api_key, StdRng::from_entropy())
    }

    /// Client with a caller-supplied random source (seeded in tests)
    pub fn with_rng(
        transport: Arc<Transport>,
        config: CatalogConfig,
        api_key: Option<String>,
        rng: StdRng,
    ) -> Self {
        Self {
            transport,
            config,
            api_key,
            rng: Mutex::new(rng),
        }
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    pub fn bounding_box(&self, latitude: f64, longitude: f64) -> BoundingBox {
        BoundingBox::around(
            latitude,
            longitude,
            self.config.bbox_half_width,
            self.config.bbox_half_height,
        )
    }

    /// Search parameters for a box; `page` omitted for page-count discovery
    pub fn search_params(&self, bbox: &BoundingBox, page: Option<u32>) -> Result<BTreeMap<String, String>, CatalogError> {
        let api_key = self.api_key.as_ref().ok_or(CatalogError::NotConfigured)?;
        let mut params = BTreeMap::new();
        params.insert(keys::METHOD.to_string(), self.config.search_method.clone());
        params.insert(keys::API_KEY.to_string(), api_key.clone());
        params.insert(keys::BBOX.to_string(), bbox.to_param());
        params.insert(keys::FORMAT.to_string(), "json".to_string());
        params.insert(keys::NO_JSON_CALLBACK.to_string(), "1".to_string());
        params.insert(keys::EXTRAS.to_string(), "url_m".to_string());
        params.insert(keys::PER_PAGE.to_string(), self.config.per_page.to_string());
        params.insert(
            keys::SAFE_SEARCH.to_string(),
            if self.config.safe_search { "1" } else { "0" }.to_string(),
        );
        if let Some(page) = page {
            params.insert(keys::PAGE.to_string(), page.to_string());
        }
        Ok(params)
    }

    async fn search(&self, params: &BTreeMap<String, String>) -> Result<response::PhotosPage, CatalogError> {
        let url = self.transport.build_url(None, None, params)?;
        let body = self.transport.get(url).await?;
        response::decode_page(&body)
    }

    /// Total number of result pages for the box
    pub async fn page_count(&self, bbox: &BoundingBox) -> Result<u32, CatalogError> {
        let page = self.search(&self.search_params(bbox, None)?).await?;
        let pages = page
            .pages
            .ok_or_else(|| CatalogError::MalformedResponse("missing 'pages' field".to_string()))?;
        debug!(bbox = %bbox.to_param(), pages, total = ?page.total, "Discovered page count");
        Ok(pages)
    }

    /// Fetch a random album of photos around a location
    ///
    /// Returned photos have no owner yet and are sorted by path.
    pub async fn photos_near(&self, latitude: f64, longitude: f64) -> Result<Vec<Photo>, CatalogError> {
        let bbox = self.bounding_box(latitude, longitude);
        let pages = self.page_count(&bbox).await?;

        let page_number = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            sampling::select_page(&mut *rng, pages)
        }
        .ok_or(CatalogError::EmptyResult)?;

        let page = self.search(&self.search_params(&bbox, Some(page_number))?).await?;
        let records = page
            .photo
            .ok_or_else(|| CatalogError::MalformedResponse("missing 'photo' list".to_string()))?;
        if records.is_empty() {
            return Err(CatalogError::EmptyResult);
        }

        let available = records.len();
        let window = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            sampling::sample_window(&mut *rng, records, self.config.album_size)
        };

        let mut photos: Vec<Photo> = window.into_iter().map(response::PhotoRecord::into_photo).collect();
        sort_album(&mut photos);

        info!(
            latitude,
            longitude,
            page = page_number,
            pages,
            available,
            album = photos.len(),
            "Fetched album candidates"
        );
        Ok(photos)
    }

    /// Raw bytes of one image
    pub async fn image_data(&self, path: &str) -> Result<Vec<u8>, CatalogError> {
        let bytes = self.transport.get_str(path).await?;
        debug!(path, bytes = bytes.len(), "Fetched image");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Endpoint;
    use std::time::Duration;

    fn client() -> CatalogClient {
        let config = CatalogConfig::default();
        let transport = Transport::new(Endpoint::from_config(&config), Duration::from_secs(5), 5).unwrap();
        CatalogClient::with_rng(
            Arc::new(transport),
            config,
            Some("key123".into()),
            StdRng::seed_from_u64(0),
        )
    }

    #[test]
    fn test_search_params_without_page() {
        let client = client();
        let bbox = client.bounding_box(45.0, 78.0);
        let params = client.search_params(&bbox, None).unwrap();

        assert_eq!(params.get("method").map(String::as_str), Some("flickr.photos.search"));
        assert_eq!(params.get("api_key").map(String::as_str), Some("key123"));
        assert_eq!(params.get("bbox").map(String::as_str), Some("77,44,79,46"));
        assert_eq!(params.get("format").map(String::as_str), Some("json"));
        assert_eq!(params.get("nojsoncallback").map(String::as_str), Some("1"));
        assert_eq!(params.get("extras").map(String::as_str), Some("url_m"));
        assert_eq!(params.get("per_page").map(String::as_str), Some("250"));
        assert_eq!(params.get("safe_search").map(String::as_str), Some("1"));
        assert!(!params.contains_key("page"));
    }

    #[test]
    fn test_search_params_with_page() {
        let client = client();
        let bbox = client.bounding_box(0.0, 0.0);
        let params = client.search_params(&bbox, Some(7)).unwrap();
        assert_eq!(params.get("page").map(String::as_str), Some("7"));
    }

    #[test]
    fn test_search_without_key_is_not_configured() {
        let config = CatalogConfig::default();
        let transport = Transport::from_config(&config).unwrap();
        let client = CatalogClient::new(Arc::new(transport), config, None);
        let bbox = client.bounding_box(0.0, 0.0);
        assert!(matches!(client.search_params(&bbox, None), Err(CatalogError::NotConfigured)));
    }
}
