//! Entity model
//!
//! Two persisted record types:
//! - [`Marker`]: a saved point of interest (latitude/longitude)
//! - [`Photo`]: one image belonging to exactly one marker
//!
//! Plus [`MapRegion`], the last visible map area, kept in the settings table.

use chrono::{DateTime, Utc};
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::io::Cursor;
use thiserror::Error;
use uuid::Uuid;
use vtour_common::db::{MarkerRow, PhotoRow};
use vtour_common::uuid_utils;

pub const LATITUDE_RANGE: (f64, f64) = (-90.0, 90.0);
pub const LONGITUDE_RANGE: (f64, f64) = (-180.0, 180.0);

/// Entity-level validation failure
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("latitude {0} outside [-90, 90]")]
    Latitude(f64),

    #[error("longitude {0} outside [-180, 180]")]
    Longitude(f64),

    #[error("invalid stored row: {0}")]
    Row(String),
}

/// Check a coordinate pair against the valid ranges
///
/// NaN fails both range checks and is rejected.
pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), ModelError> {
    if !(LATITUDE_RANGE.0..=LATITUDE_RANGE.1).contains(&latitude) {
        return Err(ModelError::Latitude(latitude));
    }
    if !(LONGITUDE_RANGE.0..=LONGITUDE_RANGE.1).contains(&longitude) {
        return Err(ModelError::Longitude(longitude));
    }
    Ok(())
}

/// A geographic point of interest owning an album of photos
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub created_at: DateTime<Utc>,
}

impl Marker {
    /// Create a new marker with a fresh identity
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ModelError> {
        validate_coordinates(latitude, longitude)?;
        Ok(Self {
            id: uuid_utils::generate(),
            latitude,
            longitude,
            created_at: vtour_common::time::now(),
        })
    }

    /// Exact coordinate match (the map hands back the coordinates it was given)
    pub fn is_at(&self, latitude: f64, longitude: f64) -> bool {
        self.latitude == latitude && self.longitude == longitude
    }

    pub fn to_row(&self) -> MarkerRow {
        MarkerRow {
            id: self.id.to_string(),
            latitude: self.latitude,
            longitude: self.longitude,
            created_at: vtour_common::time::to_db_string(&self.created_at),
        }
    }

    pub fn from_row(row: MarkerRow) -> Result<Self, ModelError> {
        let id = uuid_utils::parse_column("markers.id", &row.id)
            .map_err(|e| ModelError::Row(e.to_string()))?;
        validate_coordinates(row.latitude, row.longitude)?;
        Ok(Self {
            id,
            latitude: row.latitude,
            longitude: row.longitude,
            created_at: vtour_common::time::from_db_string(&row.created_at),
        })
    }
}

/// A single image associated with a marker
///
/// Either fully materialized (`image_data` present) or a lazy reference
/// whose bytes are fetched from `path` on demand.
#[derive(Clone, PartialEq)]
pub struct Photo {
    pub id: Uuid,
    /// Owning marker; `None` until the photo is adopted into an album
    pub marker_id: Option<Uuid>,
    pub title: Option<String>,
    /// Source URL
    pub path: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub image_data: Option<Vec<u8>>,
}

impl std::fmt::Debug for Photo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Photo")
            .field("id", &self.id)
            .field("marker_id", &self.marker_id)
            .field("title", &self.title)
            .field("path", &self.path)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("image_bytes", &self.image_data.as_ref().map(Vec::len))
            .finish()
    }
}

impl Photo {
    /// Photo decoded from a catalog search result: path known, bytes absent
    pub fn from_catalog(
        title: Option<String>,
        path: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
    ) -> Self {
        Self {
            id: uuid_utils::generate(),
            marker_id: None,
            title,
            path,
            width,
            height,
            image_data: None,
        }
    }

    /// Photo built from an image already in memory, stored as PNG
    pub fn from_image(title: impl Into<String>, image: &DynamicImage) -> Result<Self, image::ImageError> {
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(Self {
            id: uuid_utils::generate(),
            marker_id: None,
            title: Some(title.into()),
            path: None,
            width: Some(image.width()),
            height: Some(image.height()),
            image_data: Some(bytes),
        })
    }

    pub fn has_image(&self) -> bool {
        self.image_data.is_some()
    }

    /// Decode the cached bytes, if any
    pub fn image(&self) -> Option<DynamicImage> {
        let bytes = self.image_data.as_ref()?;
        match image::load_from_memory(bytes) {
            Ok(img) => Some(img),
            Err(e) => {
                tracing::debug!(photo_id = %self.id, error = %e, "Cached photo bytes did not decode");
                None
            }
        }
    }

    pub fn to_row(&self) -> Option<PhotoRow> {
        let marker_id = self.marker_id?;
        Some(PhotoRow {
            id: self.id.to_string(),
            marker_id: marker_id.to_string(),
            title: self.title.clone(),
            path: self.path.clone(),
            width: self.width.map(i64::from),
            height: self.height.map(i64::from),
            image_data: self.image_data.clone(),
        })
    }

    pub fn from_row(row: PhotoRow) -> Result<Self, ModelError> {
        let id = uuid_utils::parse_column("photos.id", &row.id)
            .map_err(|e| ModelError::Row(e.to_string()))?;
        let marker_id = uuid_utils::parse_column("photos.marker_id", &row.marker_id)
            .map_err(|e| ModelError::Row(e.to_string()))?;
        Ok(Self {
            id,
            marker_id: Some(marker_id),
            title: row.title,
            path: row.path,
            width: row.width.and_then(|w| u32::try_from(w).ok()),
            height: row.height.and_then(|h| u32::try_from(h).ok()),
            image_data: row.image_data,
        })
    }
}

/// Album ordering: path ascending, photos without a path last
///
/// A missing path never compares equal to a present one; two missing paths
/// compare equal, so a stable sort keeps their relative order.
pub fn compare_by_path(a: &Photo, b: &Photo) -> Ordering {
    match (&a.path, &b.path) {
        (Some(l), Some(r)) => l.cmp(r),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Sort an album in place according to [`compare_by_path`]
pub fn sort_album(photos: &mut [Photo]) {
    photos.sort_by(compare_by_path);
}

/// Last visible map area
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapRegion {
    pub center_latitude: f64,
    pub center_longitude: f64,
    pub latitude_delta: f64,
    pub longitude_delta: f64,
}

impl MapRegion {
    pub const SETTING_KEY: &'static str = "map_region";

    pub fn validate(&self) -> Result<(), ModelError> {
        validate_coordinates(self.center_latitude, self.center_longitude)
    }
}
