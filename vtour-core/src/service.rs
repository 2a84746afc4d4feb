//! Tour facade
//!
//! The narrow set of operations a front end drives: markers, albums,
//! photo deletion, image bytes, cancellation and the saved map region.
//! Owns the store handle, the catalog client and the autosave loop for one
//! session.

use crate::catalog::CatalogClient;
use crate::error::{Error, Result};
use crate::model::{MapRegion, Marker, Photo};
use crate::store::{AutosaveHandle, BatchGuard, Store};
use crate::transport::Transport;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vtour_common::config::{self, TomlConfig};

pub struct TourService {
    store: Store,
    catalog: Arc<CatalogClient>,
    autosave: Mutex<Option<AutosaveHandle>>,
}

impl TourService {
    /// Service over an existing store and catalog, without autosave
    pub fn new(store: Store, catalog: CatalogClient) -> Self {
        Self {
            store,
            catalog: Arc::new(catalog),
            autosave: Mutex::new(None),
        }
    }

    /// Open the store under `root_folder` and start autosave per config
    ///
    /// A missing API key is not fatal here: only album fetches need it.
    pub async fn open(config: &TomlConfig, root_folder: &Path) -> Result<Self> {
        let db_path = config::prepare_database_path(root_folder, &config.store)?;
        info!("Database: {}", db_path.display());
        let store = Store::open(&db_path).await?;

        let transport = Transport::from_config(&config.catalog)
            .map_err(|e| Error::Common(vtour_common::Error::Config(e.to_string())))?;
        let api_key = match config::resolve_api_key(&config.catalog) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!("{}", e);
                None
            }
        };
        let catalog = CatalogClient::new(Arc::new(transport), config.catalog.clone(), api_key);

        let service = Self::new(store, catalog);
        service.start_autosave(config.store.autosave_interval_secs).await;
        Ok(service)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn catalog(&self) -> &CatalogClient {
        &self.catalog
    }

    /// (Re)start the autosave loop; `interval_secs <= 0` leaves it off
    pub async fn start_autosave(&self, interval_secs: i64) {
        let mut slot = self.autosave.lock().await;
        if let Some(previous) = slot.take() {
            previous.stop().await;
        }
        *slot = self.store.start_autosave(interval_secs);
    }

    /// Validate and insert a marker; not saved until the next save
    pub async fn create_marker(&self, latitude: f64, longitude: f64) -> Result<Marker> {
        let marker = Marker::new(latitude, longitude)?;
        let marker = self.store.insert_marker(marker).await?;
        info!(marker_id = %marker.id, latitude, longitude, "Created marker");
        Ok(marker)
    }

    pub async fn list_markers(&self) -> Result<Vec<Marker>> {
        Ok(self.store.markers().await?)
    }

    pub async fn marker(&self, marker_id: Uuid) -> Result<Marker> {
        self.store
            .marker(marker_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("marker {}", marker_id)))
    }

    pub async fn find_marker_at(&self, latitude: f64, longitude: f64) -> Result<Option<Marker>> {
        Ok(self.store.find_marker_at(latitude, longitude).await?)
    }

    /// Delete a marker with its photos, then save
    pub async fn delete_marker(&self, marker_id: Uuid) -> Result<usize> {
        let photos = self.store.delete_marker(marker_id).await?;
        self.store.save().await?;
        Ok(photos)
    }

    /// The persisted album, without touching the network
    pub async fn album(&self, marker_id: Uuid) -> Result<Vec<Photo>> {
        Ok(self.store.album(marker_id).await?)
    }

    /// Existing album if there is one, otherwise a fresh fetch
    pub async fn open_album(&self, marker_id: Uuid) -> Result<Vec<Photo>> {
        let existing = self.album(marker_id).await?;
        if !existing.is_empty() {
            debug!(marker_id = %marker_id, photos = existing.len(), "Using stored album");
            return Ok(existing);
        }
        self.fetch_album(marker_id).await
    }

    /// Replace a marker's album with a fresh random one
    ///
    /// The old album is discarded and saved before any request goes out. If
    /// pending work is cancelled while the fetch runs, nothing is applied and
    /// the result is [`Error::Cancelled`].
    pub async fn fetch_album(&self, marker_id: Uuid) -> Result<Vec<Photo>> {
        let marker = self.marker(marker_id).await?;
        let request = self.catalog.transport().ticket();

        let album = self.store.begin_album(marker_id).await?;
        self.store.save().await?;

        let candidates = self.catalog.photos_near(marker.latitude, marker.longitude).await?;
        let fetched = candidates.len();

        self.store
            .perform_batch(BatchGuard::for_album(album, request), move |ctx| {
                for photo in candidates {
                    ctx.insert_photo(marker_id, photo)?;
                }
                Ok(())
            })
            .await?;
        self.store.save().await?;

        let photos = self.store.album(marker_id).await?;
        info!(marker_id = %marker_id, fetched, photos = photos.len(), "Album ready");
        Ok(photos)
    }

    /// Delete photos by id, then save
    pub async fn delete_photos(&self, photo_ids: &[Uuid]) -> Result<usize> {
        let removed = self.store.delete_photos(photo_ids.to_vec()).await?;
        self.store.save().await?;
        debug!(requested = photo_ids.len(), removed, "Deleted photos");
        Ok(removed)
    }

    /// Abort every in-flight request; their results will not be applied
    pub fn cancel_pending_work(&self) {
        self.catalog.transport().cancel_all_pending();
    }

    /// Image bytes for a photo, fetched and cached on first use
    pub async fn fetch_image_bytes(&self, photo_id: Uuid) -> Result<Vec<u8>> {
        let photo = self
            .store
            .photo(photo_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("photo {}", photo_id)))?;

        if let Some(bytes) = photo.image_data {
            return Ok(bytes);
        }
        let path = photo
            .path
            .ok_or_else(|| Error::NotFound(format!("source path for photo {}", photo_id)))?;

        let request = self.catalog.transport().ticket();
        let bytes = self.catalog.image_data(&path).await?;
        self.store.attach_image(photo_id, bytes.clone(), Some(request)).await?;
        Ok(bytes)
    }

    /// Remember the visible map area
    pub async fn save_map_region(&self, region: MapRegion) -> Result<()> {
        region.validate()?;
        self.store.save_map_region(&region).await?;
        self.store.save().await?;
        Ok(())
    }

    pub async fn map_region(&self) -> Result<Option<MapRegion>> {
        Ok(self.store.map_region().await?)
    }

    /// Remove all markers, photos and settings
    pub async fn reset(&self) -> Result<()> {
        self.cancel_pending_work();
        self.store.reset().await?;
        info!("All data removed");
        Ok(())
    }

    /// Stop autosave and close the store so buffered writes reach disk
    pub async fn shutdown(&self) -> Result<()> {
        if let Some(handle) = self.autosave.lock().await.take() {
            handle.stop().await;
        }
        self.store.close().await?;
        let health = self.store.disk_health().await;
        if let Some(last_error) = &health.last_error {
            warn!(failed = health.batches_failed, last_error = %last_error, "Some writes did not reach disk");
        }
        Ok(())
    }
}
