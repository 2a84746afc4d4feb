//! Local persistence pipeline
//!
//! Three tiers connected by one-way channels:
//!
//! ```text
//! facade -> interactive tier -> buffering tier -> disk tier -> SQLite
//!              ^
//!              | change sets
//!           batch tier (blocking workers on graph snapshots)
//! ```
//!
//! [`Store`] is a cheap cloneable handle over the tiers. `save()` commits
//! the interactive change log and returns; the disk write happens later on
//! the disk tier. `flush()` waits for it and `close()` drains everything
//! before the database is closed.

pub mod batch;
mod buffer;
pub mod changes;
mod disk;
mod interactive;

use crate::model::{MapRegion, Marker, Photo};
use crate::transport::RequestTicket;
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

pub use batch::BatchContext;
pub use disk::DiskHealth;
pub use interactive::{AlbumTicket, BatchGuard};

use buffer::BufferTier;
use disk::DiskTier;
use interactive::{InteractiveMsg, InteractiveTier};

/// Persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Marker not found: {0}")]
    MarkerNotFound(Uuid),

    #[error("Photo not found: {0}")]
    PhotoNotFound(Uuid),

    #[error("Change set is stale")]
    Stale,

    #[error("Failed to open store: {0}")]
    Disk(String),

    #[error("Store unusable after failed commit: {0}")]
    Poisoned(String),

    #[error("Store is closed")]
    Closed,
}

/// Handle to the persistence pipeline
#[derive(Clone)]
pub struct Store {
    interactive: InteractiveTier,
    buffer: BufferTier,
}

impl Store {
    /// Open (or create) the database file and load its contents
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let pool = vtour_common::db::init_database(path)
            .await
            .map_err(|e| StoreError::Disk(e.to_string()))?;
        Self::with_pool(pool).await
    }

    /// Store backed by a private in-memory database
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let pool = vtour_common::db::init_memory_database()
            .await
            .map_err(|e| StoreError::Disk(e.to_string()))?;
        Self::with_pool(pool).await
    }

    /// Start the tiers over an initialized pool
    pub async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let graph = disk::load_graph(&pool).await?;
        let disk = DiskTier::spawn(pool);
        let buffer = BufferTier::spawn(disk);
        let interactive = InteractiveTier::spawn(graph, buffer.clone());
        Ok(Self { interactive, buffer })
    }

    pub async fn insert_marker(&self, marker: Marker) -> Result<Marker, StoreError> {
        self.interactive
            .call(|resp| InteractiveMsg::InsertMarker { resp, marker })
            .await
    }

    /// Markers in creation order
    pub async fn markers(&self) -> Result<Vec<Marker>, StoreError> {
        self.interactive.call(|resp| InteractiveMsg::Markers { resp }).await
    }

    pub async fn marker(&self, marker_id: Uuid) -> Result<Option<Marker>, StoreError> {
        self.interactive
            .call(|resp| InteractiveMsg::Marker { resp, marker_id })
            .await
    }

    pub async fn find_marker_at(&self, latitude: f64, longitude: f64) -> Result<Option<Marker>, StoreError> {
        self.interactive
            .call(|resp| InteractiveMsg::FindMarkerAt { resp, latitude, longitude })
            .await
    }

    /// A marker's photos in album order
    pub async fn album(&self, marker_id: Uuid) -> Result<Vec<Photo>, StoreError> {
        self.interactive
            .call(|resp| InteractiveMsg::Album { resp, marker_id })
            .await
    }

    pub async fn photo(&self, photo_id: Uuid) -> Result<Option<Photo>, StoreError> {
        self.interactive
            .call(|resp| InteractiveMsg::Photo { resp, photo_id })
            .await
    }

    /// Delete a marker and its photos; returns how many photos went with it
    pub async fn delete_marker(&self, marker_id: Uuid) -> Result<usize, StoreError> {
        self.interactive
            .call(|resp| InteractiveMsg::DeleteMarker { resp, marker_id })
            .await
    }

    /// Delete photos by id; unknown ids are ignored
    pub async fn delete_photos(&self, photo_ids: Vec<Uuid>) -> Result<usize, StoreError> {
        self.interactive
            .call(|resp| InteractiveMsg::DeletePhotos { resp, photo_ids })
            .await
    }

    /// Discard a marker's album and start a new album cycle
    pub async fn begin_album(&self, marker_id: Uuid) -> Result<AlbumTicket, StoreError> {
        self.interactive
            .call(|resp| InteractiveMsg::BeginAlbum { resp, marker_id })
            .await
    }

    /// Cache fetched bytes on a photo
    ///
    /// Rejected as [`StoreError::Stale`] when `request` was cancelled.
    pub async fn attach_image(
        &self,
        photo_id: Uuid,
        bytes: Vec<u8>,
        request: Option<RequestTicket>,
    ) -> Result<Photo, StoreError> {
        self.interactive
            .call(|resp| InteractiveMsg::AttachImage { resp, photo_id, bytes, request })
            .await
    }

    pub async fn set_setting(&self, key: impl Into<String>, value: impl Into<String>) -> Result<(), StoreError> {
        let (key, value) = (key.into(), value.into());
        self.interactive
            .call(|resp| InteractiveMsg::SetSetting { resp, key, value })
            .await
    }

    pub async fn setting(&self, key: impl Into<String>) -> Result<Option<String>, StoreError> {
        let key = key.into();
        self.interactive
            .call(|resp| InteractiveMsg::Setting { resp, key })
            .await
    }

    pub async fn save_map_region(&self, region: &MapRegion) -> Result<(), StoreError> {
        let value = serde_json::to_string(region).map_err(|e| StoreError::Integrity(e.to_string()))?;
        self.set_setting(MapRegion::SETTING_KEY, value).await
    }

    pub async fn map_region(&self) -> Result<Option<MapRegion>, StoreError> {
        let Some(value) = self.setting(MapRegion::SETTING_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&value) {
            Ok(region) => Ok(Some(region)),
            Err(e) => {
                debug!(error = %e, "Ignoring unreadable map region setting");
                Ok(None)
            }
        }
    }

    /// Commit pending interactive changes and schedule the disk write
    ///
    /// Returns once the commit is done; does not wait for the disk.
    /// `Ok(false)` means there was nothing to save.
    pub async fn save(&self) -> Result<bool, StoreError> {
        self.interactive.call(|resp| InteractiveMsg::Save { resp }).await
    }

    pub async fn has_changes(&self) -> Result<bool, StoreError> {
        self.interactive.call(|resp| InteractiveMsg::HasChanges { resp }).await
    }

    /// Save, then wait until the disk tier has written everything
    pub async fn flush(&self) -> Result<(), StoreError> {
        self.save().await?;
        self.buffer.drain().await
    }

    /// Run a bulk mutation off the interactive tier
    ///
    /// The closure sees a snapshot of the graph. Its changes are merged back
    /// only if `guard` is still current; otherwise the result is
    /// [`StoreError::Stale`] and nothing is applied.
    pub async fn perform_batch<F, T>(&self, guard: BatchGuard, work: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut BatchContext) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let graph = self.interactive.call(|resp| InteractiveMsg::Snapshot { resp }).await?;

        let (value, changes) = tokio::task::spawn_blocking(move || {
            let mut ctx = BatchContext::new(graph);
            let value = work(&mut ctx)?;
            Ok::<_, StoreError>((value, ctx.into_changes()))
        })
        .await
        .map_err(|e| StoreError::Integrity(format!("batch worker failed: {}", e)))??;

        self.interactive
            .call(|resp| InteractiveMsg::Merge { resp, changes, guard })
            .await?;
        Ok(value)
    }

    /// Remove every row; on failure the previous contents remain
    pub async fn reset(&self) -> Result<(), StoreError> {
        self.interactive.call(|resp| InteractiveMsg::Reset { resp }).await
    }

    /// Save, drain to disk and shut every tier down
    pub async fn close(&self) -> Result<(), StoreError> {
        let saved = self.interactive.call(|resp| InteractiveMsg::Close { resp }).await;
        let closed = self.buffer.close().await;
        saved.and(closed)
    }

    pub async fn disk_health(&self) -> DiskHealth {
        self.buffer.disk_health().await
    }

    /// Start saving every `interval_secs` seconds
    ///
    /// The first save happens immediately; each next one is scheduled after
    /// the previous returns. An interval of zero or less starts nothing.
    pub fn start_autosave(&self, interval_secs: i64) -> Option<AutosaveHandle> {
        if interval_secs <= 0 {
            info!(interval_secs, "Autosave disabled");
            return None;
        }

        let period = Duration::from_secs(interval_secs.unsigned_abs());
        let token = CancellationToken::new();
        let store = self.clone();
        let stop = token.clone();

        let handle = tokio::spawn(async move {
            loop {
                match store.save().await {
                    Ok(true) => debug!("Autosave committed changes"),
                    Ok(false) => {}
                    Err(StoreError::Closed) => break,
                    Err(e) => {
                        error!(error = %e, "Autosave failed, stopping");
                        break;
                    }
                }

                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(period) => {}
                }
            }
            debug!("Autosave loop ended");
        });

        info!(interval_secs, "Autosave started");
        Some(AutosaveHandle { token, handle })
    }
}

/// Running autosave loop
pub struct AutosaveHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl AutosaveHandle {
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub async fn stop(self) {
        self.token.cancel();
        let _ = self.handle.await;
    }
}
