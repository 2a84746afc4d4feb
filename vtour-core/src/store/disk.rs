//! Disk tier
//!
//! The only code that performs database I/O. One task owns the
//! single-connection pool and handles commands strictly in arrival order.
//! Each change set is written in its own transaction.
//!
//! A failed write cannot be retried by the caller (the interactive tier has
//! moved on), so it is logged at `error!` and recorded in [`DiskHealth`].

use super::changes::{ChangeSet, Graph};
use super::StoreError;
use crate::model::{Marker, Photo};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, error, info, warn};
use vtour_common::db::{MarkerRow, PhotoRow, Setting};

/// Outcome counters for background writes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiskHealth {
    pub batches_written: u64,
    pub batches_failed: u64,
    pub last_error: Option<String>,
}

pub(crate) enum DiskCommand {
    Write(ChangeSet),
    /// Acknowledged once everything queued before it is handled
    Sync(oneshot::Sender<()>),
    Reset(oneshot::Sender<Result<(), StoreError>>),
    Close(oneshot::Sender<()>),
}

/// Handle to the disk-writing task
#[derive(Clone)]
pub(crate) struct DiskTier {
    sender: mpsc::UnboundedSender<DiskCommand>,
    health: Arc<RwLock<DiskHealth>>,
}

impl DiskTier {
    pub fn spawn(pool: SqlitePool) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let health = Arc::new(RwLock::new(DiskHealth::default()));
        tokio::spawn(run(pool, receiver, Arc::clone(&health)));
        Self { sender, health }
    }

    pub fn write(&self, changes: ChangeSet) -> Result<(), StoreError> {
        self.sender
            .send(DiskCommand::Write(changes))
            .map_err(|_| StoreError::Closed)
    }

    pub async fn sync(&self) -> Result<(), StoreError> {
        let (ack, done) = oneshot::channel();
        self.sender.send(DiskCommand::Sync(ack)).map_err(|_| StoreError::Closed)?;
        done.await.map_err(|_| StoreError::Closed)
    }

    pub async fn reset(&self) -> Result<(), StoreError> {
        let (resp, result) = oneshot::channel();
        self.sender.send(DiskCommand::Reset(resp)).map_err(|_| StoreError::Closed)?;
        result.await.map_err(|_| StoreError::Closed)?
    }

    pub async fn close(&self) -> Result<(), StoreError> {
        let (ack, done) = oneshot::channel();
        self.sender.send(DiskCommand::Close(ack)).map_err(|_| StoreError::Closed)?;
        done.await.map_err(|_| StoreError::Closed)
    }

    pub async fn health(&self) -> DiskHealth {
        self.health.read().await.clone()
    }
}

async fn run(
    pool: SqlitePool,
    mut receiver: mpsc::UnboundedReceiver<DiskCommand>,
    health: Arc<RwLock<DiskHealth>>,
) {
    debug!("Disk tier started");

    while let Some(command) = receiver.recv().await {
        match command {
            DiskCommand::Write(changes) => {
                let (markers, photos, deletions, settings) = changes.summary();
                match write_changes(&pool, &changes).await {
                    Ok(()) => {
                        health.write().await.batches_written += 1;
                        debug!(markers, photos, deletions, settings, "Wrote change set to disk");
                    }
                    Err(e) => {
                        error!(error = %e, markers, photos, deletions, "Disk write failed, change set dropped");
                        let mut health = health.write().await;
                        health.batches_failed += 1;
                        health.last_error = Some(e.to_string());
                    }
                }
            }
            DiskCommand::Sync(ack) => {
                let _ = ack.send(());
            }
            DiskCommand::Reset(resp) => {
                let result = reset(&pool).await;
                if let Err(e) = &result {
                    error!(error = %e, "Store reset failed, previous contents kept");
                }
                let _ = resp.send(result);
            }
            DiskCommand::Close(ack) => {
                pool.close().await;
                info!("Disk tier closed");
                let _ = ack.send(());
                return;
            }
        }
    }

    pool.close().await;
    debug!("Disk tier channel closed");
}

async fn write_changes(pool: &SqlitePool, changes: &ChangeSet) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;

    for id in &changes.deleted_photos {
        sqlx::query("DELETE FROM photos WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
    }

    for id in &changes.deleted_markers {
        // Explicit so the cascade does not depend on the foreign_keys pragma
        sqlx::query("DELETE FROM photos WHERE marker_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM markers WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
    }

    for marker in changes.upserted_markers.values() {
        upsert_marker(&mut tx, marker.to_row()).await?;
    }

    for photo in changes.upserted_photos.values() {
        let row = photo
            .to_row()
            .ok_or_else(|| StoreError::Integrity(format!("photo {} has no owning marker", photo.id)))?;
        upsert_photo(&mut tx, row).await?;
    }

    for (key, value) in &changes.settings {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn upsert_marker(tx: &mut Transaction<'_, Sqlite>, row: MarkerRow) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO markers (id, latitude, longitude, created_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            latitude = excluded.latitude,
            longitude = excluded.longitude
        "#,
    )
    .bind(&row.id)
    .bind(row.latitude)
    .bind(row.longitude)
    .bind(&row.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_photo(tx: &mut Transaction<'_, Sqlite>, row: PhotoRow) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO photos (id, marker_id, title, path, width, height, image_data)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            marker_id = excluded.marker_id,
            title = excluded.title,
            path = excluded.path,
            width = excluded.width,
            height = excluded.height,
            image_data = excluded.image_data
        "#,
    )
    .bind(&row.id)
    .bind(&row.marker_id)
    .bind(&row.title)
    .bind(&row.path)
    .bind(row.width)
    .bind(row.height)
    .bind(&row.image_data)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Clear every row in one transaction
async fn reset(pool: &SqlitePool) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM photos").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM markers").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM settings").execute(&mut *tx).await?;
    tx.commit().await?;
    info!("Store reset: all markers, photos and settings removed");
    Ok(())
}

/// Read the whole persisted graph
///
/// Rows that no longer decode are skipped with a warning.
pub(crate) async fn load_graph(pool: &SqlitePool) -> Result<Graph, StoreError> {
    let marker_rows: Vec<MarkerRow> =
        sqlx::query_as("SELECT id, latitude, longitude, created_at FROM markers")
            .fetch_all(pool)
            .await?;
    let photo_rows: Vec<PhotoRow> = sqlx::query_as(
        "SELECT id, marker_id, title, path, width, height, image_data FROM photos",
    )
    .fetch_all(pool)
    .await?;
    let setting_rows: Vec<Setting> = sqlx::query_as("SELECT key, value FROM settings")
        .fetch_all(pool)
        .await?;

    let mut graph = Graph::default();

    for row in marker_rows {
        let id = row.id.clone();
        match Marker::from_row(row) {
            Ok(marker) => {
                graph.markers.insert(marker.id, marker);
            }
            Err(e) => warn!(marker_id = %id, error = %e, "Skipping unreadable marker row"),
        }
    }

    for row in photo_rows {
        let id = row.id.clone();
        match Photo::from_row(row) {
            Ok(photo) if photo.marker_id.is_some_and(|m| graph.markers.contains_key(&m)) => {
                graph.photos.insert(photo.id, photo);
            }
            Ok(_) => warn!(photo_id = %id, "Skipping photo row without a loadable marker"),
            Err(e) => warn!(photo_id = %id, error = %e, "Skipping unreadable photo row"),
        }
    }

    for setting in setting_rows {
        graph.settings.insert(setting.key, setting.value);
    }

    info!(
        markers = graph.markers.len(),
        photos = graph.photos.len(),
        "Loaded persisted graph"
    );
    Ok(graph)
}
