//! Interactive tier
//!
//! One task exclusively owns the live object graph and the log of changes
//! made since the last save. Every read and write from the facade is a
//! message to that task, so mutations are serialized and visible to the
//! next read immediately. Nothing outside the task holds a reference into
//! the graph: readers receive clones.
//!
//! Saving commits the change log to the buffering tier and returns without
//! waiting for the disk. A change log that fails validation poisons the
//! tier; every later request fails with [`StoreError::Poisoned`].

use super::buffer::BufferTier;
use super::changes::{ChangeSet, Graph};
use super::StoreError;
use crate::model::{Marker, Photo};
use crate::transport::RequestTicket;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub(crate) type Resp<T> = oneshot::Sender<Result<T, StoreError>>;

const CHANNEL_CAPACITY: usize = 1024;

/// Marks one album cycle of a marker
///
/// Starting a new cycle for the same marker, or deleting the marker,
/// invalidates earlier tickets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlbumTicket {
    pub marker_id: Uuid,
    epoch: u64,
}

/// Conditions under which a merged change set is still wanted
#[derive(Debug, Clone, Default)]
pub struct BatchGuard {
    pub request: Option<RequestTicket>,
    pub album: Option<AlbumTicket>,
}

impl BatchGuard {
    pub fn unguarded() -> Self {
        Self::default()
    }

    pub fn for_album(album: AlbumTicket, request: RequestTicket) -> Self {
        Self {
            request: Some(request),
            album: Some(album),
        }
    }
}

pub(crate) enum InteractiveMsg {
    InsertMarker { resp: Resp<Marker>, marker: Marker },
    Markers { resp: Resp<Vec<Marker>> },
    Marker { resp: Resp<Option<Marker>>, marker_id: Uuid },
    FindMarkerAt { resp: Resp<Option<Marker>>, latitude: f64, longitude: f64 },
    Album { resp: Resp<Vec<Photo>>, marker_id: Uuid },
    Photo { resp: Resp<Option<Photo>>, photo_id: Uuid },
    DeleteMarker { resp: Resp<usize>, marker_id: Uuid },
    DeletePhotos { resp: Resp<usize>, photo_ids: Vec<Uuid> },
    BeginAlbum { resp: Resp<AlbumTicket>, marker_id: Uuid },
    AttachImage {
        resp: Resp<Photo>,
        photo_id: Uuid,
        bytes: Vec<u8>,
        request: Option<RequestTicket>,
    },
    Snapshot { resp: Resp<Graph> },
    Merge { resp: Resp<()>, changes: ChangeSet, guard: BatchGuard },
    SetSetting { resp: Resp<()>, key: String, value: String },
    Setting { resp: Resp<Option<String>>, key: String },
    Save { resp: Resp<bool> },
    HasChanges { resp: Resp<bool> },
    Reset { resp: Resp<()> },
    Close { resp: Resp<()> },
}

impl InteractiveMsg {
    fn reject(self, err: StoreError) {
        match self {
            InteractiveMsg::InsertMarker { resp, .. } => {
                let _ = resp.send(Err(err));
            }
            InteractiveMsg::Markers { resp } => {
                let _ = resp.send(Err(err));
            }
            InteractiveMsg::Marker { resp, .. } => {
                let _ = resp.send(Err(err));
            }
            InteractiveMsg::FindMarkerAt { resp, .. } => {
                let _ = resp.send(Err(err));
            }
            InteractiveMsg::Album { resp, .. } => {
                let _ = resp.send(Err(err));
            }
            InteractiveMsg::Photo { resp, .. } => {
                let _ = resp.send(Err(err));
            }
            InteractiveMsg::DeleteMarker { resp, .. } => {
                let _ = resp.send(Err(err));
            }
            InteractiveMsg::DeletePhotos { resp, .. } => {
                let _ = resp.send(Err(err));
            }
            InteractiveMsg::BeginAlbum { resp, .. } => {
                let _ = resp.send(Err(err));
            }
            InteractiveMsg::AttachImage { resp, .. } => {
                let _ = resp.send(Err(err));
            }
            InteractiveMsg::Snapshot { resp } => {
                let _ = resp.send(Err(err));
            }
            InteractiveMsg::Merge { resp, .. } => {
                let _ = resp.send(Err(err));
            }
            InteractiveMsg::SetSetting { resp, .. } => {
                let _ = resp.send(Err(err));
            }
            InteractiveMsg::Setting { resp, .. } => {
                let _ = resp.send(Err(err));
            }
            InteractiveMsg::Save { resp } => {
                let _ = resp.send(Err(err));
            }
            InteractiveMsg::HasChanges { resp } => {
                let _ = resp.send(Err(err));
            }
            InteractiveMsg::Reset { resp } => {
                let _ = resp.send(Err(err));
            }
            InteractiveMsg::Close { resp } => {
                let _ = resp.send(Err(err));
            }
        }
    }
}

/// Handle to the interactive task
#[derive(Clone)]
pub(crate) struct InteractiveTier {
    sender: mpsc::Sender<InteractiveMsg>,
}

impl InteractiveTier {
    pub fn spawn(graph: Graph, buffer: BufferTier) -> Self {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let state = InteractiveState {
            graph,
            pending: ChangeSet::default(),
            album_epochs: HashMap::new(),
            next_epoch: 0,
            poisoned: None,
            buffer,
        };
        tokio::spawn(run(state, receiver));
        Self { sender }
    }

    pub async fn call<T>(&self, build: impl FnOnce(Resp<T>) -> InteractiveMsg) -> Result<T, StoreError> {
        let (resp, result) = oneshot::channel();
        self.sender.send(build(resp)).await.map_err(|_| StoreError::Closed)?;
        result.await.map_err(|_| StoreError::Closed)?
    }
}

struct InteractiveState {
    graph: Graph,
    pending: ChangeSet,
    album_epochs: HashMap<Uuid, u64>,
    next_epoch: u64,
    poisoned: Option<String>,
    buffer: BufferTier,
}

async fn run(mut state: InteractiveState, mut receiver: mpsc::Receiver<InteractiveMsg>) {
    debug!(
        markers = state.graph.markers.len(),
        photos = state.graph.photos.len(),
        "Interactive tier started"
    );

    while let Some(msg) = receiver.recv().await {
        if let Some(reason) = &state.poisoned {
            let closing = matches!(msg, InteractiveMsg::Close { .. });
            msg.reject(StoreError::Poisoned(reason.clone()));
            if closing {
                break;
            }
            continue;
        }

        match msg {
            InteractiveMsg::InsertMarker { resp, marker } => {
                let _ = resp.send(Ok(state.insert_marker(marker)));
            }
            InteractiveMsg::Markers { resp } => {
                let _ = resp.send(Ok(state.graph.markers_in_order()));
            }
            InteractiveMsg::Marker { resp, marker_id } => {
                let _ = resp.send(Ok(state.graph.markers.get(&marker_id).cloned()));
            }
            InteractiveMsg::FindMarkerAt { resp, latitude, longitude } => {
                let found = state
                    .graph
                    .markers_in_order()
                    .into_iter()
                    .find(|m| m.is_at(latitude, longitude));
                let _ = resp.send(Ok(found));
            }
            InteractiveMsg::Album { resp, marker_id } => {
                let result = if state.graph.markers.contains_key(&marker_id) {
                    Ok(state.graph.album(marker_id))
                } else {
                    Err(StoreError::MarkerNotFound(marker_id))
                };
                let _ = resp.send(result);
            }
            InteractiveMsg::Photo { resp, photo_id } => {
                let _ = resp.send(Ok(state.graph.photos.get(&photo_id).cloned()));
            }
            InteractiveMsg::DeleteMarker { resp, marker_id } => {
                let _ = resp.send(state.delete_marker(marker_id));
            }
            InteractiveMsg::DeletePhotos { resp, photo_ids } => {
                let _ = resp.send(Ok(state.delete_photos(&photo_ids)));
            }
            InteractiveMsg::BeginAlbum { resp, marker_id } => {
                let _ = resp.send(state.begin_album(marker_id));
            }
            InteractiveMsg::AttachImage { resp, photo_id, bytes, request } => {
                let _ = resp.send(state.attach_image(photo_id, bytes, request));
            }
            InteractiveMsg::Snapshot { resp } => {
                let _ = resp.send(Ok(state.graph.clone()));
            }
            InteractiveMsg::Merge { resp, changes, guard } => {
                let _ = resp.send(state.merge(changes, guard));
            }
            InteractiveMsg::SetSetting { resp, key, value } => {
                state.graph.settings.insert(key.clone(), value.clone());
                state.pending.set_setting(key, value);
                let _ = resp.send(Ok(()));
            }
            InteractiveMsg::Setting { resp, key } => {
                let _ = resp.send(Ok(state.graph.settings.get(&key).cloned()));
            }
            InteractiveMsg::Save { resp } => {
                let _ = resp.send(state.save());
            }
            InteractiveMsg::HasChanges { resp } => {
                let _ = resp.send(Ok(!state.pending.is_empty()));
            }
            InteractiveMsg::Reset { resp } => {
                let _ = resp.send(state.reset().await);
            }
            InteractiveMsg::Close { resp } => {
                let _ = resp.send(state.save().map(|_| ()));
                break;
            }
        }
    }

    debug!("Interactive tier stopped");
}

impl InteractiveState {
    fn insert_marker(&mut self, marker: Marker) -> Marker {
        debug!(marker_id = %marker.id, latitude = marker.latitude, longitude = marker.longitude, "Inserted marker");
        self.graph.markers.insert(marker.id, marker.clone());
        self.pending.upsert_marker(marker.clone());
        marker
    }

    fn delete_marker(&mut self, marker_id: Uuid) -> Result<usize, StoreError> {
        let (_, photos) = self
            .graph
            .remove_marker(marker_id)
            .ok_or(StoreError::MarkerNotFound(marker_id))?;
        self.album_epochs.remove(&marker_id);
        for photo_id in &photos {
            self.pending.delete_photo(*photo_id);
        }
        self.pending.delete_marker(marker_id);
        info!(marker_id = %marker_id, photos = photos.len(), "Deleted marker");
        Ok(photos.len())
    }

    fn delete_photos(&mut self, photo_ids: &[Uuid]) -> usize {
        let mut removed = 0;
        for photo_id in photo_ids {
            if self.graph.photos.remove(photo_id).is_some() {
                self.pending.delete_photo(*photo_id);
                removed += 1;
            } else {
                debug!(photo_id = %photo_id, "Photo already gone");
            }
        }
        removed
    }

    /// Discard the marker's current album and open a new cycle
    fn begin_album(&mut self, marker_id: Uuid) -> Result<AlbumTicket, StoreError> {
        if !self.graph.markers.contains_key(&marker_id) {
            return Err(StoreError::MarkerNotFound(marker_id));
        }
        let discarded = self.graph.photo_ids_of(marker_id);
        for photo_id in &discarded {
            self.graph.photos.remove(photo_id);
            self.pending.delete_photo(*photo_id);
        }
        self.next_epoch += 1;
        self.album_epochs.insert(marker_id, self.next_epoch);
        debug!(marker_id = %marker_id, discarded = discarded.len(), epoch = self.next_epoch, "Began album");
        Ok(AlbumTicket {
            marker_id,
            epoch: self.next_epoch,
        })
    }

    fn attach_image(
        &mut self,
        photo_id: Uuid,
        bytes: Vec<u8>,
        request: Option<RequestTicket>,
    ) -> Result<Photo, StoreError> {
        if request.is_some_and(|t| !t.is_current()) {
            return Err(StoreError::Stale);
        }
        let photo = self
            .graph
            .photos
            .get_mut(&photo_id)
            .ok_or(StoreError::PhotoNotFound(photo_id))?;
        photo.image_data = Some(bytes);
        let photo = photo.clone();
        self.pending.upsert_photo(photo.clone());
        Ok(photo)
    }

    fn guard_is_current(&self, guard: &BatchGuard) -> bool {
        if guard.request.as_ref().is_some_and(|t| !t.is_current()) {
            return false;
        }
        match &guard.album {
            Some(album) => self.album_epochs.get(&album.marker_id) == Some(&album.epoch),
            None => true,
        }
    }

    fn merge(&mut self, changes: ChangeSet, guard: BatchGuard) -> Result<(), StoreError> {
        if !self.guard_is_current(&guard) {
            debug!(summary = ?changes.summary(), "Dropping stale batch changes");
            return Err(StoreError::Stale);
        }
        if let Err(reason) = changes.validate(&self.graph) {
            error!(reason = %reason, "Batch changes rejected");
            return Err(StoreError::Integrity(reason));
        }
        self.graph.apply(&changes);
        self.pending.merge(changes);
        Ok(())
    }

    /// Commit pending changes to the buffering tier and request a disk write
    ///
    /// Returns `false` when there was nothing to save.
    fn save(&mut self) -> Result<bool, StoreError> {
        if self.pending.is_empty() {
            return Ok(false);
        }
        if let Err(reason) = self.pending.validate(&self.graph) {
            error!(reason = %reason, "Interactive commit failed; store is now unusable");
            self.poisoned = Some(reason.clone());
            return Err(StoreError::Integrity(reason));
        }

        let changes = std::mem::take(&mut self.pending);
        debug!(summary = ?changes.summary(), "Saving interactive changes");
        self.buffer.absorb(changes)?;
        self.buffer.persist()?;
        Ok(true)
    }

    async fn reset(&mut self) -> Result<(), StoreError> {
        self.save()?;
        match self.buffer.reset().await {
            Ok(()) => {
                self.graph = Graph::default();
                self.album_epochs.clear();
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Reset failed, keeping current contents");
                Err(e)
            }
        }
    }
}
