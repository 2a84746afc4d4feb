//! Change sets and the in-memory object graph
//!
//! A [`ChangeSet`] is the unit that travels down the pipeline. Within one
//! set an identity is either upserted or deleted, never both: the later
//! operation always wins when sets are recorded or merged.
//!
//! Application order (shared by [`Graph::apply`] and the disk writer):
//! photo deletions, cascade of deleted markers, marker deletions, marker
//! upserts, photo upserts, settings.

use crate::model::{sort_album, validate_coordinates, Marker, Photo};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub upserted_markers: BTreeMap<Uuid, Marker>,
    pub upserted_photos: BTreeMap<Uuid, Photo>,
    pub deleted_markers: BTreeSet<Uuid>,
    pub deleted_photos: BTreeSet<Uuid>,
    pub settings: BTreeMap<String, String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.upserted_markers.is_empty()
            && self.upserted_photos.is_empty()
            && self.deleted_markers.is_empty()
            && self.deleted_photos.is_empty()
            && self.settings.is_empty()
    }

    pub fn upsert_marker(&mut self, marker: Marker) {
        self.deleted_markers.remove(&marker.id);
        self.upserted_markers.insert(marker.id, marker);
    }

    pub fn upsert_photo(&mut self, photo: Photo) {
        self.deleted_photos.remove(&photo.id);
        self.upserted_photos.insert(photo.id, photo);
    }

    /// Record a marker deletion; pending upserts of its photos are dropped
    pub fn delete_marker(&mut self, id: Uuid) {
        self.upserted_markers.remove(&id);
        self.upserted_photos.retain(|_, p| p.marker_id != Some(id));
        self.deleted_markers.insert(id);
    }

    pub fn delete_photo(&mut self, id: Uuid) {
        self.upserted_photos.remove(&id);
        self.deleted_photos.insert(id);
    }

    pub fn set_setting(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.settings.insert(key.into(), value.into());
    }

    /// Fold a later change set into this one
    pub fn merge(&mut self, later: ChangeSet) {
        for id in later.deleted_photos {
            self.delete_photo(id);
        }
        for id in later.deleted_markers {
            self.delete_marker(id);
        }
        for (_, marker) in later.upserted_markers {
            self.upsert_marker(marker);
        }
        for (_, photo) in later.upserted_photos {
            self.upsert_photo(photo);
        }
        self.settings.extend(later.settings);
    }

    /// Check the set against the graph it will be applied to
    ///
    /// Every upserted photo must name an owner that exists after the set is
    /// applied; every upserted marker must have valid coordinates.
    pub fn validate(&self, graph: &Graph) -> Result<(), String> {
        for marker in self.upserted_markers.values() {
            validate_coordinates(marker.latitude, marker.longitude)
                .map_err(|e| format!("marker {}: {}", marker.id, e))?;
        }
        for photo in self.upserted_photos.values() {
            let owner = photo
                .marker_id
                .ok_or_else(|| format!("photo {} has no owning marker", photo.id))?;
            let owner_exists = !self.deleted_markers.contains(&owner)
                && (self.upserted_markers.contains_key(&owner) || graph.markers.contains_key(&owner));
            if !owner_exists {
                return Err(format!("photo {} references missing marker {}", photo.id, owner));
            }
        }
        Ok(())
    }

    /// (markers, photos, deletions, settings) counts for logging
    pub fn summary(&self) -> (usize, usize, usize, usize) {
        (
            self.upserted_markers.len(),
            self.upserted_photos.len(),
            self.deleted_markers.len() + self.deleted_photos.len(),
            self.settings.len(),
        )
    }
}

/// Object graph owned by one tier
#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub markers: HashMap<Uuid, Marker>,
    pub photos: HashMap<Uuid, Photo>,
    pub settings: HashMap<String, String>,
}

impl Graph {
    pub fn apply(&mut self, changes: &ChangeSet) {
        for id in &changes.deleted_photos {
            self.photos.remove(id);
        }
        for id in &changes.deleted_markers {
            self.remove_marker(*id);
        }
        for marker in changes.upserted_markers.values() {
            self.markers.insert(marker.id, marker.clone());
        }
        for photo in changes.upserted_photos.values() {
            self.photos.insert(photo.id, photo.clone());
        }
        for (key, value) in &changes.settings {
            self.settings.insert(key.clone(), value.clone());
        }
    }

    /// Remove a marker and every photo it owns, returning the photo ids
    pub fn remove_marker(&mut self, id: Uuid) -> Option<(Marker, Vec<Uuid>)> {
        let marker = self.markers.remove(&id)?;
        let owned = self.photo_ids_of(id);
        for photo_id in &owned {
            self.photos.remove(photo_id);
        }
        Some((marker, owned))
    }

    pub fn photo_ids_of(&self, marker_id: Uuid) -> Vec<Uuid> {
        self.photos
            .values()
            .filter(|p| p.marker_id == Some(marker_id))
            .map(|p| p.id)
            .collect()
    }

    /// A marker's photos in album order
    pub fn album(&self, marker_id: Uuid) -> Vec<Photo> {
        let mut photos: Vec<Photo> = self
            .photos
            .values()
            .filter(|p| p.marker_id == Some(marker_id))
            .cloned()
            .collect();
        // Identity tiebreak first so the stable path sort is deterministic
        photos.sort_by_key(|p| p.id);
        sort_album(&mut photos);
        photos
    }

    /// Markers in creation order
    pub fn markers_in_order(&self) -> Vec<Marker> {
        let mut markers: Vec<Marker> = self.markers.values().cloned().collect();
        markers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        markers
    }
}
