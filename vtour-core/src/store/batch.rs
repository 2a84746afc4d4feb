//! Background-batch tier
//!
//! Bulk mutations run on a blocking worker against a private snapshot of
//! the interactive graph. Only the recorded change set travels back; it is
//! merged into the interactive tier and reaches disk with the next save.

use super::changes::{ChangeSet, Graph};
use super::StoreError;
use crate::model::{validate_coordinates, Marker, Photo};
use uuid::Uuid;

/// Mutable view handed to a batch closure
pub struct BatchContext {
    graph: Graph,
    changes: ChangeSet,
}

impl BatchContext {
    pub(crate) fn new(graph: Graph) -> Self {
        Self {
            graph,
            changes: ChangeSet::default(),
        }
    }

    pub fn marker(&self, marker_id: Uuid) -> Option<&Marker> {
        self.graph.markers.get(&marker_id)
    }

    pub fn markers(&self) -> Vec<Marker> {
        self.graph.markers_in_order()
    }

    pub fn album(&self, marker_id: Uuid) -> Vec<Photo> {
        self.graph.album(marker_id)
    }

    pub fn insert_marker(&mut self, marker: Marker) -> Result<Uuid, StoreError> {
        validate_coordinates(marker.latitude, marker.longitude)
            .map_err(|e| StoreError::Integrity(e.to_string()))?;
        let id = marker.id;
        self.graph.markers.insert(id, marker.clone());
        self.changes.upsert_marker(marker);
        Ok(id)
    }

    /// Adopt a photo into a marker's album
    pub fn insert_photo(&mut self, marker_id: Uuid, mut photo: Photo) -> Result<Uuid, StoreError> {
        if !self.graph.markers.contains_key(&marker_id) {
            return Err(StoreError::MarkerNotFound(marker_id));
        }
        photo.marker_id = Some(marker_id);
        let id = photo.id;
        self.graph.photos.insert(id, photo.clone());
        self.changes.upsert_photo(photo);
        Ok(id)
    }

    pub fn delete_photo(&mut self, photo_id: Uuid) -> bool {
        if self.graph.photos.remove(&photo_id).is_none() {
            return false;
        }
        self.changes.delete_photo(photo_id);
        true
    }

    pub fn delete_marker(&mut self, marker_id: Uuid) -> bool {
        if self.graph.remove_marker(marker_id).is_none() {
            return false;
        }
        self.changes.delete_marker(marker_id);
        true
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub(crate) fn into_changes(self) -> ChangeSet {
        self.changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_photo_sets_owner_and_records_change() {
        let marker = Marker::new(5.0, 6.0).unwrap();
        let mut graph = Graph::default();
        graph.markers.insert(marker.id, marker.clone());

        let mut ctx = BatchContext::new(graph);
        let id = ctx
            .insert_photo(marker.id, Photo::from_catalog(None, Some("p".into()), None, None))
            .unwrap();

        assert_eq!(ctx.album(marker.id).len(), 1);
        let changes = ctx.into_changes();
        assert_eq!(changes.upserted_photos[&id].marker_id, Some(marker.id));
    }

    #[test]
    fn test_insert_photo_requires_known_marker() {
        let mut ctx = BatchContext::new(Graph::default());
        let missing = Uuid::new_v4();
        let err = ctx
            .insert_photo(missing, Photo::from_catalog(None, None, None, None))
            .unwrap_err();
        assert!(matches!(err, StoreError::MarkerNotFound(id) if id == missing));
        assert!(!ctx.has_changes());
    }

    #[test]
    fn test_delete_marker_in_batch_drops_its_photos() {
        let marker = Marker::new(5.0, 6.0).unwrap();
        let mut graph = Graph::default();
        graph.markers.insert(marker.id, marker.clone());

        let mut ctx = BatchContext::new(graph);
        ctx.insert_photo(marker.id, Photo::from_catalog(None, Some("p".into()), None, None))
            .unwrap();
        assert!(ctx.delete_marker(marker.id));
        assert!(!ctx.delete_marker(marker.id));

        let changes = ctx.into_changes();
        assert!(changes.upserted_photos.is_empty());
        assert!(changes.deleted_markers.contains(&marker.id));
    }
}
