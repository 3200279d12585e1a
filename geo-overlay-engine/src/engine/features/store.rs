//! Authoritative feature collections and their change stream.
//!
//! The store is only mutated through its own API. Every committed mutation
//! appends a `FeatureChanged` record to an outbox, which
//! `publish_feature_changes` turns into Bevy events for the mesh lifecycle,
//! the RPC bridge and any other subscriber.

use std::collections::BTreeMap;

use bevy::prelude::*;

use super::model::{FeatureId, FeatureKind, FeatureUpdate, GeographicFeature};
use crate::error::{OverlayError, OverlayResult};

/// Id-ordered features of a single kind.
pub type FeatureCollection = BTreeMap<FeatureId, GeographicFeature>;

#[derive(Debug, Clone, PartialEq)]
pub enum FeatureChange {
    Created,
    Updated { previous: Box<GeographicFeature> },
    Removed { previous: Box<GeographicFeature> },
}

/// Emitted once per committed store mutation, per feature.
#[derive(Event, Debug, Clone, PartialEq)]
pub struct FeatureChanged {
    pub id: FeatureId,
    pub kind: FeatureKind,
    pub change: FeatureChange,
}

#[derive(Resource, Default, Debug)]
pub struct FeatureStore {
    buildings: FeatureCollection,
    trees: FeatureCollection,
    outbox: Vec<FeatureChanged>,
}

impl FeatureStore {
    fn collection(&self, kind: FeatureKind) -> &FeatureCollection {
        match kind {
            FeatureKind::Building => &self.buildings,
            FeatureKind::Tree => &self.trees,
        }
    }

    fn collection_mut(&mut self, kind: FeatureKind) -> &mut FeatureCollection {
        match kind {
            FeatureKind::Building => &mut self.buildings,
            FeatureKind::Tree => &mut self.trees,
        }
    }

    fn record(&mut self, id: FeatureId, kind: FeatureKind, change: FeatureChange) {
        self.outbox.push(FeatureChanged { id, kind, change });
    }

    /// Kind of the collection holding `id`, if any.
    pub fn kind_of(&self, id: &FeatureId) -> Option<FeatureKind> {
        FeatureKind::ALL
            .into_iter()
            .find(|kind| self.collection(*kind).contains_key(id))
    }

    pub fn contains(&self, id: &FeatureId) -> bool {
        self.kind_of(id).is_some()
    }

    pub fn get(&self, id: &FeatureId) -> Option<&GeographicFeature> {
        self.buildings.get(id).or_else(|| self.trees.get(id))
    }

    pub fn list(&self, kind: FeatureKind) -> impl Iterator<Item = &GeographicFeature> {
        self.collection(kind).values()
    }

    pub fn snapshot(&self, kind: FeatureKind) -> FeatureCollection {
        self.collection(kind).clone()
    }

    pub fn len(&self) -> usize {
        self.buildings.len() + self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count(&self, kind: FeatureKind) -> usize {
        self.collection(kind).len()
    }

    /// Insert a new feature after validating it.
    pub fn add(&mut self, feature: GeographicFeature) -> OverlayResult<()> {
        feature.validate()?;
        if self.contains(&feature.id) {
            return Err(OverlayError::DuplicateId(feature.id));
        }

        let (id, kind) = (feature.id.clone(), feature.kind);
        self.collection_mut(kind).insert(id.clone(), feature);
        self.record(id, kind, FeatureChange::Created);
        Ok(())
    }

    /// Apply a partial update. The merged feature is validated before it
    /// replaces the stored one; the previous revision is returned.
    pub fn update(&mut self, id: &FeatureId, update: FeatureUpdate) -> OverlayResult<GeographicFeature> {
        let Some(kind) = self.kind_of(id) else {
            return Err(OverlayError::UnknownFeature(id.clone()));
        };
        let Some(previous) = self.collection(kind).get(id).cloned() else {
            return Err(OverlayError::UnknownFeature(id.clone()));
        };

        let next = GeographicFeature {
            id: previous.id.clone(),
            kind,
            geometry: update.geometry.unwrap_or_else(|| previous.geometry.clone()),
            properties: update.properties.apply(&previous.properties),
        };
        next.validate()?;

        if next == previous {
            return Ok(previous);
        }

        self.collection_mut(kind).insert(id.clone(), next);
        self.record(
            id.clone(),
            kind,
            FeatureChange::Updated {
                previous: Box::new(previous.clone()),
            },
        );
        Ok(previous)
    }

    pub fn remove(&mut self, id: &FeatureId) -> OverlayResult<GeographicFeature> {
        let Some(kind) = self.kind_of(id) else {
            return Err(OverlayError::UnknownFeature(id.clone()));
        };
        let Some(previous) = self.collection_mut(kind).remove(id) else {
            return Err(OverlayError::UnknownFeature(id.clone()));
        };

        self.record(
            id.clone(),
            kind,
            FeatureChange::Removed {
                previous: Box::new(previous.clone()),
            },
        );
        Ok(previous)
    }

    /// Swap the whole collection of `kind` for `collection`.
    ///
    /// Nothing is committed unless every feature is valid, of the right kind,
    /// keyed by its own id and absent from the other kind's collection.
    pub fn replace_all(&mut self, kind: FeatureKind, collection: FeatureCollection) -> OverlayResult<()> {
        for (key, feature) in &collection {
            if key != &feature.id {
                return Err(OverlayError::invalid(format!(
                    "collection key {key} does not match feature id {}",
                    feature.id
                )));
            }
            if feature.kind != kind {
                return Err(OverlayError::invalid(format!(
                    "feature {} is a {}, expected a {}",
                    feature.id,
                    feature.kind.as_str(),
                    kind.as_str()
                )));
            }
            feature.validate()?;
            if FeatureKind::ALL
                .into_iter()
                .filter(|other| *other != kind)
                .any(|other| self.collection(other).contains_key(key))
            {
                return Err(OverlayError::DuplicateId(key.clone()));
            }
        }

        let old = std::mem::replace(self.collection_mut(kind), collection);
        for (id, previous) in old {
            self.record(
                id,
                kind,
                FeatureChange::Removed {
                    previous: Box::new(previous),
                },
            );
        }
        let created: Vec<FeatureId> = self.collection(kind).keys().cloned().collect();
        for id in created {
            self.record(id, kind, FeatureChange::Created);
        }
        Ok(())
    }

    /// Drain change records that have not been published yet.
    pub fn take_changes(&mut self) -> Vec<FeatureChanged> {
        std::mem::take(&mut self.outbox)
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.outbox.is_empty()
    }
}

/// Forward the store outbox into `Events<FeatureChanged>`.
pub fn publish_feature_changes(mut store: ResMut<FeatureStore>, mut events: EventWriter<FeatureChanged>) {
    if !store.has_pending_changes() {
        return;
    }
    let changes = store.take_changes();
    debug!("Publishing {} feature change(s)", changes.len());
    events.write_batch(changes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::features::model::{FeatureGeometry, FeatureProperties, PropertyPatch};
    use crate::engine::geo::footprint::rectangle;
    use crate::engine::geo::transform::LngLat;

    const LONDON: LngLat = LngLat::new(-0.1276, 51.5072);

    fn building(id: &str, height: f64) -> GeographicFeature {
        GeographicFeature {
            id: FeatureId::new(id),
            kind: FeatureKind::Building,
            geometry: FeatureGeometry::Polygon(rectangle(LONDON, 10.0, 10.0, 0.0).unwrap()),
            properties: FeatureProperties {
                height,
                base: 0.0,
                color: "#b9a58b".into(),
                rotation: 0.0,
                size: None,
                content: None,
            },
        }
    }

    fn tree(id: &str) -> GeographicFeature {
        GeographicFeature {
            id: FeatureId::new(id),
            kind: FeatureKind::Tree,
            geometry: FeatureGeometry::Point(LONDON),
            properties: FeatureProperties {
                height: 8.0,
                base: 0.0,
                color: "#3f7d3a".into(),
                rotation: 0.0,
                size: Some(4.0),
                content: None,
            },
        }
    }

    #[test]
    fn duplicate_ids_are_rejected_across_kinds() {
        let mut store = FeatureStore::default();
        store.add(building("a", 10.0)).unwrap();
        let err = store.add(tree("a")).unwrap_err();
        assert_eq!(err, OverlayError::DuplicateId(FeatureId::new("a")));
        assert_eq!(store.len(), 1);
        assert_eq!(store.take_changes().len(), 1);
    }

    #[test]
    fn invalid_add_leaves_store_untouched() {
        let mut store = FeatureStore::default();
        let mut bad = building("a", 10.0);
        if let FeatureGeometry::Polygon(ring) = &mut bad.geometry {
            ring.pop();
        }
        assert!(matches!(store.add(bad), Err(OverlayError::InvalidGeometry(_))));
        assert!(store.is_empty());
        assert!(!store.has_pending_changes());
    }

    #[test]
    fn update_returns_previous_revision() {
        let mut store = FeatureStore::default();
        store.add(building("a", 10.0)).unwrap();
        store.take_changes();

        let previous = store
            .update(&FeatureId::new("a"), PropertyPatch::height(30.0).into())
            .unwrap();
        assert_eq!(previous.properties.height, 10.0);
        assert_eq!(store.get(&FeatureId::new("a")).unwrap().properties.height, 30.0);

        let changes = store.take_changes();
        assert_eq!(changes.len(), 1);
        match &changes[0].change {
            FeatureChange::Updated { previous } => assert_eq!(previous.properties.height, 10.0),
            other => panic!("unexpected change {other:?}"),
        }
    }

    #[test]
    fn invalid_update_is_not_committed() {
        let mut store = FeatureStore::default();
        store.add(building("a", 10.0)).unwrap();
        store.take_changes();

        let result = store.update(&FeatureId::new("a"), PropertyPatch::height(-5.0).into());
        assert!(result.is_err());
        assert_eq!(store.get(&FeatureId::new("a")).unwrap().properties.height, 10.0);
        assert!(!store.has_pending_changes());
    }

    #[test]
    fn noop_update_emits_nothing() {
        let mut store = FeatureStore::default();
        store.add(building("a", 10.0)).unwrap();
        store.take_changes();
        store
            .update(&FeatureId::new("a"), PropertyPatch::height(10.0).into())
            .unwrap();
        assert!(!store.has_pending_changes());
    }

    #[test]
    fn remove_unknown_fails() {
        let mut store = FeatureStore::default();
        assert_eq!(
            store.remove(&FeatureId::new("ghost")).unwrap_err(),
            OverlayError::UnknownFeature(FeatureId::new("ghost"))
        );
    }

    #[test]
    fn replace_all_is_atomic() {
        let mut store = FeatureStore::default();
        store.add(building("a", 10.0)).unwrap();
        store.add(tree("t")).unwrap();
        store.take_changes();

        let mut clash = FeatureCollection::new();
        clash.insert(FeatureId::new("t"), {
            let mut b = building("t", 5.0);
            b.id = FeatureId::new("t");
            b
        });
        assert_eq!(
            store.replace_all(FeatureKind::Building, clash).unwrap_err(),
            OverlayError::DuplicateId(FeatureId::new("t"))
        );
        assert!(store.contains(&FeatureId::new("a")));

        let mut fresh = FeatureCollection::new();
        fresh.insert(FeatureId::new("b"), building("b", 7.0));
        store.replace_all(FeatureKind::Building, fresh).unwrap();
        assert!(!store.contains(&FeatureId::new("a")));
        assert_eq!(store.count(FeatureKind::Building), 1);
        assert_eq!(store.count(FeatureKind::Tree), 1);

        let changes = store.take_changes();
        assert!(matches!(changes[0].change, FeatureChange::Removed { .. }));
        assert_eq!(changes[1].id, FeatureId::new("b"));
        assert_eq!(changes[1].change, FeatureChange::Created);
    }

    #[test]
    fn changes_are_published_as_events() {
        let mut app = App::new();
        app.init_resource::<FeatureStore>()
            .add_event::<FeatureChanged>()
            .add_systems(Update, publish_feature_changes);

        app.world_mut()
            .resource_mut::<FeatureStore>()
            .add(building("a", 10.0))
            .unwrap();
        app.update();

        let events = app.world().resource::<Events<FeatureChanged>>();
        let mut cursor = events.get_cursor();
        let published: Vec<_> = cursor.read(events).collect();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].id, FeatureId::new("a"));
        assert!(!app.world().resource::<FeatureStore>().has_pending_changes());
    }
}
