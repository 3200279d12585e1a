#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use bevy::math::Vec2;
use geo_overlay_engine::engine::geo::footprint::rectangle;
use geo_overlay_engine::{
    FeatureGeometry, FeatureId, FeatureKind, FeatureProperties, GeographicFeature, HostMap, LngLat, MemoryPersistence,
    OverlayConfig, OverlayEngine, PersistenceAdapter, PersistenceError,
};
use serde_json::Value;

pub const LONDON: LngLat = LngLat::new(-0.1276, 51.5072);

/// Host map double: counts repaint requests and reports configurable hits.
#[derive(Clone, Default)]
pub struct FakeHost {
    pub repaints: Rc<Cell<usize>>,
    pub hits: Rc<RefCell<Vec<String>>>,
}

impl FakeHost {
    pub fn set_hits(&self, hits: &[&str]) {
        *self.hits.borrow_mut() = hits.iter().map(|h| h.to_string()).collect();
    }
}

impl HostMap for FakeHost {
    fn trigger_repaint(&self) {
        self.repaints.set(self.repaints.get() + 1);
    }

    fn query_rendered_features(&self, _screen: Vec2) -> Vec<String> {
        self.hits.borrow().clone()
    }
}

/// Storage that accepts reads and refuses every write.
pub struct FailingPersistence;

impl PersistenceAdapter for FailingPersistence {
    fn get(&self, _key: &str) -> Result<Option<Value>, PersistenceError> {
        Ok(None)
    }

    fn set(&mut self, key: &str, _value: &Value) -> Result<(), PersistenceError> {
        Err(PersistenceError::Write {
            key: key.to_string(),
            reason: "quota exceeded".into(),
        })
    }
}

pub struct Harness {
    pub engine: OverlayEngine,
    pub host: FakeHost,
    pub storage: MemoryPersistence,
}

pub fn harness_with(config: OverlayConfig, storage: MemoryPersistence) -> Harness {
    let host = FakeHost::default();
    let mut engine = OverlayEngine::headless(config, host.clone(), storage.clone());
    engine.on_add();
    Harness { engine, host, storage }
}

pub fn harness() -> Harness {
    harness_with(OverlayConfig::default(), MemoryPersistence::new())
}

pub fn building(id: &str, center: LngLat, height: f64) -> GeographicFeature {
    GeographicFeature {
        id: FeatureId::new(id),
        kind: FeatureKind::Building,
        geometry: FeatureGeometry::Polygon(rectangle(center, 12.0, 8.0, 0.0).unwrap()),
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

pub fn tree(id: &str, position: LngLat) -> GeographicFeature {
    GeographicFeature {
        id: FeatureId::new(id),
        kind: FeatureKind::Tree,
        geometry: FeatureGeometry::Point(position),
        properties: FeatureProperties {
            height: 8.0,
            base: 0.0,
            color: "#3f7d3a".into(),
            rotation: 0.0,
            size: Some(4.0),
            content: Some("plane tree".into()),
        },
    }
}
