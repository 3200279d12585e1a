//! Snapshot persistence of the feature store.
//!
//! Each kind is stored as one GeoJSON document under its configured key.
//! Writes happen right after a committed mutation and before the scene
//! reacts to it. A failed write never rolls the mutation back: the engine
//! keeps working in memory, raises a warning and marks itself degraded
//! until a later write succeeds.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use bevy::prelude::*;
use serde_json::Value;
use thiserror::Error;

use crate::config::OverlayConfig;
use crate::engine::features::collection::{export_collection, import_collection};
use crate::engine::features::model::FeatureKind;
use crate::engine::features::store::FeatureStore;
use crate::engine::notifications::Notifications;
use crate::error::OverlayError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistenceError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("failed to read {key}: {reason}")]
    Read { key: String, reason: String },
    #[error("failed to write {key}: {reason}")]
    Write { key: String, reason: String },
}

impl From<PersistenceError> for OverlayError {
    fn from(error: PersistenceError) -> Self {
        OverlayError::PersistenceFailure(error.to_string())
    }
}

/// Synchronous local key/value storage for JSON snapshots.
pub trait PersistenceAdapter {
    fn get(&self, key: &str) -> Result<Option<Value>, PersistenceError>;
    fn set(&mut self, key: &str, value: &Value) -> Result<(), PersistenceError>;
}

/// In-memory storage. Clones share the same entries, so a caller can keep
/// a handle to inspect what the engine wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    entries: Rc<RefCell<HashMap<String, Value>>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peek(&self, key: &str) -> Option<Value> {
        self.entries.borrow().get(key).cloned()
    }
}

impl PersistenceAdapter for MemoryPersistence {
    fn get(&self, key: &str) -> Result<Option<Value>, PersistenceError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &Value) -> Result<(), PersistenceError> {
        self.entries.borrow_mut().insert(key.to_string(), value.clone());
        Ok(())
    }
}

/// `window.localStorage` adapter.
#[cfg(target_arch = "wasm32")]
pub struct LocalStoragePersistence {
    storage: web_sys::Storage,
}

#[cfg(target_arch = "wasm32")]
impl LocalStoragePersistence {
    pub fn from_window() -> Result<Self, PersistenceError> {
        let window = web_sys::window().ok_or_else(|| PersistenceError::Unavailable("no window".into()))?;
        let storage = window
            .local_storage()
            .map_err(|e| PersistenceError::Unavailable(format!("{e:?}")))?
            .ok_or_else(|| PersistenceError::Unavailable("localStorage disabled".into()))?;
        Ok(Self { storage })
    }
}

#[cfg(target_arch = "wasm32")]
impl PersistenceAdapter for LocalStoragePersistence {
    fn get(&self, key: &str) -> Result<Option<Value>, PersistenceError> {
        let raw = self.storage.get_item(key).map_err(|e| PersistenceError::Read {
            key: key.to_string(),
            reason: format!("{e:?}"),
        })?;
        raw.map(|text| {
            serde_json::from_str(&text).map_err(|e| PersistenceError::Read {
                key: key.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
    }

    fn set(&mut self, key: &str, value: &Value) -> Result<(), PersistenceError> {
        self.storage
            .set_item(key, &value.to_string())
            .map_err(|e| PersistenceError::Write {
                key: key.to_string(),
                reason: format!("{e:?}"),
            })
    }
}

/// Non-send holder for the adapter; browser storage handles are not `Send`.
pub struct PersistenceHandle(pub Box<dyn PersistenceAdapter>);

#[derive(Resource, Debug, Clone, Default)]
pub struct PersistenceStatus {
    /// Set after a failed write, cleared by the next successful one.
    pub degraded: bool,
    pub last_error: Option<String>,
}

fn storage_key(config: &OverlayConfig, kind: FeatureKind) -> String {
    match kind {
        FeatureKind::Building => config.persistence.buildings.clone(),
        FeatureKind::Tree => config.persistence.trees.clone(),
    }
}

fn record_failure(world: &mut World, error: OverlayError) {
    warn!("{}", error);
    let mut status = world.resource_mut::<PersistenceStatus>();
    status.degraded = true;
    status.last_error = Some(error.to_string());
    world.resource_mut::<Notifications>().report(&error);
}

/// Write the current snapshot of `kind`. Returns whether the write succeeded;
/// failures are reported, never propagated.
pub fn persist_kind(world: &mut World, kind: FeatureKind) -> bool {
    let key = storage_key(world.resource::<OverlayConfig>(), kind);
    let document = export_collection(&world.resource::<FeatureStore>().snapshot(kind));
    let value = match serde_json::to_value(&document) {
        Ok(value) => value,
        Err(e) => {
            record_failure(world, OverlayError::PersistenceFailure(e.to_string()));
            return false;
        }
    };

    let result = match world.get_non_send_resource_mut::<PersistenceHandle>() {
        Some(mut handle) => handle.0.set(&key, &value),
        None => Err(PersistenceError::Unavailable("no persistence adapter".into())),
    };

    match result {
        Ok(()) => {
            let mut status = world.resource_mut::<PersistenceStatus>();
            if status.degraded {
                info!("Persistence recovered");
            }
            status.degraded = false;
            status.last_error = None;
            true
        }
        Err(error) => {
            record_failure(world, error.into());
            false
        }
    }
}

/// Load persisted snapshots into the store. A missing snapshot is an empty
/// collection; an unreadable one is reported and skipped.
pub fn restore_snapshots(world: &mut World) -> usize {
    let mut restored = 0;

    for kind in FeatureKind::ALL {
        let key = storage_key(world.resource::<OverlayConfig>(), kind);
        let loaded = match world.get_non_send_resource::<PersistenceHandle>() {
            Some(handle) => handle.0.get(&key),
            None => Ok(None),
        };

        let value = match loaded {
            Ok(Some(value)) => value,
            Ok(None) => continue,
            Err(error) => {
                record_failure(world, error.into());
                continue;
            }
        };

        let defaults = world.resource::<OverlayConfig>().defaults.clone();
        let result = import_collection(&value.to_string(), kind, &defaults)
            .and_then(|collection| {
                let count = collection.len();
                world
                    .resource_mut::<FeatureStore>()
                    .replace_all(kind, collection)
                    .map(|()| count)
            });

        match result {
            Ok(count) => {
                info!("Restored {} {} feature(s) from {}", count, kind.as_str(), key);
                restored += count;
            }
            Err(error) => record_failure(
                world,
                OverlayError::PersistenceFailure(format!("snapshot {key} is unusable: {error}")),
            ),
        }
    }
    restored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_clones_share_entries() {
        let storage = MemoryPersistence::new();
        let mut writer = storage.clone();
        writer.set("k", &serde_json::json!({"a": 1})).unwrap();
        assert_eq!(storage.peek("k"), Some(serde_json::json!({"a": 1})));
        assert_eq!(storage.get("missing").unwrap(), None);
    }

    #[test]
    fn persistence_error_becomes_overlay_failure() {
        let error: OverlayError = PersistenceError::Write {
            key: "overlay.trees".into(),
            reason: "quota exceeded".into(),
        }
        .into();
        assert!(matches!(error, OverlayError::PersistenceFailure(message) if message.contains("quota")));
    }
}
