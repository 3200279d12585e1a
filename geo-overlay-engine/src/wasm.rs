//! wasm-bindgen binding used by the page's custom map layer.
//!
//! The page forwards the map layer's `onAdd` and `render` callbacks and
//! draws the returned snapshot with its own GL context.

use bevy::math::DMat4;
use bevy::prelude::*;
use js_sys::{Array, Function};
use wasm_bindgen::prelude::*;

use crate::config::OverlayConfig;
use crate::engine::features::model::{FeatureId, FeatureKind, PropertyPatch};
use crate::engine::geo::transform::LngLat;
use crate::engine::host::{HostMap, OverlayEngine};
use crate::engine::persistence::{LocalStoragePersistence, MemoryPersistence};
use crate::tools::interaction::InteractionUpdate;

/// Host map callbacks supplied by the page.
struct JsHost {
    trigger_repaint: Function,
    query_rendered_features: Function,
}

impl HostMap for JsHost {
    fn trigger_repaint(&self) {
        if let Err(e) = self.trigger_repaint.call0(&JsValue::NULL) {
            error!("triggerRepaint failed: {:?}", e);
        }
    }

    fn query_rendered_features(&self, screen: Vec2) -> Vec<String> {
        match self.query_rendered_features.call2(
            &JsValue::NULL,
            &JsValue::from_f64(screen.x as f64),
            &JsValue::from_f64(screen.y as f64),
        ) {
            Ok(hits) if Array::is_array(&hits) => Array::from(&hits).iter().filter_map(|v| v.as_string()).collect(),
            Ok(_) => Vec::new(),
            Err(e) => {
                error!("queryRenderedFeatures failed: {:?}", e);
                Vec::new()
            }
        }
    }
}

fn js_error(error: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, JsValue> {
    serde_json::to_string(value).map_err(js_error)
}

fn parse_kind(kind: &str) -> Result<FeatureKind, JsValue> {
    FeatureKind::from_string(kind).ok_or_else(|| js_error(format!("unknown feature kind: {kind}")))
}

#[wasm_bindgen]
pub struct OverlayLayer {
    engine: OverlayEngine,
}

#[wasm_bindgen]
impl OverlayLayer {
    #[wasm_bindgen(constructor)]
    pub fn new(
        config_json: &str,
        trigger_repaint: Function,
        query_rendered_features: Function,
    ) -> Result<OverlayLayer, JsValue> {
        let config = if config_json.trim().is_empty() {
            OverlayConfig::default()
        } else {
            OverlayConfig::from_json(config_json).map_err(js_error)?
        };
        let host = JsHost {
            trigger_repaint,
            query_rendered_features,
        };

        let engine = match LocalStoragePersistence::from_window() {
            Ok(storage) => OverlayEngine::new(config, host, storage),
            Err(e) => {
                warn!("{}; features will not survive a reload", e);
                OverlayEngine::new(config, host, MemoryPersistence::new())
            }
        };
        Ok(OverlayLayer { engine })
    }

    #[wasm_bindgen(js_name = onAdd)]
    pub fn on_add(&mut self) -> usize {
        self.engine.on_add()
    }

    /// Render with the map's column-major projection matrix; returns the
    /// frame snapshot as JSON.
    pub fn render(&mut self, matrix: &[f64]) -> Result<String, JsValue> {
        if matrix.len() != 16 {
            return Err(js_error(format!("expected 16 matrix values, got {}", matrix.len())));
        }
        let snapshot = self.engine.next_frame(DMat4::from_cols_slice(matrix));
        to_json(snapshot)
    }

    /// Vertex buffers of a feature's mesh, or `undefined` if none is built.
    pub fn geometry(&self, id: &str) -> Result<Option<String>, JsValue> {
        self.engine
            .geometry(&FeatureId::new(id))
            .map(|buffers| to_json(&buffers))
            .transpose()
    }

    #[wasm_bindgen(js_name = postMessage)]
    pub fn post_message(&mut self, message: String) {
        self.engine.post_message(message);
    }

    #[wasm_bindgen(js_name = setInteraction)]
    pub fn set_interaction(&mut self, update_json: &str) -> Result<(), JsValue> {
        let update: InteractionUpdate = serde_json::from_str(update_json).map_err(js_error)?;
        self.engine.set_interaction(update);
        Ok(())
    }

    #[wasm_bindgen(js_name = mapClick)]
    pub fn map_click(&mut self, x: f32, y: f32, lng: f64, lat: f64) -> Result<String, JsValue> {
        let outcome = self
            .engine
            .handle_map_click(Vec2::new(x, y), LngLat::new(lng, lat))
            .map_err(js_error)?;
        to_json(&outcome)
    }

    #[wasm_bindgen(js_name = placeCustomRing)]
    pub fn place_custom_ring(&mut self, ring_json: &str) -> Result<String, JsValue> {
        let ring: Vec<LngLat> = serde_json::from_str(ring_json).map_err(js_error)?;
        let id = self.engine.place_custom_ring(&ring).map_err(js_error)?;
        Ok(id.to_string())
    }

    #[wasm_bindgen(js_name = selectFeature)]
    pub fn select_feature(&mut self, id: Option<String>) -> Result<(), JsValue> {
        self.engine.select_feature(id.map(FeatureId::from)).map_err(js_error)
    }

    #[wasm_bindgen(js_name = rotateFeature)]
    pub fn rotate_feature(&mut self, id: &str, delta: f64) -> Result<f64, JsValue> {
        self.engine.rotate_feature(&FeatureId::new(id), delta).map_err(js_error)
    }

    #[wasm_bindgen(js_name = updateFeature)]
    pub fn update_feature(&mut self, id: &str, patch_json: &str) -> Result<String, JsValue> {
        let patch: PropertyPatch = serde_json::from_str(patch_json).map_err(js_error)?;
        let feature = self
            .engine
            .update_feature_properties(&FeatureId::new(id), patch)
            .map_err(js_error)?;
        to_json(&feature)
    }

    #[wasm_bindgen(js_name = deleteFeature)]
    pub fn delete_feature(&mut self, id: &str) -> Result<(), JsValue> {
        self.engine.delete_feature(&FeatureId::new(id)).map(|_| ()).map_err(js_error)
    }

    #[wasm_bindgen(js_name = importFeatures)]
    pub fn import_features(&mut self, kind: &str, document: &str) -> Result<usize, JsValue> {
        let kind = parse_kind(kind)?;
        self.engine.import_features(kind, document).map_err(js_error)
    }

    #[wasm_bindgen(js_name = exportFeatures)]
    pub fn export_features(&self, kind: &str) -> Result<String, JsValue> {
        Ok(self.engine.export_features(parse_kind(kind)?))
    }

    #[wasm_bindgen(js_name = clearFeatures)]
    pub fn clear_features(&mut self, kind: Option<String>) -> Result<usize, JsValue> {
        let kind = kind.as_deref().map(parse_kind).transpose()?;
        Ok(self.engine.clear_features(kind))
    }

    #[wasm_bindgen(js_name = dismissNotification)]
    pub fn dismiss_notification(&mut self, id: u32) -> bool {
        self.engine.dismiss_notification(id as u64)
    }

    pub fn notifications(&self) -> Result<String, JsValue> {
        to_json(&self.engine.notifications())
    }

    pub fn stats(&self) -> Result<String, JsValue> {
        to_json(&self.engine.stats())
    }
}
