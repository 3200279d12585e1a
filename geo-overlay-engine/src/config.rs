//! Overlay configuration supplied by the embedding page.
//!
//! Every field has a default, so a host can pass `{}` or only the keys it
//! wants to override.

use std::time::Duration;

use bevy::prelude::*;
use constants::{animation, defaults, render_settings};
use serde::{Deserialize, Serialize};

use crate::engine::geo::transform::LngLat;

#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Geographic reference point of the overlay scene.
    pub origin: LngLat,
    /// Flat altitude of the scene ground plane in meters.
    pub base_altitude: f64,
    pub animation: AnimationConfig,
    pub defaults: FeatureDefaults,
    pub persistence: PersistenceKeys,
    /// Emissive colour of the selected feature (linear RGB).
    pub highlight_color: [f32; 3],
    /// Request a host repaint every frame instead of only while something moves.
    pub continuous_repaint: bool,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            origin: LngLat::new(defaults::ORIGIN_LNG, defaults::ORIGIN_LAT),
            base_altitude: 0.0,
            animation: AnimationConfig::default(),
            defaults: FeatureDefaults::default(),
            persistence: PersistenceKeys::default(),
            highlight_color: render_settings::SELECTION_HIGHLIGHT,
            continuous_repaint: true,
        }
    }
}

impl OverlayConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Transition durations in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    pub rise_ms: u64,
    pub height_ms: u64,
    pub rotation_ms: u64,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            rise_ms: animation::RISE_DURATION_MS,
            height_ms: animation::HEIGHT_DURATION_MS,
            rotation_ms: animation::ROTATION_DURATION_MS,
        }
    }
}

impl AnimationConfig {
    pub fn rise(&self) -> Duration {
        Duration::from_millis(self.rise_ms)
    }

    pub fn height(&self) -> Duration {
        Duration::from_millis(self.height_ms)
    }

    pub fn rotation(&self) -> Duration {
        Duration::from_millis(self.rotation_ms)
    }
}

/// Property values used when placement or import leaves them unspecified.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureDefaults {
    pub building_height: f64,
    pub building_base: f64,
    pub building_color: String,
    pub building_width: f64,
    pub building_depth: f64,
    pub tree_size: f64,
    pub tree_height: f64,
    pub tree_color: String,
    pub circle_segments: u32,
}

impl Default for FeatureDefaults {
    fn default() -> Self {
        Self {
            building_height: defaults::BUILDING_HEIGHT,
            building_base: 0.0,
            building_color: defaults::BUILDING_COLOR.to_string(),
            building_width: defaults::BUILDING_WIDTH,
            building_depth: defaults::BUILDING_DEPTH,
            tree_size: defaults::TREE_SIZE,
            tree_height: defaults::TREE_HEIGHT,
            tree_color: defaults::TREE_COLOR.to_string(),
            circle_segments: defaults::CIRCLE_SEGMENTS,
        }
    }
}

/// Storage keys for the per-kind snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceKeys {
    pub buildings: String,
    pub trees: String,
}

impl Default for PersistenceKeys {
    fn default() -> Self {
        Self {
            buildings: defaults::BUILDINGS_STORAGE_KEY.to_string(),
            trees: defaults::TREES_STORAGE_KEY.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = OverlayConfig::from_json("{}").unwrap();
        assert_eq!(config.defaults.building_height, defaults::BUILDING_HEIGHT);
        assert_eq!(config.persistence.buildings, defaults::BUILDINGS_STORAGE_KEY);
        assert!(config.continuous_repaint);
    }

    #[test]
    fn partial_override_keeps_other_fields() {
        let config =
            OverlayConfig::from_json(r#"{ "animation": { "height_ms": 100 }, "origin": { "lng": 2.35, "lat": 48.85 } }"#)
                .unwrap();
        assert_eq!(config.animation.height(), Duration::from_millis(100));
        assert_eq!(config.animation.rise_ms, animation::RISE_DURATION_MS);
        assert_eq!(config.origin, LngLat::new(2.35, 48.85));
    }
}
