use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{FeatureDefaults, OverlayConfig};
use crate::engine::features::model::{FeatureGeometry, FeatureId, FeatureKind, FeatureProperties, GeographicFeature};
use crate::engine::features::store::FeatureStore;
use crate::engine::geo::footprint::{self, Ring, normalize_rotation};
use crate::engine::geo::transform::LngLat;
use crate::engine::operations::{place_feature, query_host, reject, select_feature};
use crate::error::{OverlayError, OverlayResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionMode {
    #[default]
    Idle,
    Placing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementShape {
    #[default]
    Rectangle,
    Circle,
    /// Drawn by the host's drawing tool and placed with `place_custom_ring`.
    Custom,
}

/// User-entered placement values. Unset fields fall back to the configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementDimensions {
    pub width: Option<f64>,
    pub depth: Option<f64>,
    pub radius: Option<f64>,
    pub rotation: Option<f64>,
    pub height: Option<f64>,
    pub segments: Option<u32>,
    pub color: Option<String>,
    pub size: Option<f64>,
    pub content: Option<String>,
}

impl PlacementDimensions {
    /// Overwrite every field set in `other`.
    pub fn merge(&mut self, other: PlacementDimensions) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take!(width, depth, radius, rotation, height, segments, color, size, content);
    }
}

/// What a map click currently means, plus the selected feature.
#[derive(Resource, Debug, Clone, PartialEq, Serialize)]
pub struct InteractionState {
    pub mode: InteractionMode,
    pub kind: FeatureKind,
    pub shape: PlacementShape,
    pub dimensions: PlacementDimensions,
    pub selected: Option<FeatureId>,
}

impl Default for InteractionState {
    fn default() -> Self {
        Self {
            mode: InteractionMode::Idle,
            kind: FeatureKind::Building,
            shape: PlacementShape::Rectangle,
            dimensions: PlacementDimensions::default(),
            selected: None,
        }
    }
}

/// Partial change to the interaction state sent by the host UI.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct InteractionUpdate {
    pub mode: Option<InteractionMode>,
    pub kind: Option<FeatureKind>,
    pub shape: Option<PlacementShape>,
    pub dimensions: Option<PlacementDimensions>,
    /// Drop previously entered dimensions before merging the new ones.
    pub reset_dimensions: bool,
}

impl InteractionState {
    pub fn apply(&mut self, update: InteractionUpdate) {
        if let Some(mode) = update.mode {
            self.mode = mode;
        }
        if let Some(kind) = update.kind {
            self.kind = kind;
        }
        if let Some(shape) = update.shape {
            self.shape = shape;
        }
        if update.reset_dimensions {
            self.dimensions = PlacementDimensions::default();
        }
        if let Some(dimensions) = update.dimensions {
            self.dimensions.merge(dimensions);
        }
        debug!("Interaction is now {:?} {:?} {:?}", self.mode, self.kind, self.shape);
    }

    pub fn is_placing(&self) -> bool {
        self.mode == InteractionMode::Placing
    }
}

/// A click on the host map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapClick {
    pub screen: Vec2,
    pub lng_lat: LngLat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClickOutcome {
    Placed { id: FeatureId },
    Selected { id: FeatureId },
    SelectionCleared,
}

fn properties_for(kind: FeatureKind, dimensions: &PlacementDimensions, defaults: &FeatureDefaults) -> FeatureProperties {
    match kind {
        FeatureKind::Building => FeatureProperties {
            height: dimensions.height.unwrap_or(defaults.building_height),
            base: defaults.building_base,
            color: dimensions.color.clone().unwrap_or_else(|| defaults.building_color.clone()),
            rotation: 0.0,
            size: None,
            content: dimensions.content.clone(),
        },
        FeatureKind::Tree => FeatureProperties {
            height: dimensions.height.unwrap_or(defaults.tree_height),
            base: 0.0,
            color: dimensions.color.clone().unwrap_or_else(|| defaults.tree_color.clone()),
            rotation: 0.0,
            size: Some(dimensions.size.unwrap_or(defaults.tree_size)),
            content: dimensions.content.clone(),
        },
    }
}

/// Build the feature a placing click at `center` describes.
pub fn feature_from_placement(
    state: &InteractionState,
    center: LngLat,
    defaults: &FeatureDefaults,
) -> OverlayResult<GeographicFeature> {
    let dimensions = &state.dimensions;
    let mut properties = properties_for(state.kind, dimensions, defaults);

    let geometry = match (state.kind, state.shape) {
        (FeatureKind::Tree, _) => {
            if !center.is_finite() || !center.is_in_range() {
                return Err(OverlayError::invalid("tree position is not a valid coordinate"));
            }
            FeatureGeometry::Point(center)
        }
        (FeatureKind::Building, PlacementShape::Rectangle) => {
            let rotation = dimensions.rotation.unwrap_or(0.0);
            let ring = footprint::rectangle(
                center,
                dimensions.width.unwrap_or(defaults.building_width),
                dimensions.depth.unwrap_or(defaults.building_depth),
                rotation,
            )?;
            properties.rotation = normalize_rotation(rotation);
            FeatureGeometry::Polygon(ring)
        }
        (FeatureKind::Building, PlacementShape::Circle) => {
            let radius = dimensions
                .radius
                .unwrap_or(dimensions.width.unwrap_or(defaults.building_width) / 2.0);
            let segments = dimensions.segments.unwrap_or(defaults.circle_segments);
            FeatureGeometry::Polygon(footprint::circle(center, radius, segments)?)
        }
        (FeatureKind::Building, PlacementShape::Custom) => {
            return Err(OverlayError::invalid(
                "custom footprints are placed by drawing a ring, not by clicking",
            ));
        }
    };

    Ok(GeographicFeature {
        id: FeatureId::generate(),
        kind: state.kind,
        geometry,
        properties,
    })
}

fn finish_placement(world: &mut World) {
    let mut state = world.resource_mut::<InteractionState>();
    if state.is_placing() {
        state.mode = InteractionMode::Idle;
    }
}

/// Place or select depending on the current mode.
///
/// A successful placement returns the controller to `Idle`; a rejected one
/// leaves it placing so the user can click elsewhere.
pub fn handle_map_click(world: &mut World, click: MapClick) -> OverlayResult<ClickOutcome> {
    let state = world.resource::<InteractionState>().clone();

    if state.is_placing() {
        let defaults = world.resource::<OverlayConfig>().defaults.clone();
        let feature = match feature_from_placement(&state, click.lng_lat, &defaults) {
            Ok(feature) => feature,
            Err(error) => return reject(world, error),
        };
        let id = place_feature(world, feature, Some(click.screen))?;
        finish_placement(world);
        return Ok(ClickOutcome::Placed { id });
    }

    let hit = {
        let store = world.resource::<FeatureStore>();
        query_host(world, click.screen)
            .into_iter()
            .map(FeatureId::from)
            .find(|id| store.contains(id))
    };
    match hit {
        Some(id) => {
            select_feature(world, Some(id.clone()))?;
            Ok(ClickOutcome::Selected { id })
        }
        None => {
            select_feature(world, None)?;
            Ok(ClickOutcome::SelectionCleared)
        }
    }
}

/// Place a building on a ring drawn by the host's drawing tool.
pub fn place_custom_ring(world: &mut World, ring: &[LngLat]) -> OverlayResult<FeatureId> {
    let closed: Ring = match footprint::custom(ring) {
        Ok(closed) => closed,
        Err(error) => return reject(world, error),
    };
    let defaults = world.resource::<OverlayConfig>().defaults.clone();
    let dimensions = world.resource::<InteractionState>().dimensions.clone();

    let feature = GeographicFeature {
        id: FeatureId::generate(),
        kind: FeatureKind::Building,
        geometry: FeatureGeometry::Polygon(closed),
        properties: properties_for(FeatureKind::Building, &dimensions, &defaults),
    };
    let id = place_feature(world, feature, None)?;
    finish_placement(world);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placing(kind: FeatureKind, shape: PlacementShape) -> InteractionState {
        InteractionState {
            mode: InteractionMode::Placing,
            kind,
            shape,
            ..Default::default()
        }
    }

    #[test]
    fn rectangle_click_uses_defaults() {
        let defaults = FeatureDefaults::default();
        let center = LngLat::new(-0.1276, 51.5072);
        let feature = feature_from_placement(&placing(FeatureKind::Building, PlacementShape::Rectangle), center, &defaults)
            .unwrap();

        let FeatureGeometry::Polygon(ring) = &feature.geometry else {
            panic!("expected a polygon");
        };
        assert_eq!(ring.len(), 5);
        assert_eq!(feature.properties.height, defaults.building_height);
        assert_eq!(feature.properties.color, defaults.building_color);
        assert!(feature.validate().is_ok());
    }

    #[test]
    fn rectangle_rotation_is_stored_normalized() {
        let mut state = placing(FeatureKind::Building, PlacementShape::Rectangle);
        state.dimensions.rotation = Some(-90.0);
        let feature = feature_from_placement(&state, LngLat::new(2.35, 48.85), &FeatureDefaults::default()).unwrap();
        assert_eq!(feature.properties.rotation, 270.0);
    }

    #[test]
    fn circle_click_respects_segments() {
        let mut state = placing(FeatureKind::Building, PlacementShape::Circle);
        state.dimensions.radius = Some(5.0);
        state.dimensions.segments = Some(12);
        let feature = feature_from_placement(&state, LngLat::new(2.35, 48.85), &FeatureDefaults::default()).unwrap();
        let FeatureGeometry::Polygon(ring) = &feature.geometry else {
            panic!("expected a polygon");
        };
        assert_eq!(ring.len(), 13);
    }

    #[test]
    fn tree_click_is_a_sized_point() {
        let mut state = placing(FeatureKind::Tree, PlacementShape::Rectangle);
        state.dimensions.size = Some(6.0);
        let center = LngLat::new(2.35, 48.85);
        let feature = feature_from_placement(&state, center, &FeatureDefaults::default()).unwrap();
        assert_eq!(feature.geometry, FeatureGeometry::Point(center));
        assert_eq!(feature.properties.size, Some(6.0));
    }

    #[test]
    fn custom_shape_needs_a_drawn_ring() {
        let result = feature_from_placement(
            &placing(FeatureKind::Building, PlacementShape::Custom),
            LngLat::new(2.35, 48.85),
            &FeatureDefaults::default(),
        );
        assert!(matches!(result, Err(OverlayError::InvalidGeometry(_))));
    }

    #[test]
    fn non_positive_width_is_rejected() {
        let mut state = placing(FeatureKind::Building, PlacementShape::Rectangle);
        state.dimensions.width = Some(0.0);
        let result = feature_from_placement(&state, LngLat::new(2.35, 48.85), &FeatureDefaults::default());
        assert!(matches!(result, Err(OverlayError::InvalidGeometry(_))));
    }

    #[test]
    fn update_merges_dimensions() {
        let mut state = InteractionState::default();
        state.apply(InteractionUpdate {
            mode: Some(InteractionMode::Placing),
            dimensions: Some(PlacementDimensions {
                width: Some(20.0),
                height: Some(9.0),
                ..Default::default()
            }),
            ..Default::default()
        });
        state.apply(InteractionUpdate {
            dimensions: Some(PlacementDimensions {
                height: Some(15.0),
                ..Default::default()
            }),
            ..Default::default()
        });

        assert!(state.is_placing());
        assert_eq!(state.dimensions.width, Some(20.0));
        assert_eq!(state.dimensions.height, Some(15.0));

        state.apply(InteractionUpdate {
            reset_dimensions: true,
            ..Default::default()
        });
        assert_eq!(state.dimensions, PlacementDimensions::default());
    }

    #[test]
    fn update_deserializes_from_partial_json() {
        let update: InteractionUpdate =
            serde_json::from_str(r#"{ "mode": "placing", "kind": "tree", "dimensions": { "size": 3.5 } }"#).unwrap();
        assert_eq!(update.mode, Some(InteractionMode::Placing));
        assert_eq!(update.kind, Some(FeatureKind::Tree));
        assert_eq!(update.dimensions.and_then(|d| d.size), Some(3.5));
    }
}
