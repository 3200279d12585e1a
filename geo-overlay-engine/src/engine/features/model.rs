use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::geo::footprint::{self, Ring};
use crate::engine::geo::transform::LngLat;
use crate::error::{OverlayError, OverlayResult};

/// Stable feature identity, unique across buildings and trees.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureId(String);

impl FeatureId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FeatureId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for FeatureId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Building,
    Tree,
}

impl FeatureKind {
    pub const ALL: [FeatureKind; 2] = [FeatureKind::Building, FeatureKind::Tree];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureKind::Building => "building",
            FeatureKind::Tree => "tree",
        }
    }

    pub fn from_string(value: &str) -> Option<Self> {
        match value {
            "building" | "buildings" => Some(FeatureKind::Building),
            "tree" | "trees" => Some(FeatureKind::Tree),
            _ => None,
        }
    }
}

/// Ground footprint of a feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates", rename_all = "lowercase")]
pub enum FeatureGeometry {
    Polygon(Ring),
    Point(LngLat),
}

impl FeatureGeometry {
    /// Anchor point used for placement and picking.
    pub fn anchor(&self) -> LngLat {
        match self {
            FeatureGeometry::Polygon(ring) => crate::engine::geo::transform::ring_centroid(ring),
            FeatureGeometry::Point(point) => *point,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureProperties {
    /// Extrusion height in meters.
    pub height: f64,
    /// Elevation of the extrusion floor above the scene base altitude.
    pub base: f64,
    /// CSS hex colour.
    pub color: String,
    /// Compass bearing of the footprint in degrees, `[0, 360)`.
    pub rotation: f64,
    /// Crown diameter in meters; required for trees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    /// Free-form annotation supplied by the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Partial property update; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyPatch {
    pub height: Option<f64>,
    pub base: Option<f64>,
    pub color: Option<String>,
    pub rotation: Option<f64>,
    pub size: Option<f64>,
    pub content: Option<String>,
}

impl PropertyPatch {
    pub fn is_empty(&self) -> bool {
        *self == PropertyPatch::default()
    }

    pub fn height(height: f64) -> Self {
        Self {
            height: Some(height),
            ..Default::default()
        }
    }

    pub fn apply(&self, properties: &FeatureProperties) -> FeatureProperties {
        FeatureProperties {
            height: self.height.unwrap_or(properties.height),
            base: self.base.unwrap_or(properties.base),
            color: self.color.clone().unwrap_or_else(|| properties.color.clone()),
            rotation: self.rotation.unwrap_or(properties.rotation),
            size: self.size.or(properties.size),
            content: self.content.clone().or_else(|| properties.content.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureUpdate {
    pub properties: PropertyPatch,
    pub geometry: Option<FeatureGeometry>,
}

impl From<PropertyPatch> for FeatureUpdate {
    fn from(properties: PropertyPatch) -> Self {
        Self {
            properties,
            geometry: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeographicFeature {
    pub id: FeatureId,
    pub kind: FeatureKind,
    pub geometry: FeatureGeometry,
    pub properties: FeatureProperties,
}

impl GeographicFeature {
    /// Check every invariant a stored feature must hold.
    pub fn validate(&self) -> OverlayResult<()> {
        if self.id.as_str().is_empty() {
            return Err(OverlayError::invalid("feature id must not be empty"));
        }

        let p = &self.properties;
        if !p.height.is_finite() || p.height < 0.0 {
            return Err(OverlayError::invalid(format!(
                "height must be a non-negative number, got {}",
                p.height
            )));
        }
        if !p.base.is_finite() {
            return Err(OverlayError::invalid("base must be finite"));
        }
        if !(0.0..360.0).contains(&p.rotation) {
            return Err(OverlayError::invalid(format!(
                "rotation must be in [0, 360), got {}",
                p.rotation
            )));
        }
        if let Some(size) = p.size {
            if !size.is_finite() || size <= 0.0 {
                return Err(OverlayError::invalid(format!("size must be positive, got {size}")));
            }
        }

        match (&self.kind, &self.geometry) {
            (FeatureKind::Building, FeatureGeometry::Polygon(ring)) => footprint::validate_ring(ring),
            (FeatureKind::Tree, FeatureGeometry::Point(point)) => {
                if !point.is_finite() || !point.is_in_range() {
                    return Err(OverlayError::invalid("tree position is not a valid coordinate"));
                }
                if p.size.is_none() {
                    return Err(OverlayError::invalid("a tree requires a size"));
                }
                Ok(())
            }
            (FeatureKind::Building, FeatureGeometry::Point(_)) => {
                Err(OverlayError::invalid("a building requires a polygon footprint"))
            }
            (FeatureKind::Tree, FeatureGeometry::Polygon(_)) => {
                Err(OverlayError::invalid("a tree is a point, not a polygon"))
            }
        }
    }

    /// What changed between `previous` and this revision of the same feature.
    pub fn diff(&self, previous: &GeographicFeature) -> FeatureDiff {
        let (now, before) = (&self.properties, &previous.properties);
        FeatureDiff {
            footprint: self.geometry != previous.geometry || now.size != before.size,
            rotation_delta: signed_rotation_delta(before.rotation, now.rotation),
            height: now.height != before.height,
            base: now.base != before.base,
            color: now.color != before.color,
        }
    }
}

/// Per-field change summary used to decide between in-place updates,
/// animations and geometry rebuilds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeatureDiff {
    pub footprint: bool,
    /// Shortest signed turn from the old bearing to the new one.
    pub rotation_delta: f64,
    pub height: bool,
    pub base: bool,
    pub color: bool,
}

impl FeatureDiff {
    pub fn needs_rebuild(&self) -> bool {
        self.footprint || self.rotation_delta != 0.0
    }
}

/// Signed angle in `(-180, 180]` that turns `from` onto `to`.
pub fn signed_rotation_delta(from: f64, to: f64) -> f64 {
    let delta = footprint::normalize_rotation(to - from);
    if delta > 180.0 { delta - 360.0 } else { delta }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::geo::footprint::rectangle;

    fn building() -> GeographicFeature {
        GeographicFeature {
            id: FeatureId::new("b-1"),
            kind: FeatureKind::Building,
            geometry: FeatureGeometry::Polygon(
                rectangle(LngLat::new(-0.1276, 51.5072), 10.0, 10.0, 0.0).unwrap(),
            ),
            properties: FeatureProperties {
                height: 10.0,
                base: 0.0,
                color: "#b9a58b".into(),
                rotation: 0.0,
                size: None,
                content: None,
            },
        }
    }

    #[test]
    fn kind_and_geometry_must_agree() {
        let mut tree = building();
        tree.kind = FeatureKind::Tree;
        assert!(matches!(tree.validate(), Err(OverlayError::InvalidGeometry(_))));

        tree.geometry = FeatureGeometry::Point(LngLat::new(-0.1276, 51.5072));
        assert!(tree.validate().is_err(), "tree without a size");
        tree.properties.size = Some(4.0);
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn numeric_ranges_are_enforced() {
        let mut feature = building();
        feature.properties.height = -1.0;
        assert!(feature.validate().is_err());

        let mut feature = building();
        feature.properties.rotation = 360.0;
        assert!(feature.validate().is_err());

        assert!(building().validate().is_ok());
    }

    #[test]
    fn patch_only_touches_given_fields() {
        let props = building().properties;
        let patched = PropertyPatch {
            color: Some("#ff0000".into()),
            ..Default::default()
        }
        .apply(&props);
        assert_eq!(patched.color, "#ff0000");
        assert_eq!(patched.height, props.height);
        assert!(PropertyPatch::default().is_empty());
    }

    #[test]
    fn diff_classifies_changes() {
        let before = building();
        let mut after = before.clone();
        after.properties.height = 30.0;
        let diff = after.diff(&before);
        assert!(diff.height && !diff.needs_rebuild());

        after.properties.rotation = 350.0;
        let diff = after.diff(&before);
        assert_eq!(diff.rotation_delta, -10.0);
        assert!(diff.needs_rebuild());
    }

    #[test]
    fn geometry_serializes_as_tagged_coordinates() {
        let json = serde_json::to_value(FeatureGeometry::Point(LngLat::new(1.0, 2.0))).unwrap();
        assert_eq!(json["type"], "point");
        assert_eq!(json["coordinates"]["lng"], 1.0);
    }
}
