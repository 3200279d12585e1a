//! GeoJSON codec for feature collections.
//!
//! Export writes one `FeatureCollection` per kind with the feature id
//! repeated in `properties.id`. Import accepts the same document, fills
//! missing properties from the configured defaults and gives features
//! without an id a fresh UUID. Any problem rejects the whole document.

use geojson::{Feature, FeatureCollection as GeoJsonCollection, GeoJson, Geometry, JsonObject, Value};
use serde::Deserialize;

use super::model::{FeatureGeometry, FeatureId, FeatureKind, FeatureProperties, GeographicFeature};
use super::store::FeatureCollection;
use crate::config::FeatureDefaults;
use crate::engine::geo::footprint::normalize_rotation;
use crate::engine::geo::transform::LngLat;
use crate::error::{OverlayError, OverlayResult};

fn position(point: &LngLat) -> Vec<f64> {
    vec![point.lng, point.lat]
}

fn feature_to_geojson(feature: &GeographicFeature) -> Feature {
    let value = match &feature.geometry {
        FeatureGeometry::Polygon(ring) => Value::Polygon(vec![ring.iter().map(position).collect()]),
        FeatureGeometry::Point(point) => Value::Point(position(point)),
    };

    let p = &feature.properties;
    let mut properties = JsonObject::new();
    properties.insert("id".into(), feature.id.as_str().into());
    properties.insert("height".into(), p.height.into());
    properties.insert("base".into(), p.base.into());
    properties.insert("color".into(), p.color.clone().into());
    properties.insert("rotation".into(), p.rotation.into());
    if let Some(size) = p.size {
        properties.insert("size".into(), size.into());
    }
    if let Some(content) = &p.content {
        properties.insert("content".into(), content.clone().into());
    }

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(value)),
        id: Some(geojson::feature::Id::String(feature.id.as_str().to_string())),
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Serialize one kind's snapshot as a GeoJSON `FeatureCollection`.
pub fn export_collection(collection: &FeatureCollection) -> GeoJson {
    GeoJson::FeatureCollection(GeoJsonCollection {
        bbox: None,
        features: collection.values().map(feature_to_geojson).collect(),
        foreign_members: None,
    })
}

pub fn export_collection_string(collection: &FeatureCollection) -> String {
    export_collection(collection).to_string()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ImportedId {
    Text(String),
    Number(serde_json::Number),
}

#[derive(Deserialize, Default)]
struct ImportedProperties {
    id: Option<ImportedId>,
    height: Option<f64>,
    base: Option<f64>,
    color: Option<String>,
    rotation: Option<f64>,
    size: Option<f64>,
    content: Option<String>,
}

fn geometry_name(value: &Value) -> &'static str {
    match value {
        Value::Point(_) => "Point",
        Value::MultiPoint(_) => "MultiPoint",
        Value::LineString(_) => "LineString",
        Value::MultiLineString(_) => "MultiLineString",
        Value::Polygon(_) => "Polygon",
        Value::MultiPolygon(_) => "MultiPolygon",
        Value::GeometryCollection(_) => "GeometryCollection",
    }
}

fn parse_failure(index: usize, message: impl std::fmt::Display) -> OverlayError {
    OverlayError::ImportParseFailure(format!("feature #{index}: {message}"))
}

fn parse_position(index: usize, position: &[f64]) -> OverlayResult<LngLat> {
    match position {
        [lng, lat, ..] => Ok(LngLat::new(*lng, *lat)),
        _ => Err(parse_failure(index, "position needs a longitude and a latitude")),
    }
}

fn resolve_id(index: usize, properties: &ImportedProperties, feature: &Feature) -> OverlayResult<FeatureId> {
    let from_properties = match &properties.id {
        Some(ImportedId::Text(text)) => Some(text.clone()),
        Some(ImportedId::Number(number)) => Some(number.to_string()),
        None => None,
    };
    let from_feature = match &feature.id {
        Some(geojson::feature::Id::String(text)) => Some(text.clone()),
        Some(geojson::feature::Id::Number(number)) => Some(number.to_string()),
        None => None,
    };

    match from_properties.or(from_feature) {
        Some(id) if id.trim().is_empty() => Err(parse_failure(index, "empty id")),
        Some(id) => Ok(FeatureId::new(id)),
        None => Ok(FeatureId::generate()),
    }
}

fn import_feature(
    index: usize,
    feature: &Feature,
    kind: FeatureKind,
    defaults: &FeatureDefaults,
) -> OverlayResult<GeographicFeature> {
    let properties: ImportedProperties = match &feature.properties {
        Some(map) => serde_json::from_value(serde_json::Value::Object(map.clone()))
            .map_err(|e| parse_failure(index, e))?,
        None => ImportedProperties::default(),
    };
    let id = resolve_id(index, &properties, feature)?;

    let Some(geometry) = &feature.geometry else {
        return Err(parse_failure(index, "missing geometry"));
    };
    let geometry = match (&geometry.value, kind) {
        (Value::Polygon(rings), FeatureKind::Building) => {
            let Some(outer) = rings.first() else {
                return Err(parse_failure(index, "polygon has no rings"));
            };
            let ring = outer
                .iter()
                .map(|p| parse_position(index, p))
                .collect::<OverlayResult<Vec<_>>>()?;
            FeatureGeometry::Polygon(ring)
        }
        (Value::Point(point), FeatureKind::Tree) => FeatureGeometry::Point(parse_position(index, point)?),
        (other, kind) => {
            return Err(parse_failure(
                index,
                format!("{} geometry is not valid for a {}", geometry_name(other), kind.as_str()),
            ));
        }
    };

    let (default_height, default_color, default_size) = match kind {
        FeatureKind::Building => (defaults.building_height, &defaults.building_color, None),
        FeatureKind::Tree => (defaults.tree_height, &defaults.tree_color, Some(defaults.tree_size)),
    };

    let imported = GeographicFeature {
        id,
        kind,
        geometry,
        properties: FeatureProperties {
            height: properties.height.unwrap_or(default_height),
            base: properties.base.unwrap_or(defaults.building_base),
            color: properties.color.unwrap_or_else(|| default_color.clone()),
            rotation: properties.rotation.map(normalize_rotation).unwrap_or(0.0),
            size: properties.size.or(default_size),
            content: properties.content,
        },
    };

    imported
        .validate()
        .map_err(|e| parse_failure(index, format!("{} ({})", e, imported.id)))?;
    Ok(imported)
}

/// Parse and validate a GeoJSON document for `kind`.
///
/// Returns `ImportParseFailure` for malformed JSON, a document that is not a
/// `FeatureCollection`, a geometry that does not fit the kind, an invalid
/// feature or an id repeated within the document.
pub fn import_collection(
    document: &str,
    kind: FeatureKind,
    defaults: &FeatureDefaults,
) -> OverlayResult<FeatureCollection> {
    let geojson: GeoJson = document
        .parse()
        .map_err(|e| OverlayError::ImportParseFailure(format!("{e}")))?;

    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(OverlayError::ImportParseFailure(
            "expected a FeatureCollection document".into(),
        ));
    };

    let mut features = FeatureCollection::new();
    for (index, feature) in collection.features.iter().enumerate() {
        let imported = import_feature(index, feature, kind, defaults)?;
        if features.contains_key(&imported.id) {
            return Err(parse_failure(index, format!("duplicate id {}", imported.id)));
        }
        features.insert(imported.id.clone(), imported);
    }
    Ok(features)
}
