//! Closed polygon rings built from a center, dimensions and a bearing.
//!
//! Shapes are laid out in a local metric plane (x east, y north) around the
//! center and converted back to geographic coordinates one vertex at a time.
//! Rotations follow the compass convention: positive angles turn clockwise
//! when seen from above.

use bevy::math::DVec2;
use constants::render_settings::{MAX_CIRCLE_SEGMENTS, MAX_RING_VERTICES, MIN_FOOTPRINT_AREA};
use geo::{Area, LineString, Polygon};

use super::transform::{LngLat, open_ring, ring_centroid};
use crate::error::{OverlayError, OverlayResult};

/// Closed ring of geographic coordinates; the last coordinate repeats the first.
pub type Ring = Vec<LngLat>;

/// Reduce any finite angle into `[0, 360)`.
pub fn normalize_rotation(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid of a tiny negative value rounds up to exactly 360.
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

fn rotate_clockwise(point: DVec2, degrees: f64) -> DVec2 {
    let (sin, cos) = degrees.to_radians().sin_cos();
    DVec2::new(point.x * cos + point.y * sin, -point.x * sin + point.y * cos)
}

fn close(mut ring: Ring) -> Ring {
    if let Some(first) = ring.first().copied() {
        ring.push(first);
    }
    ring
}

fn require_vertex_budget(count: usize) -> OverlayResult<()> {
    if count > MAX_RING_VERTICES {
        return Err(OverlayError::invalid(format!(
            "a ring may have at most {MAX_RING_VERTICES} vertices, got {count}"
        )));
    }
    Ok(())
}

fn require_positive(name: &str, value: f64) -> OverlayResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(OverlayError::invalid(format!("{name} must be positive, got {value}")))
    }
}

fn require_center(center: LngLat) -> OverlayResult<()> {
    if center.is_finite() && center.is_in_range() {
        Ok(())
    } else {
        Err(OverlayError::invalid(format!(
            "center ({}, {}) is not a valid coordinate",
            center.lng, center.lat
        )))
    }
}

/// Rectangle of `width` x `depth` meters centered on `center`, turned
/// clockwise by `rotation_deg`.
pub fn rectangle(center: LngLat, width: f64, depth: f64, rotation_deg: f64) -> OverlayResult<Ring> {
    require_center(center)?;
    require_positive("width", width)?;
    require_positive("depth", depth)?;
    if !rotation_deg.is_finite() {
        return Err(OverlayError::invalid("rotation must be finite"));
    }

    let rotation = normalize_rotation(rotation_deg);
    let (hw, hd) = (width / 2.0, depth / 2.0);
    let corners = [
        DVec2::new(-hw, -hd),
        DVec2::new(hw, -hd),
        DVec2::new(hw, hd),
        DVec2::new(-hw, hd),
    ];

    let ring = corners
        .iter()
        .map(|corner| {
            let turned = rotate_clockwise(*corner, rotation);
            center.offset_meters(turned.x, turned.y)
        })
        .collect();
    Ok(close(ring))
}

/// Circle of `radius` meters sampled at `segments` evenly spaced bearings,
/// starting due north.
pub fn circle(center: LngLat, radius: f64, segments: u32) -> OverlayResult<Ring> {
    require_center(center)?;
    require_positive("radius", radius)?;
    if !(3..=MAX_CIRCLE_SEGMENTS).contains(&segments) {
        return Err(OverlayError::invalid(format!(
            "a circle needs between 3 and {MAX_CIRCLE_SEGMENTS} segments, got {segments}"
        )));
    }

    let step = 360.0 / segments as f64;
    let ring = (0..segments)
        .map(|i| {
            let bearing = (i as f64 * step).to_radians();
            center.offset_meters(radius * bearing.sin(), radius * bearing.cos())
        })
        .collect();
    Ok(close(ring))
}

/// Validate a drawn ring and close it if the drawing tool left it open.
pub fn custom(ring: &[LngLat]) -> OverlayResult<Ring> {
    if ring.iter().any(|p| !p.is_finite() || !p.is_in_range()) {
        return Err(OverlayError::invalid("ring contains an invalid coordinate"));
    }
    require_vertex_budget(open_ring(ring).len())?;

    let points = distinct_vertices(ring);
    if points.len() < 3 {
        return Err(OverlayError::invalid(format!(
            "a ring needs at least 3 distinct vertices, got {}",
            points.len()
        )));
    }

    let closed = close(points);
    validate_ring(&closed)?;
    Ok(closed)
}

/// Open ring with consecutive repeated vertices collapsed, including a
/// repeat of the first vertex at the end.
pub fn distinct_vertices(ring: &[LngLat]) -> Ring {
    let mut points: Ring = open_ring(ring).to_vec();
    points.dedup_by(|a, b| a.approx_eq(b));
    while points.len() > 1 && points[0].approx_eq(&points[points.len() - 1]) {
        points.pop();
    }
    points
}

/// Closed ring without consecutive repeated vertices.
pub fn without_repeated_vertices(ring: &[LngLat]) -> Ring {
    close(distinct_vertices(ring))
}

/// Turn a closed ring clockwise by `delta_deg` around its centroid.
pub fn rotate_ring(ring: &[LngLat], delta_deg: f64) -> OverlayResult<Ring> {
    validate_ring(ring)?;
    if !delta_deg.is_finite() {
        return Err(OverlayError::invalid("rotation delta must be finite"));
    }

    let pivot = ring_centroid(ring);
    let rotated = open_ring(ring)
        .iter()
        .map(|p| {
            let turned = rotate_clockwise(p.meters_from(&pivot), delta_deg);
            pivot.offset_meters(turned.x, turned.y)
        })
        .collect();
    Ok(close(rotated))
}

/// First coordinate equals the last and at least three distinct vertices remain.
pub fn is_closed(ring: &[LngLat]) -> bool {
    match (ring.first(), ring.last()) {
        (Some(first), Some(last)) => ring.len() >= 4 && first.approx_eq(last),
        _ => false,
    }
}

/// Footprint area in square meters, measured in a plane tangent at the centroid.
pub fn ring_area_m2(ring: &[LngLat]) -> f64 {
    let pivot = ring_centroid(ring);
    let local: Vec<(f64, f64)> = ring
        .iter()
        .map(|p| {
            let m = p.meters_from(&pivot);
            (m.x, m.y)
        })
        .collect();
    Polygon::new(LineString::from(local), vec![]).unsigned_area()
}

/// Reject unclosed, oversized, non-finite or zero-area rings.
pub fn validate_ring(ring: &[LngLat]) -> OverlayResult<()> {
    if ring.iter().any(|p| !p.is_finite() || !p.is_in_range()) {
        return Err(OverlayError::invalid("ring contains an invalid coordinate"));
    }
    require_vertex_budget(ring.len().saturating_sub(1))?;
    if !is_closed(ring) {
        return Err(OverlayError::invalid("ring is not closed"));
    }
    let area = ring_area_m2(ring);
    if area < MIN_FOOTPRINT_AREA {
        return Err(OverlayError::invalid(format!("ring is degenerate (area {area:.2e} m²)")));
    }
    Ok(())
}
