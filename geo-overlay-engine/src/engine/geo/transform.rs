use bevy::math::DVec2;
use constants::coordinate_system::{
    COORDINATE_EPSILON, EARTH_CIRCUMFERENCE, MAX_MERCATOR_LATITUDE, METERS_PER_DEGREE,
};
use geo::{Centroid, LineString, Polygon};
use serde::{Deserialize, Serialize};

/// A WGS84 longitude/latitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    pub fn is_finite(&self) -> bool {
        self.lng.is_finite() && self.lat.is_finite()
    }

    pub fn is_in_range(&self) -> bool {
        (-180.0..=180.0).contains(&self.lng) && (-90.0..=90.0).contains(&self.lat)
    }

    pub fn approx_eq(&self, other: &LngLat) -> bool {
        (self.lng - other.lng).abs() <= COORDINATE_EPSILON
            && (self.lat - other.lat).abs() <= COORDINATE_EPSILON
    }

    /// Offset by a metric displacement (east, north) at this point's latitude.
    pub fn offset_meters(&self, east: f64, north: f64) -> LngLat {
        LngLat::new(
            self.lng + meters_to_lng_delta(east, self.lat),
            self.lat + meters_to_lat_delta(north),
        )
    }

    /// Metric displacement (east, north) from `origin` to this point.
    pub fn meters_from(&self, origin: &LngLat) -> DVec2 {
        DVec2::new(
            lng_delta_to_meters(self.lng - origin.lng, origin.lat),
            lat_delta_to_meters(self.lat - origin.lat),
        )
    }
}

fn clamp_latitude(lat: f64) -> f64 {
    lat.clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE)
}

/// Degrees of latitude spanned by `meters` of northward distance.
pub fn meters_to_lat_delta(meters: f64) -> f64 {
    meters / METERS_PER_DEGREE
}

/// Degrees of longitude spanned by `meters` of eastward distance at `at_latitude`.
///
/// Meridians converge towards the poles, so the divisor shrinks with
/// `cos(latitude)`.
pub fn meters_to_lng_delta(meters: f64, at_latitude: f64) -> f64 {
    meters / (METERS_PER_DEGREE * clamp_latitude(at_latitude).to_radians().cos())
}

pub fn lat_delta_to_meters(degrees: f64) -> f64 {
    degrees * METERS_PER_DEGREE
}

pub fn lng_delta_to_meters(degrees: f64, at_latitude: f64) -> f64 {
    degrees * METERS_PER_DEGREE * clamp_latitude(at_latitude).to_radians().cos()
}

/// Project onto the Web Mercator unit square (x east, y south, both in [0, 1]).
pub fn lng_lat_to_mercator(point: LngLat) -> DVec2 {
    let lat = clamp_latitude(point.lat);
    let x = (180.0 + point.lng) / 360.0;
    let y = (180.0
        - (180.0 / std::f64::consts::PI)
            * (std::f64::consts::FRAC_PI_4 + lat * std::f64::consts::PI / 360.0)
                .tan()
                .ln())
        / 360.0;
    DVec2::new(x, y)
}

pub fn mercator_to_lng_lat(mercator: DVec2) -> LngLat {
    let lng = mercator.x * 360.0 - 180.0;
    let y2 = 180.0 - mercator.y * 360.0;
    let lat = 360.0 / std::f64::consts::PI * (y2 * std::f64::consts::PI / 180.0).exp().atan() - 90.0;
    LngLat::new(lng, lat)
}

/// Mercator units covered by one real meter at `latitude`.
pub fn mercator_units_per_meter(latitude: f64) -> f64 {
    1.0 / (EARTH_CIRCUMFERENCE * clamp_latitude(latitude).to_radians().cos())
}

/// A footprint ring expressed in overlay scene units.
///
/// Scene units are meters at the scene reference latitude; x grows east and
/// the second component grows south, matching the Mercator y axis.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalFootprint {
    /// Ring vertices without the closing duplicate.
    pub points: Vec<DVec2>,
    /// Area-weighted centroid of the geographic ring.
    pub centroid: LngLat,
    /// Centroid in scene units.
    pub centroid_local: DVec2,
    /// Scene units per real meter, sampled at the centroid.
    pub region_scale: f64,
}

/// Scene-unit position of `point` relative to `reference`.
pub fn project_point_to_local_plane(point: LngLat, reference: LngLat) -> DVec2 {
    let delta = lng_lat_to_mercator(point) - lng_lat_to_mercator(reference);
    delta / mercator_units_per_meter(reference.lat)
}

/// Scene units per real meter at `latitude` for a scene anchored at `reference`.
pub fn region_scale_factor(latitude: f64, reference: LngLat) -> f64 {
    mercator_units_per_meter(latitude) / mercator_units_per_meter(reference.lat)
}

/// Convert a closed geographic ring into local planar coordinates ready for
/// extrusion.
pub fn project_polygon_to_local_plane(ring: &[LngLat], reference: LngLat) -> LocalFootprint {
    let open = open_ring(ring);
    let centroid = ring_centroid(ring);
    let points = open
        .iter()
        .map(|p| project_point_to_local_plane(*p, reference))
        .collect();

    LocalFootprint {
        points,
        centroid,
        centroid_local: project_point_to_local_plane(centroid, reference),
        region_scale: region_scale_factor(centroid.lat, reference),
    }
}

/// Ring without its closing coordinate.
pub fn open_ring(ring: &[LngLat]) -> &[LngLat] {
    match (ring.first(), ring.last()) {
        (Some(first), Some(last)) if ring.len() > 1 && first.approx_eq(last) => {
            &ring[..ring.len() - 1]
        }
        _ => ring,
    }
}

/// Area-weighted centroid; falls back to the vertex mean for degenerate rings.
pub fn ring_centroid(ring: &[LngLat]) -> LngLat {
    let polygon = Polygon::new(
        LineString::from(ring.iter().map(|p| (p.lng, p.lat)).collect::<Vec<_>>()),
        vec![],
    );
    if let Some(c) = polygon.centroid() {
        if c.x().is_finite() && c.y().is_finite() {
            return LngLat::new(c.x(), c.y());
        }
    }

    let open = open_ring(ring);
    if open.is_empty() {
        return LngLat::new(0.0, 0.0);
    }
    let n = open.len() as f64;
    let (sum_lng, sum_lat) = open
        .iter()
        .fold((0.0, 0.0), |(lng, lat), p| (lng + p.lng, lat + p.lat));
    LngLat::new(sum_lng / n, sum_lat / n)
}
