/// Web Mercator sphere radius in meters (EPSG:3857).
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Equatorial circumference of the Web Mercator sphere in meters.
pub const EARTH_CIRCUMFERENCE: f64 = 2.0 * std::f64::consts::PI * EARTH_RADIUS;

/// Length of one degree of latitude (and of longitude at the equator) in meters.
pub const METERS_PER_DEGREE: f64 = EARTH_CIRCUMFERENCE / 360.0;

/// Latitude limit of the Web Mercator projection in degrees.
/// Latitudes are clamped to this before any `cos(lat)` division.
pub const MAX_MERCATOR_LATITUDE: f64 = 85.051_128_779_806_59;

/// Tolerance used when comparing geographic coordinates for ring closure.
pub const COORDINATE_EPSILON: f64 = 1e-12;
