//! Geographic math for the overlay scene.
//!
//! Converts between WGS84 coordinates, the Web Mercator unit square and the
//! local metric plane that meshes are built in.

/// Rectangle, circle and drawn ring construction.
pub mod footprint;

/// Meter/degree conversions and local plane projection.
pub mod transform;
