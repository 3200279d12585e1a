/// Emissive colour applied to the selected feature's material (linear RGB).
pub const SELECTION_HIGHLIGHT: [f32; 3] = [0.45, 0.12, 0.05];

/// Number of radial segments for the tree crown cone.
pub const TREE_CONE_SEGMENTS: u32 = 16;

/// Minimum ring area in square meters below which a footprint is degenerate.
pub const MIN_FOOTPRINT_AREA: f64 = 1e-4;

/// Upper bound on circle segments accepted for a footprint.
pub const MAX_CIRCLE_SEGMENTS: u32 = 256;

/// Upper bound on distinct vertices in a polygon footprint.
pub const MAX_RING_VERTICES: usize = 1024;
