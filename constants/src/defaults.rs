/// Default building height in meters.
pub const BUILDING_HEIGHT: f64 = 12.0;

/// Default building footprint width and depth in meters.
pub const BUILDING_WIDTH: f64 = 12.0;
pub const BUILDING_DEPTH: f64 = 12.0;

/// Default building colour.
pub const BUILDING_COLOR: &str = "#b9a58b";

/// Default tree crown diameter in meters.
pub const TREE_SIZE: f64 = 4.0;

/// Default tree height in meters.
pub const TREE_HEIGHT: f64 = 8.0;

/// Default tree colour.
pub const TREE_COLOR: &str = "#3f7d3a";

/// Default number of segments for circular footprints.
pub const CIRCLE_SEGMENTS: u32 = 32;

/// Default scene origin (central London).
pub const ORIGIN_LNG: f64 = -0.1276;
pub const ORIGIN_LAT: f64 = 51.5072;

/// Storage keys for the persisted per-kind snapshots.
pub const BUILDINGS_STORAGE_KEY: &str = "overlay.buildings";
pub const TREES_STORAGE_KEY: &str = "overlay.trees";

/// Notifications kept visible before the oldest is dropped.
pub const MAX_VISIBLE_NOTIFICATIONS: usize = 32;
