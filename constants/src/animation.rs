/// Scale the extrusion starts from when a feature rises in.
/// Kept above zero so the transform never becomes singular.
pub const RISE_START_SCALE: f32 = 0.001;

/// Default rise-in duration in milliseconds.
pub const RISE_DURATION_MS: u64 = 600;

/// Default height retarget duration in milliseconds.
pub const HEIGHT_DURATION_MS: u64 = 450;

/// Default rotation swing duration in milliseconds.
pub const ROTATION_DURATION_MS: u64 = 350;

/// Number of finished task outcomes the scheduler remembers for state queries.
pub const TASK_HISTORY_LIMIT: usize = 512;
