//! Overlay geometry and mesh ownership.
//!
//! Meshes are baked at unit height in a local metric frame centered on the
//! feature; height, rise-in and rotation swing live in the entity transform.

/// Unit-height prism and cone builders.
pub mod extrusion;

/// Feature id to mesh entry index and change-driven lifecycle.
pub mod lifecycle;
