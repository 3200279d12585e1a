//! Core overlay subsystems.
//!
//! Everything here runs inside one headless Bevy `App` owned by
//! `host::OverlayEngine`. The host map drives it: one `App::update` per
//! host frame, plus synchronous `FeatureSync` runs after each mutation.

/// Animation scheduler for rise, height and rotation transitions.
pub mod animation;

/// Camera sync bridge between the host map matrix and the overlay scene.
pub mod camera;

/// Feature model, store and GeoJSON codec.
pub mod features;

/// Coordinate transforms and footprint generation.
pub mod geo;

/// Host map contract and the host-driven engine runner.
pub mod host;

/// Per-feature mesh building and lifecycle.
pub mod mesh;

/// Dismissable notifications for failures and warnings.
pub mod notifications;

/// Mutation API and deferred commands.
pub mod operations;

/// Snapshot persistence adapters.
pub mod persistence;

/// Per-frame draw list extraction.
pub mod render;
