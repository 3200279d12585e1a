//! Interaction controller glue between the host map UI and the overlay.
//!
//! The host owns every widget: shape pickers, dimension inputs and the
//! polygon drawing tool. This module only keeps what a click currently
//! means and turns clicks into overlay operations.
//!
//! ```text
//! set_interaction ──> InteractionState { mode, kind, shape, dimensions }
//!
//! map click
//!   ├─ Placing ──> feature_from_placement ──> place_feature ──> Idle
//!   └─ Idle ────> HostMap::query_rendered_features
//!                   ├─ first hit in store ──> select_feature(Some)
//!                   └─ nothing ────────────> select_feature(None)
//!
//! drawn ring ──> place_custom_ring ──> place_feature
//! ```

/// Interaction state, map click routing and placement builders.
pub mod interaction;
