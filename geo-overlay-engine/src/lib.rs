//! Georeferenced 3D overlay for an interactive host map.
//!
//! Building footprints and tree points placed on the map are extruded into
//! animated volumes that stay aligned with the map camera while it pans,
//! zooms and tilts. The host map owns the render loop and the GL context;
//! this crate owns the features, their meshes and the per-frame draw list.
//!
//! ## Tick Order
//!
//! ```text
//! host draw callback ──> OverlayEngine::next_frame(matrix)
//!   PreUpdate   handle_rpc_messages, apply_pending_commands
//!   Update      sync_overlay_camera ──> tick_animations ──> apply_mesh_transforms
//!   PostUpdate  extract_frame_snapshot
//!   Last        forward_overlay_events, send_outgoing_messages, request_host_repaint
//!
//! mutation ──> FeatureStore ──> persist ──> FeatureSync
//!   FeatureSync publish_feature_changes ──> sync_meshes_with_features ──> apply_selection_highlight
//! ```

use bevy::prelude::*;

pub mod config;
pub mod engine;
pub mod error;
pub mod rpc;
pub mod tools;

#[cfg(target_arch = "wasm32")]
pub mod wasm;

use engine::animation::{AnimationScheduler, tick_animations};
use engine::camera::sync::{CameraState, HostFrame, request_host_repaint, sync_overlay_camera};
use engine::features::store::{FeatureChanged, FeatureStore, publish_feature_changes};
use engine::mesh::lifecycle::{MeshIndex, apply_mesh_transforms, apply_selection_highlight, sync_meshes_with_features};
use engine::notifications::Notifications;
use engine::operations::{
    CommandCompleted, FeatureSync, PendingCommands, SelectionChanged, apply_pending_commands,
};
use engine::persistence::PersistenceStatus;
use engine::render::frame::{FrameSnapshot, extract_frame_snapshot};
use rpc::web_rpc::WebRpcPlugin;
use tools::interaction::InteractionState;

pub use config::{AnimationConfig, FeatureDefaults, OverlayConfig};
pub use engine::features::model::{
    FeatureGeometry, FeatureId, FeatureKind, FeatureProperties, GeographicFeature, PropertyPatch,
};
pub use engine::geo::transform::LngLat;
pub use engine::host::{HostMap, OverlayEngine, OverlayStats};
pub use engine::persistence::{MemoryPersistence, PersistenceAdapter, PersistenceError};
pub use error::{ErrorKind, OverlayError, OverlayResult};

/// Registers the overlay's resources, events and schedules.
///
/// Expects `Time`, `Assets<Mesh>` and `Assets<StandardMaterial>` to exist;
/// `OverlayEngine` provides them.
pub struct OverlayPlugin;

impl Plugin for OverlayPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<OverlayConfig>()
            .init_resource::<FeatureStore>()
            .init_resource::<MeshIndex>()
            .init_resource::<AnimationScheduler>()
            .init_resource::<CameraState>()
            .init_resource::<HostFrame>()
            .init_resource::<FrameSnapshot>()
            .init_resource::<Notifications>()
            .init_resource::<PersistenceStatus>()
            .init_resource::<InteractionState>()
            .init_resource::<PendingCommands>()
            .add_event::<FeatureChanged>()
            .add_event::<SelectionChanged>()
            .add_event::<CommandCompleted>()
            .init_schedule(FeatureSync)
            .add_systems(
                FeatureSync,
                (
                    publish_feature_changes,
                    sync_meshes_with_features,
                    apply_selection_highlight,
                )
                    .chain(),
            )
            .add_systems(PreUpdate, apply_pending_commands)
            .add_systems(
                Update,
                (sync_overlay_camera, tick_animations, apply_mesh_transforms).chain(),
            )
            .add_systems(PostUpdate, extract_frame_snapshot)
            .add_systems(Last, request_host_repaint)
            .add_plugins(WebRpcPlugin);
    }
}
