//! Host map contract and the host-driven engine runner.
//!
//! The engine never runs its own loop. The host map calls `on_add` once when
//! the overlay layer is attached and `next_frame` from its draw callback,
//! handing over the camera matrix of the frame being rendered. Each call
//! runs exactly one `App::update`.

use std::time::Duration;

use bevy::ecs::system::RunSystemOnce;
use bevy::math::DMat4;
use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use serde::Serialize;

use crate::OverlayPlugin;
use crate::config::OverlayConfig;
use crate::engine::animation::AnimationScheduler;
use crate::engine::camera::sync::{CameraState, HostFrame, spawn_overlay_camera};
use crate::engine::features::model::{FeatureId, FeatureKind, GeographicFeature, PropertyPatch};
use crate::engine::features::store::FeatureStore;
use crate::engine::geo::transform::LngLat;
use crate::engine::mesh::lifecycle::{MeshEntry, MeshIndex};
use crate::engine::notifications::{Notification, Notifications};
use crate::engine::operations::{self, FeatureSync, OverlayCommand, PendingCommands};
use crate::engine::persistence::{PersistenceAdapter, PersistenceHandle, PersistenceStatus, restore_snapshots};
use crate::engine::render::frame::{FrameSnapshot, MeshBuffers};
use crate::error::OverlayResult;
use crate::rpc::web_rpc::{MessageQueue, RpcTranscript};
use crate::tools::interaction::{self, ClickOutcome, InteractionState, InteractionUpdate, MapClick};

/// Longest simulated step between two host frames. Background tabs can
/// pause the host for seconds; animations must still land on their target.
const MAX_FRAME_DELTA: Duration = Duration::from_secs(3600);

/// Services the host map provides to the overlay.
pub trait HostMap {
    /// Ask the host to render another frame.
    fn trigger_repaint(&self);

    /// Ids of the features the host renders under a screen position.
    fn query_rendered_features(&self, screen: Vec2) -> Vec<String>;
}

/// Non-send holder for the host map; browser handles are not `Send`.
pub struct HostHandle(pub Box<dyn HostMap>);

/// Counts reported by `stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayStats {
    pub buildings: usize,
    pub trees: usize,
    pub meshes: usize,
    pub active_animations: usize,
    pub frame: u64,
    pub persistence_degraded: bool,
}

/// Collect overlay counters from the world.
pub fn overlay_stats(world: &World) -> OverlayStats {
    let store = world.resource::<FeatureStore>();
    OverlayStats {
        buildings: store.count(FeatureKind::Building),
        trees: store.count(FeatureKind::Tree),
        meshes: world.resource::<MeshIndex>().len(),
        active_animations: world.resource::<AnimationScheduler>().active_count(),
        frame: world.resource::<CameraState>().frame,
        persistence_degraded: world.resource::<PersistenceStatus>().degraded,
    }
}

/// Headless Bevy app driven by the host map's render loop.
pub struct OverlayEngine {
    app: App,
    manual_clock: bool,
    pending_advance: Duration,
    attached: bool,
}

impl OverlayEngine {
    /// Engine on the wall clock, for a real host map.
    pub fn new(
        config: OverlayConfig,
        host: impl HostMap + 'static,
        persistence: impl PersistenceAdapter + 'static,
    ) -> Self {
        Self::build(config, Box::new(host), Box::new(persistence), false)
    }

    /// Engine whose clock only moves through `advance_time`.
    pub fn headless(
        config: OverlayConfig,
        host: impl HostMap + 'static,
        persistence: impl PersistenceAdapter + 'static,
    ) -> Self {
        Self::build(config, Box::new(host), Box::new(persistence), true)
    }

    fn build(
        config: OverlayConfig,
        host: Box<dyn HostMap>,
        persistence: Box<dyn PersistenceAdapter>,
        manual_clock: bool,
    ) -> Self {
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, AssetPlugin::default()));
        if !manual_clock {
            app.add_plugins(bevy::log::LogPlugin::default());
        }

        app.init_asset::<Mesh>()
            .init_asset::<StandardMaterial>()
            .insert_resource(config)
            .insert_non_send_resource(HostHandle(host))
            .insert_non_send_resource(PersistenceHandle(persistence))
            .add_plugins(OverlayPlugin);

        if manual_clock {
            app.insert_resource(TimeUpdateStrategy::ManualDuration(Duration::ZERO));
        }
        app.world_mut()
            .resource_mut::<Time<Virtual>>()
            .set_max_delta(MAX_FRAME_DELTA);

        app.finish();
        app.cleanup();
        // The first update only starts the clocks; later deltas count from here.
        app.update();

        Self {
            app,
            manual_clock,
            pending_advance: Duration::ZERO,
            attached: false,
        }
    }

    /// One-time setup when the layer is attached to the map: spawn the
    /// overlay camera and restore persisted features. Returns the number of
    /// features in the store afterwards; repeated calls change nothing.
    pub fn on_add(&mut self) -> usize {
        if self.attached {
            return self.store().len();
        }
        self.attached = true;

        let world = self.app.world_mut();
        if let Err(error) = world.run_system_once(spawn_overlay_camera) {
            error!("Failed to spawn overlay camera: {}", error);
        }
        let restored = restore_snapshots(world);
        world.run_schedule(FeatureSync);
        info!("Overlay attached, {} feature(s) restored", restored);
        self.store().len()
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Render one host frame with the host's camera matrix.
    pub fn next_frame(&mut self, host_matrix: DMat4) -> &FrameSnapshot {
        self.app.world_mut().resource_mut::<HostFrame>().submit(host_matrix);
        self.tick();
        self.frame_snapshot()
    }

    /// Run one tick without a host matrix. Nothing is drawn.
    pub fn update(&mut self) -> &FrameSnapshot {
        self.tick();
        self.frame_snapshot()
    }

    fn tick(&mut self) {
        if self.manual_clock {
            let step = std::mem::take(&mut self.pending_advance);
            self.app.insert_resource(TimeUpdateStrategy::ManualDuration(step));
        }
        self.app.update();
    }

    /// Move the manual clock forward; applied on the next tick.
    pub fn advance_time(&mut self, step: Duration) {
        if !self.manual_clock {
            warn!("advance_time ignored: engine runs on the wall clock");
            return;
        }
        self.pending_advance += step;
    }

    pub fn world(&self) -> &World {
        self.app.world()
    }

    pub fn world_mut(&mut self) -> &mut World {
        self.app.world_mut()
    }

    /// Queue a JSON-RPC message from the page; handled on the next tick.
    pub fn post_message(&mut self, message: impl Into<String>) {
        self.app.world().resource::<MessageQueue>().push(message.into());
    }

    /// Messages the engine sent to the page since the last call.
    pub fn take_rpc_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.app.world_mut().resource_mut::<RpcTranscript>().0)
    }

    /// Queue a command for the next tick.
    pub fn queue(&mut self, command: OverlayCommand) -> operations::CommandTicket {
        self.app.world_mut().resource_mut::<PendingCommands>().push(command)
    }

    /// Vertex data of a feature's mesh, if one is built.
    pub fn geometry(&self, id: &FeatureId) -> Option<MeshBuffers> {
        let entry = self.world().resource::<MeshIndex>().get(id)?;
        let mesh = self.world().resource::<Assets<Mesh>>().get(&entry.geometry)?;
        MeshBuffers::from_mesh(mesh)
    }

    pub fn place_feature(&mut self, feature: GeographicFeature, screen: Option<Vec2>) -> OverlayResult<FeatureId> {
        operations::place_feature(self.world_mut(), feature, screen)
    }

    pub fn select_feature(&mut self, id: Option<FeatureId>) -> OverlayResult<()> {
        operations::select_feature(self.world_mut(), id)
    }

    pub fn rotate_feature(&mut self, id: &FeatureId, delta_deg: f64) -> OverlayResult<f64> {
        operations::rotate_feature(self.world_mut(), id, delta_deg)
    }

    pub fn update_feature_properties(
        &mut self,
        id: &FeatureId,
        patch: PropertyPatch,
    ) -> OverlayResult<GeographicFeature> {
        operations::update_feature_properties(self.world_mut(), id, patch)
    }

    pub fn delete_feature(&mut self, id: &FeatureId) -> OverlayResult<GeographicFeature> {
        operations::delete_feature(self.world_mut(), id)
    }

    pub fn import_features(&mut self, kind: FeatureKind, document: &str) -> OverlayResult<usize> {
        operations::import_features(self.world_mut(), kind, document)
    }

    pub fn export_features(&self, kind: FeatureKind) -> String {
        operations::export_features(self.world(), kind)
    }

    pub fn clear_features(&mut self, kind: Option<FeatureKind>) -> usize {
        operations::clear_features(self.world_mut(), kind)
    }

    pub fn handle_map_click(&mut self, screen: Vec2, lng_lat: LngLat) -> OverlayResult<ClickOutcome> {
        interaction::handle_map_click(self.world_mut(), MapClick { screen, lng_lat })
    }

    pub fn place_custom_ring(&mut self, ring: &[LngLat]) -> OverlayResult<FeatureId> {
        interaction::place_custom_ring(self.world_mut(), ring)
    }

    pub fn set_interaction(&mut self, update: InteractionUpdate) {
        self.world_mut().resource_mut::<InteractionState>().apply(update);
    }

    pub fn dismiss_notification(&mut self, id: u64) -> bool {
        self.world_mut().resource_mut::<Notifications>().dismiss(id)
    }

    pub fn store(&self) -> &FeatureStore {
        self.world().resource::<FeatureStore>()
    }

    pub fn feature(&self, id: &FeatureId) -> Option<&GeographicFeature> {
        self.store().get(id)
    }

    pub fn mesh_entry(&self, id: &FeatureId) -> Option<&MeshEntry> {
        self.world().resource::<MeshIndex>().get(id)
    }

    pub fn scheduler(&self) -> &AnimationScheduler {
        self.world().resource::<AnimationScheduler>()
    }

    pub fn interaction(&self) -> &InteractionState {
        self.world().resource::<InteractionState>()
    }

    pub fn notifications(&self) -> &[Notification] {
        self.world().resource::<Notifications>().visible()
    }

    pub fn persistence_status(&self) -> &PersistenceStatus {
        self.world().resource::<PersistenceStatus>()
    }

    pub fn camera_state(&self) -> &CameraState {
        self.world().resource::<CameraState>()
    }

    pub fn frame_snapshot(&self) -> &FrameSnapshot {
        self.world().resource::<FrameSnapshot>()
    }

    pub fn stats(&self) -> OverlayStats {
        overlay_stats(self.world())
    }

    /// Elapsed engine time as seen by the animation scheduler.
    pub fn elapsed(&self) -> Duration {
        self.world().resource::<Time>().elapsed()
    }
}
