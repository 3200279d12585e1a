use bevy::math::{DMat4, DVec4};
use bevy::prelude::*;

use crate::config::OverlayConfig;
use crate::engine::animation::AnimationScheduler;
use crate::engine::geo::transform::{LngLat, lng_lat_to_mercator, mercator_units_per_meter};
use crate::engine::host::HostHandle;
use crate::engine::mesh::lifecycle::MeshIndex;

/// Matrix handed over by the host for the frame being rendered.
///
/// Filled by `OverlayEngine::next_frame` right before the tick and emptied
/// by `sync_overlay_camera`, so a matrix is consumed by exactly one tick.
#[derive(Resource, Debug, Default)]
pub struct HostFrame {
    matrix: Option<DMat4>,
}

impl HostFrame {
    pub fn submit(&mut self, matrix: DMat4) {
        self.matrix = Some(matrix);
    }

    pub fn take(&mut self) -> Option<DMat4> {
        self.matrix.take()
    }
}

/// The overlay's camera. Its projection is whatever the host supplied this
/// frame composed with the scene model matrix; it has no controller of its own.
#[derive(Component, Debug, Clone, Default)]
pub struct OverlayCamera {
    pub clip_from_scene: DMat4,
    pub frame: u64,
}

/// Camera matrices for the current tick, replaced wholesale each frame.
#[derive(Resource, Debug, Clone, Default)]
pub struct CameraState {
    pub host_matrix: DMat4,
    pub scene_model: DMat4,
    pub clip_from_scene: DMat4,
    /// Host frames seen so far.
    pub frame: u64,
    /// False when the current tick ran without a host matrix.
    pub synced: bool,
}

/// Maps overlay scene space (x east, y up, z south, meters at the origin
/// latitude) into Web Mercator units at `origin`, floor at `base_altitude`.
pub fn scene_model_matrix(origin: LngLat, base_altitude: f64) -> DMat4 {
    let s = mercator_units_per_meter(origin.lat);
    let o = lng_lat_to_mercator(origin);
    DMat4::from_cols(
        DVec4::new(s, 0.0, 0.0, 0.0),
        DVec4::new(0.0, 0.0, s, 0.0),
        DVec4::new(0.0, s, 0.0, 0.0),
        DVec4::new(o.x, o.y, base_altitude * s, 1.0),
    )
}

pub fn spawn_overlay_camera(mut commands: Commands) {
    commands.spawn((OverlayCamera::default(), Name::new("Overlay Camera")));
}

/// Adopt this frame's host matrix. Never falls back to an older one.
pub fn sync_overlay_camera(
    mut host_frame: ResMut<HostFrame>,
    config: Res<OverlayConfig>,
    mut state: ResMut<CameraState>,
    mut cameras: Query<&mut OverlayCamera>,
) {
    let Some(host_matrix) = host_frame.take() else {
        state.synced = false;
        return;
    };

    let scene_model = scene_model_matrix(config.origin, config.base_altitude);
    let clip_from_scene = host_matrix * scene_model;
    let frame = state.frame + 1;

    *state = CameraState {
        host_matrix,
        scene_model,
        clip_from_scene,
        frame,
        synced: true,
    };

    for mut camera in &mut cameras {
        *camera = OverlayCamera {
            clip_from_scene,
            frame,
        };
    }
}

/// Ask the host to schedule its next frame. The engine owns no timer.
pub fn request_host_repaint(
    host: Option<NonSend<HostHandle>>,
    config: Res<OverlayConfig>,
    scheduler: Res<AnimationScheduler>,
    index: Res<MeshIndex>,
    mut last_revision: Local<u64>,
) {
    let scene_changed = index.revision() != *last_revision;
    *last_revision = index.revision();

    let Some(host) = host else {
        return;
    };
    if config.continuous_repaint || !scheduler.is_idle() || scene_changed {
        host.0.trigger_repaint();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::geo::transform::project_point_to_local_plane;

    #[test]
    fn scene_model_places_local_points_on_mercator() {
        let origin = LngLat::new(-0.1276, 51.5072);
        let model = scene_model_matrix(origin, 0.0);

        let target = origin.offset_meters(30.0, -40.0);
        let local = project_point_to_local_plane(target, origin);
        let mercator = model.transform_point3(bevy::math::DVec3::new(local.x, 0.0, local.y));
        let expected = lng_lat_to_mercator(target);

        assert!((mercator.x - expected.x).abs() < 1e-15);
        assert!((mercator.y - expected.y).abs() < 1e-15);
        assert_eq!(mercator.z, 0.0);
    }

    #[test]
    fn altitude_maps_to_mercator_z() {
        let origin = LngLat::new(13.4, 52.5);
        let model = scene_model_matrix(origin, 5.0);
        let up = model.transform_point3(bevy::math::DVec3::new(0.0, 10.0, 0.0));
        let expected = 15.0 * mercator_units_per_meter(origin.lat);
        assert!((up.z - expected).abs() < 1e-18);
    }

    #[test]
    fn missing_host_matrix_marks_tick_unsynced() {
        let mut app = App::new();
        app.insert_resource(OverlayConfig::default())
            .init_resource::<HostFrame>()
            .init_resource::<CameraState>()
            .add_systems(Startup, spawn_overlay_camera)
            .add_systems(Update, sync_overlay_camera);

        let host = DMat4::from_scale(bevy::math::DVec3::splat(2.0));
        app.world_mut().resource_mut::<HostFrame>().submit(host);
        app.update();
        let state = app.world().resource::<CameraState>().clone();
        assert!(state.synced);
        assert_eq!(state.clip_from_scene, host * state.scene_model);

        let mut cameras = app.world_mut().query::<&OverlayCamera>();
        let camera = cameras.single(app.world()).unwrap();
        assert_eq!(camera.clip_from_scene, state.clip_from_scene);

        app.update();
        let state = app.world().resource::<CameraState>();
        assert!(!state.synced);
        assert_eq!(state.frame, 1);
    }
}
