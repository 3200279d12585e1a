//! One mesh per live feature, keyed by feature id.
//!
//! `MeshIndex` is the only owner of overlay meshes. `sync_meshes_with_features`
//! reacts to store change events by building, animating, rebuilding or
//! disposing entries; nothing else spawns or despawns `FeatureMesh` entities.
//!
//! Geometry is baked at unit height. The visible height is the entity's
//! vertical scale, so height changes and the rise-in animation never touch
//! the vertex buffers.

use std::collections::HashMap;

use bevy::prelude::*;
use constants::animation::RISE_START_SCALE;
use constants::render_settings::TREE_CONE_SEGMENTS;

use super::extrusion::{extrude_unit_prism, unit_cone};
use crate::config::OverlayConfig;
use crate::engine::animation::{AnimationKind, AnimationScheduler};
use crate::engine::features::model::{FeatureGeometry, FeatureId, FeatureKind, GeographicFeature};
use crate::engine::features::store::{FeatureChange, FeatureChanged, FeatureStore};
use crate::engine::geo::footprint::without_repeated_vertices;
use crate::engine::geo::transform::{
    project_point_to_local_plane, project_polygon_to_local_plane, region_scale_factor,
};
use crate::engine::notifications::Notifications;
use crate::error::OverlayError;
use crate::tools::interaction::InteractionState;

/// Vertical scale floor keeping zero-height features invertible.
const MIN_VERTICAL_SCALE: f32 = 1e-6;

/// Marker for entities owned by the mesh lifecycle.
#[derive(Component, Debug, Clone)]
pub struct FeatureMesh {
    pub feature_id: FeatureId,
    pub kind: FeatureKind,
}

#[derive(Debug, Clone)]
pub struct MeshEntry {
    pub feature_id: FeatureId,
    pub kind: FeatureKind,
    pub entity: Entity,
    pub geometry: Handle<Mesh>,
    pub material: Handle<StandardMaterial>,
    /// Footprint centroid in scene units, floor raised by `base`.
    pub anchor: Vec3,
    /// Animated extrusion height in meters.
    pub current_height: f32,
    /// Animated rise-in multiplier, `RISE_START_SCALE..=1`.
    pub rise_scale: f32,
    /// Animated clockwise yaw in degrees added on top of the baked footprint.
    pub rotation_offset: f32,
    /// Scene units per meter at the footprint centroid.
    pub region_scale: f32,
    /// Bumped every time the geometry is rebuilt.
    pub geometry_revision: u32,
}

impl MeshEntry {
    /// Vertical scale of the unit-height geometry.
    pub fn current_scale(&self) -> f32 {
        (self.current_height * self.region_scale * self.rise_scale).max(MIN_VERTICAL_SCALE)
    }

    pub fn transform(&self) -> Transform {
        Transform {
            translation: self.anchor,
            rotation: Quat::from_rotation_y(-self.rotation_offset.to_radians()),
            scale: Vec3::new(1.0, self.current_scale(), 1.0),
        }
    }
}

#[derive(Resource, Debug, Default)]
pub struct MeshIndex {
    entries: HashMap<FeatureId, MeshEntry>,
    revision: u64,
}

impl MeshIndex {
    pub fn get(&self, id: &FeatureId) -> Option<&MeshEntry> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &FeatureId) -> Option<&mut MeshEntry> {
        self.entries.get_mut(id)
    }

    pub fn contains(&self, id: &FeatureId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MeshEntry> {
        self.entries.values()
    }

    /// Increments whenever an entry is added, rebuilt, restyled or removed.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.revision += 1;
    }
}

/// Geometry and placement computed for a feature before it is spawned.
struct BuiltMesh {
    mesh: Mesh,
    anchor: Vec3,
    region_scale: f32,
}

fn build_failure(feature: &GeographicFeature, reason: impl ToString) -> OverlayError {
    OverlayError::MeshBuildFailure {
        id: feature.id.clone(),
        reason: reason.to_string(),
    }
}

fn build_feature_mesh(feature: &GeographicFeature, config: &OverlayConfig) -> Result<BuiltMesh, OverlayError> {
    let base = feature.properties.base;
    match &feature.geometry {
        FeatureGeometry::Polygon(ring) => {
            let local = project_polygon_to_local_plane(&without_repeated_vertices(ring), config.origin);
            let relative: Vec<_> = local.points.iter().map(|p| *p - local.centroid_local).collect();
            let mesh = extrude_unit_prism(&relative).map_err(|e| build_failure(feature, e))?;
            let region_scale = local.region_scale as f32;
            Ok(BuiltMesh {
                mesh,
                anchor: Vec3::new(
                    local.centroid_local.x as f32,
                    (base * local.region_scale) as f32,
                    local.centroid_local.y as f32,
                ),
                region_scale,
            })
        }
        FeatureGeometry::Point(point) => {
            let region_scale = region_scale_factor(point.lat, config.origin);
            let size = feature.properties.size.unwrap_or(config.defaults.tree_size);
            let radius = (size / 2.0 * region_scale) as f32;
            let mesh = unit_cone(radius, TREE_CONE_SEGMENTS).map_err(|e| build_failure(feature, e))?;
            let local = project_point_to_local_plane(*point, config.origin);
            Ok(BuiltMesh {
                mesh,
                anchor: Vec3::new(local.x as f32, (base * region_scale) as f32, local.y as f32),
                region_scale: region_scale as f32,
            })
        }
    }
}

fn parse_color(feature: &GeographicFeature) -> Result<Color, OverlayError> {
    Srgba::hex(&feature.properties.color)
        .map(Color::Srgba)
        .map_err(|e| build_failure(feature, format!("invalid color {:?}: {e}", feature.properties.color)))
}

fn feature_material(color: Color) -> StandardMaterial {
    StandardMaterial {
        base_color: color,
        perceptual_roughness: 0.85,
        // The scene model matrix mirrors an axis, so both faces must draw.
        double_sided: true,
        cull_mode: None,
        ..default()
    }
}

fn dispose(
    commands: &mut Commands,
    entry: MeshEntry,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
) {
    commands.entity(entry.entity).despawn();
    meshes.remove(&entry.geometry);
    materials.remove(&entry.material);
}

/// Asset stores and bookkeeping the lifecycle mutates while reacting to changes.
struct Lifecycle<'a, 'w, 's> {
    commands: &'a mut Commands<'w, 's>,
    index: &'a mut MeshIndex,
    scheduler: &'a mut AnimationScheduler,
    meshes: &'a mut Assets<Mesh>,
    materials: &'a mut Assets<StandardMaterial>,
    notifications: &'a mut Notifications,
    config: &'a OverlayConfig,
    now: std::time::Duration,
}

impl Lifecycle<'_, '_, '_> {
    fn fail(&mut self, error: OverlayError) {
        warn!("{}", error);
        self.notifications.report(&error);
    }

    fn remove(&mut self, id: &FeatureId) {
        self.scheduler.cancel_feature(id);
        if let Some(entry) = self.index.entries.remove(id) {
            dispose(self.commands, entry, self.meshes, self.materials);
            self.index.touch();
        }
    }

    /// Build a fresh entry for `feature`, replacing any existing one, and
    /// start its rise-in.
    fn create(&mut self, feature: &GeographicFeature) {
        self.remove(&feature.id);

        let built = match build_feature_mesh(feature, self.config) {
            Ok(built) => built,
            Err(error) => return self.fail(error),
        };
        let color = match parse_color(feature) {
            Ok(color) => color,
            Err(error) => return self.fail(error),
        };

        let geometry = self.meshes.add(built.mesh);
        let material = self.materials.add(feature_material(color));
        let mut entry = MeshEntry {
            feature_id: feature.id.clone(),
            kind: feature.kind,
            entity: Entity::PLACEHOLDER,
            geometry: geometry.clone(),
            material: material.clone(),
            anchor: built.anchor,
            current_height: feature.properties.height as f32,
            rise_scale: RISE_START_SCALE,
            rotation_offset: 0.0,
            region_scale: built.region_scale,
            geometry_revision: 0,
        };
        entry.entity = self
            .commands
            .spawn((
                Mesh3d(geometry),
                MeshMaterial3d(material),
                entry.transform(),
                FeatureMesh {
                    feature_id: feature.id.clone(),
                    kind: feature.kind,
                },
                Name::new(format!("{} {}", feature.kind.as_str(), feature.id)),
            ))
            .id();

        self.scheduler.start(
            feature.id.clone(),
            AnimationKind::Rise,
            RISE_START_SCALE,
            1.0,
            self.config.animation.rise(),
            self.now,
        );
        self.index.entries.insert(feature.id.clone(), entry);
        self.index.touch();
        debug!("Built mesh for {} {}", feature.kind.as_str(), feature.id);
    }

    fn update(&mut self, feature: &GeographicFeature, previous: &GeographicFeature) {
        if !self.index.contains(&feature.id) {
            // Earlier build failed; try again with the new revision.
            return self.create(feature);
        }

        let diff = feature.diff(previous);
        if diff.needs_rebuild() {
            let built = match build_feature_mesh(feature, self.config) {
                Ok(built) => built,
                Err(error) => return self.fail(error),
            };
            let geometry = self.meshes.add(built.mesh);
            let Some(entry) = self.index.entries.get_mut(&feature.id) else {
                return;
            };
            let stale = std::mem::replace(&mut entry.geometry, geometry.clone());
            self.meshes.remove(&stale);
            entry.anchor = built.anchor;
            entry.region_scale = built.region_scale;
            entry.geometry_revision += 1;
            self.commands.entity(entry.entity).insert(Mesh3d(geometry));

            if diff.rotation_delta != 0.0 {
                let id = &feature.id;
                let current = self
                    .scheduler
                    .current_value(id, AnimationKind::Rotation, self.now)
                    .unwrap_or(entry.rotation_offset);
                let from = current - diff.rotation_delta as f32;
                self.scheduler.cancel(id, AnimationKind::Rotation);
                entry.rotation_offset = from;
                self.scheduler.start(
                    id.clone(),
                    AnimationKind::Rotation,
                    from,
                    0.0,
                    self.config.animation.rotation(),
                    self.now,
                );
            }
        } else if diff.base {
            if let Some(entry) = self.index.entries.get_mut(&feature.id) {
                entry.anchor.y = (feature.properties.base * entry.region_scale as f64) as f32;
            }
        }

        if diff.height {
            let from = self
                .index
                .get(&feature.id)
                .map(|entry| entry.current_height)
                .unwrap_or(previous.properties.height as f32);
            self.scheduler.start(
                feature.id.clone(),
                AnimationKind::Height,
                from,
                feature.properties.height as f32,
                self.config.animation.height(),
                self.now,
            );
        }

        if diff.color {
            match parse_color(feature) {
                Ok(color) => {
                    if let Some(material) = self
                        .index
                        .get(&feature.id)
                        .and_then(|entry| self.materials.get_mut(&entry.material))
                    {
                        material.base_color = color;
                    }
                }
                Err(error) => self.fail(error),
            }
        }
        self.index.touch();
    }
}

/// React to feature store changes: create, update or dispose mesh entries.
#[allow(clippy::too_many_arguments)]
pub fn sync_meshes_with_features(
    mut commands: Commands,
    mut events: EventReader<FeatureChanged>,
    store: Res<FeatureStore>,
    config: Res<OverlayConfig>,
    time: Res<Time>,
    mut index: ResMut<MeshIndex>,
    mut scheduler: ResMut<AnimationScheduler>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut notifications: ResMut<Notifications>,
) {
    let mut lifecycle = Lifecycle {
        commands: &mut commands,
        index: &mut index,
        scheduler: &mut scheduler,
        meshes: &mut meshes,
        materials: &mut materials,
        notifications: &mut notifications,
        config: &config,
        now: time.elapsed(),
    };

    for event in events.read() {
        match &event.change {
            FeatureChange::Removed { .. } => lifecycle.remove(&event.id),
            FeatureChange::Created => {
                // A later event in this batch may already have removed it.
                if let Some(feature) = store.get(&event.id) {
                    lifecycle.create(feature);
                }
            }
            FeatureChange::Updated { previous } => {
                if let Some(feature) = store.get(&event.id) {
                    lifecycle.update(feature, previous);
                }
            }
        }
    }
}

/// Give the selected feature's material the configured emissive tint.
pub fn apply_selection_highlight(
    interaction: Res<InteractionState>,
    config: Res<OverlayConfig>,
    index: Res<MeshIndex>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let [r, g, b] = config.highlight_color;
    let highlight = LinearRgba::rgb(r, g, b);

    for entry in index.iter() {
        let target = if interaction.selected.as_ref() == Some(&entry.feature_id) {
            highlight
        } else {
            LinearRgba::BLACK
        };
        let needs_change = materials
            .get(&entry.material)
            .is_some_and(|material| material.emissive != target);
        if needs_change {
            if let Some(material) = materials.get_mut(&entry.material) {
                material.emissive = target;
            }
        }
    }
}

/// Copy animated entry values into entity transforms.
pub fn apply_mesh_transforms(index: Res<MeshIndex>, mut query: Query<&mut Transform, With<FeatureMesh>>) {
    for entry in index.iter() {
        let Ok(mut transform) = query.get_mut(entry.entity) else {
            continue;
        };
        let next = entry.transform();
        if *transform != next {
            *transform = next;
        }
    }
}
