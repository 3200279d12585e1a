use bevy::prelude::*;
use bevy::render::mesh::{Indices, VertexAttributeValues};
use serde::Serialize;

use crate::engine::camera::sync::CameraState;
use crate::engine::features::model::{FeatureId, FeatureKind};
use crate::engine::mesh::lifecycle::{FeatureMesh, MeshIndex};

/// One mesh to draw this frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawItem {
    pub feature_id: FeatureId,
    pub kind: FeatureKind,
    /// Lets the host cache vertex buffers until the geometry is rebuilt.
    pub geometry_revision: u32,
    /// Column-major scene-from-mesh matrix.
    pub model: [f32; 16],
    /// Linear RGBA.
    pub color: [f32; 4],
    pub emissive: [f32; 3],
}

/// Draw list for the host's GL context, rebuilt every tick.
#[derive(Resource, Debug, Clone, Default, Serialize)]
pub struct FrameSnapshot {
    pub frame: u64,
    /// False when the tick had no host matrix; the host must skip drawing.
    pub rendered: bool,
    /// Column-major clip-from-scene matrix for this frame.
    pub clip_from_scene: [f32; 16],
    pub items: Vec<DrawItem>,
}

/// Vertex data of one overlay mesh in scene-local coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeshBuffers {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

impl MeshBuffers {
    pub fn from_mesh(mesh: &Mesh) -> Option<Self> {
        let Some(VertexAttributeValues::Float32x3(positions)) = mesh.attribute(Mesh::ATTRIBUTE_POSITION) else {
            return None;
        };
        let normals = match mesh.attribute(Mesh::ATTRIBUTE_NORMAL) {
            Some(VertexAttributeValues::Float32x3(normals)) => normals.clone(),
            _ => Vec::new(),
        };
        let indices = match mesh.indices() {
            Some(Indices::U32(indices)) => indices.clone(),
            Some(Indices::U16(indices)) => indices.iter().map(|i| *i as u32).collect(),
            None => (0..positions.len() as u32).collect(),
        };
        Some(Self {
            positions: positions.clone(),
            normals,
            indices,
        })
    }
}

/// Build the frame's draw list from the camera state and the mesh index.
pub fn extract_frame_snapshot(
    camera: Res<CameraState>,
    index: Res<MeshIndex>,
    materials: Res<Assets<StandardMaterial>>,
    transforms: Query<&Transform, With<FeatureMesh>>,
    mut snapshot: ResMut<FrameSnapshot>,
) {
    if !camera.synced {
        snapshot.frame = camera.frame;
        snapshot.rendered = false;
        snapshot.items.clear();
        return;
    }

    let mut items: Vec<DrawItem> = index
        .iter()
        .filter_map(|entry| {
            let transform = transforms.get(entry.entity).ok()?;
            let material = materials.get(&entry.material)?;
            let (color, emissive) = (material.base_color.to_linear(), material.emissive);
            Some(DrawItem {
                feature_id: entry.feature_id.clone(),
                kind: entry.kind,
                geometry_revision: entry.geometry_revision,
                model: transform.compute_matrix().to_cols_array(),
                color: [color.red, color.green, color.blue, color.alpha],
                emissive: [emissive.red, emissive.green, emissive.blue],
            })
        })
        .collect();
    items.sort_by(|a, b| a.feature_id.cmp(&b.feature_id));

    *snapshot = FrameSnapshot {
        frame: camera.frame,
        rendered: true,
        clip_from_scene: camera.clip_from_scene.as_mat4().to_cols_array(),
        items,
    };
    debug!("Extracted {} draw item(s) for frame {}", snapshot.items.len(), snapshot.frame);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mesh::extrusion::unit_cone;

    #[test]
    fn buffers_mirror_mesh_attributes() {
        let mesh = unit_cone(1.5, 6).unwrap();
        let buffers = MeshBuffers::from_mesh(&mesh).unwrap();
        assert_eq!(buffers.positions.len(), buffers.normals.len());
        assert_eq!(buffers.indices.len(), 6 * 3 * 2);
        assert!(buffers.indices.iter().all(|i| (*i as usize) < buffers.positions.len()));
    }
}
