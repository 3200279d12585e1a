use bevy::math::DVec2;
use bevy::prelude::*;
use bevy::render::mesh::{Indices, PrimitiveTopology};
use bevy::render::render_asset::RenderAssetUsages;
use geo::{Intersects, Line};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtrusionError {
    #[error("footprint has {0} vertices, at least 3 are required")]
    TooFewVertices(usize),
    #[error("footprint contains a non-finite vertex")]
    NonFinite,
    #[error("footprint edges {0} and {1} intersect")]
    SelfIntersecting(usize, usize),
    #[error("footprint has no area")]
    ZeroArea,
    #[error("triangulation failed: {0}")]
    Triangulation(String),
}

fn signed_area(points: &[DVec2]) -> f64 {
    let n = points.len();
    (0..n)
        .map(|i| {
            let (a, b) = (points[i], points[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum::<f64>()
        / 2.0
}

/// Index pair of the first two non-adjacent edges that cross, if any.
pub fn find_self_intersection(points: &[DVec2]) -> Option<(usize, usize)> {
    let n = points.len();
    let edge = |i: usize| {
        let (a, b) = (points[i], points[(i + 1) % n]);
        Line::new((a.x, a.y), (b.x, b.y))
    };

    for i in 0..n {
        for j in (i + 2)..n {
            // First and last edges share the closing vertex.
            if i == 0 && j == n - 1 {
                continue;
            }
            if edge(i).intersects(&edge(j)) {
                return Some((i, j));
            }
        }
    }
    None
}

/// Build a prism of unit height over `points` (open ring, scene units,
/// relative to the mesh origin).
///
/// Plane coordinates map to x (east) and z (south); the floor sits at
/// `y = 0` and the roof at `y = 1`, so the visible height is set entirely
/// by the entity's `Transform::scale.y`.
pub fn extrude_unit_prism(points: &[DVec2]) -> Result<Mesh, ExtrusionError> {
    if points.len() < 3 {
        return Err(ExtrusionError::TooFewVertices(points.len()));
    }
    if points.iter().any(|p| !p.is_finite()) {
        return Err(ExtrusionError::NonFinite);
    }
    let area = signed_area(points);
    if area.abs() <= f64::EPSILON {
        return Err(ExtrusionError::ZeroArea);
    }
    if let Some((a, b)) = find_self_intersection(points) {
        return Err(ExtrusionError::SelfIntersecting(a, b));
    }

    let flat: Vec<f64> = points.iter().flat_map(|p| [p.x, p.y]).collect();
    let triangles = earcutr::earcut(&flat, &[], 2).map_err(|e| ExtrusionError::Triangulation(format!("{e:?}")))?;
    if triangles.len() < 3 || triangles.len() % 3 != 0 {
        return Err(ExtrusionError::Triangulation(format!(
            "{} indices produced for {} vertices",
            triangles.len(),
            points.len()
        )));
    }

    let n = points.len();
    let mut positions: Vec<[f32; 3]> = Vec::with_capacity(n * 6);
    let mut normals: Vec<[f32; 3]> = Vec::with_capacity(n * 6);
    let mut indices: Vec<u32> = Vec::with_capacity(triangles.len() * 2 + n * 6);

    // Roof and floor share the cap triangulation with opposite winding.
    for (y, normal) in [(1.0, [0.0, 1.0, 0.0]), (0.0, [0.0, -1.0, 0.0])] {
        let offset = positions.len() as u32;
        for p in points {
            positions.push([p.x as f32, y, p.y as f32]);
            normals.push(normal);
        }
        for tri in triangles.chunks_exact(3) {
            let (a, b, c) = (tri[0] as u32, tri[1] as u32, tri[2] as u32);
            if y > 0.5 {
                indices.extend([offset + a, offset + b, offset + c]);
            } else {
                indices.extend([offset + a, offset + c, offset + b]);
            }
        }
    }

    // Walls get their own vertices so every face keeps a flat normal.
    let outward = area.signum();
    for i in 0..n {
        let (a, b) = (points[i], points[(i + 1) % n]);
        let d = b - a;
        let normal = Vec3::new((d.y * outward) as f32, 0.0, (-d.x * outward) as f32).normalize_or_zero();

        let base = positions.len() as u32;
        for (p, y) in [(a, 0.0), (b, 0.0), (b, 1.0), (a, 1.0)] {
            positions.push([p.x as f32, y, p.y as f32]);
            normals.push(normal.to_array());
        }
        indices.extend([base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default());
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
    mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, normals);
    mesh.insert_indices(Indices::U32(indices));
    Ok(mesh)
}

/// Unit-height cone standing on the origin, used for tree crowns.
pub fn unit_cone(radius: f32, segments: u32) -> Result<Mesh, ExtrusionError> {
    if segments < 3 {
        return Err(ExtrusionError::TooFewVertices(segments as usize));
    }
    if !radius.is_finite() || radius <= 0.0 {
        return Err(ExtrusionError::ZeroArea);
    }

    let mut positions: Vec<[f32; 3]> = Vec::new();
    let mut normals: Vec<[f32; 3]> = Vec::new();
    let mut indices: Vec<u32> = Vec::new();
    let step = std::f32::consts::TAU / segments as f32;
    let rim = |i: u32| {
        let angle = i as f32 * step;
        Vec3::new(radius * angle.sin(), 0.0, radius * angle.cos())
    };

    // Side faces, one triangle each.
    let apex = Vec3::Y;
    for i in 0..segments {
        let (a, b) = (rim(i), rim(i + 1));
        let normal = (b - a).cross(apex - a).normalize_or_zero();
        let base = positions.len() as u32;
        for v in [a, b, apex] {
            positions.push(v.to_array());
            normals.push(normal.to_array());
        }
        indices.extend([base, base + 1, base + 2]);
    }

    // Base cap as a fan around its center.
    let center = positions.len() as u32;
    positions.push([0.0, 0.0, 0.0]);
    normals.push([0.0, -1.0, 0.0]);
    for i in 0..segments {
        positions.push(rim(i).to_array());
        normals.push([0.0, -1.0, 0.0]);
    }
    for i in 0..segments {
        let a = center + 1 + i;
        let b = center + 1 + (i + 1) % segments;
        indices.extend([center, b, a]);
    }

    let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default());
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
    mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, normals);
    mesh.insert_indices(Indices::U32(indices));
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(half: f64) -> Vec<DVec2> {
        vec![
            DVec2::new(-half, -half),
            DVec2::new(half, -half),
            DVec2::new(half, half),
            DVec2::new(-half, half),
        ]
    }

    fn positions(mesh: &Mesh) -> Vec<[f32; 3]> {
        mesh.attribute(Mesh::ATTRIBUTE_POSITION)
            .and_then(|values| values.as_float3())
            .map(|values| values.to_vec())
            .unwrap_or_default()
    }

    #[test]
    fn prism_spans_unit_height() {
        let mesh = extrude_unit_prism(&square(5.0)).unwrap();
        let positions = positions(&mesh);
        let (min_y, max_y) = positions
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), p| (lo.min(p[1]), hi.max(p[1])));
        assert_eq!((min_y, max_y), (0.0, 1.0));

        // Two caps of two triangles each plus four walls of two triangles.
        let Some(Indices::U32(indices)) = mesh.indices() else {
            panic!("expected u32 indices");
        };
        assert_eq!(indices.len(), (2 * 2 + 4 * 2) * 3);
    }

    #[test]
    fn wall_normals_point_outward_for_either_winding() {
        for ring in [square(5.0), square(5.0).into_iter().rev().collect()] {
            let mesh = extrude_unit_prism(&ring).unwrap();
            let positions = positions(&mesh);
            let normals = mesh
                .attribute(Mesh::ATTRIBUTE_NORMAL)
                .and_then(|values| values.as_float3())
                .unwrap()
                .to_vec();
            // Wall vertices follow the two cap rings.
            for (p, n) in positions.iter().zip(&normals).skip(8) {
                let outward = Vec3::new(p[0], 0.0, p[2]).dot(Vec3::from_array(*n));
                assert!(outward > 0.0, "inward normal {n:?} at {p:?}");
            }
        }
    }

    #[test]
    fn bow_tie_is_rejected() {
        let bow_tie = vec![
            DVec2::new(0.0, 0.0),
            DVec2::new(10.0, 10.0),
            DVec2::new(10.0, 0.0),
            DVec2::new(0.0, 10.0),
        ];
        assert!(matches!(
            extrude_unit_prism(&bow_tie),
            Err(ExtrusionError::SelfIntersecting(_, _))
        ));
    }

    #[test]
    fn degenerate_footprints_are_rejected() {
        assert_eq!(
            extrude_unit_prism(&square(5.0)[..2]).unwrap_err(),
            ExtrusionError::TooFewVertices(2)
        );
        let line = vec![DVec2::ZERO, DVec2::new(1.0, 0.0), DVec2::new(2.0, 0.0)];
        assert_eq!(extrude_unit_prism(&line).unwrap_err(), ExtrusionError::ZeroArea);
    }

    #[test]
    fn cone_has_apex_at_unit_height() {
        let mesh = unit_cone(2.0, 8).unwrap();
        let positions = positions(&mesh);
        assert!(positions.iter().any(|p| *p == [0.0, 1.0, 0.0]));
        assert!(positions.iter().all(|p| p[1] <= 1.0 && p[1] >= 0.0));
        assert!(unit_cone(2.0, 2).is_err());
    }
}
