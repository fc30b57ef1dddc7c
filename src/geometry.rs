//! Built-in primitive meshes.
//!
//! All primitives are centred on the origin and fit in a unit box, so a
//! model's `size` is its extent in world units. Vertices are interleaved as
//! `position.xyz`, `normal.xyz`, `texcoord.uv`.

use std::f32::consts::PI;

use bytemuck::{Pod, Zeroable};

use crate::scene::PrimitiveKind;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub texcoord: [f32; 2],
}

impl Vertex {
    const fn new(position: [f32; 3], normal: [f32; 3], texcoord: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            texcoord,
        }
    }
}

/// CPU-side vertex and index data for one primitive.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u16>,
}

impl MeshData {
    /// Number of indices consumed by an indexed triangle draw.
    pub fn face_index_count(&self) -> u32 {
        self.indices.len() as u32
    }
}

/// Supplies vertex and index data for each primitive kind.
pub trait GeometryProvider {
    fn build(&self, kind: PrimitiveKind) -> MeshData;
}

/// Plane, cube and UV-sphere generator.
#[derive(Clone, Copy, Debug)]
pub struct BuiltinGeometry {
    pub sphere_slices: u16,
    pub sphere_stacks: u16,
}

impl Default for BuiltinGeometry {
    fn default() -> Self {
        Self {
            sphere_slices: 32,
            sphere_stacks: 16,
        }
    }
}

impl GeometryProvider for BuiltinGeometry {
    fn build(&self, kind: PrimitiveKind) -> MeshData {
        match kind {
            PrimitiveKind::Plane => plane(),
            PrimitiveKind::Cube => cube(),
            PrimitiveKind::Sphere => sphere(self.sphere_slices, self.sphere_stacks),
        }
    }
}

/// Unit square in the XZ plane facing +Y.
pub fn plane() -> MeshData {
    let normal = [0.0, 1.0, 0.0];
    MeshData {
        vertices: vec![
            Vertex::new([-0.5, 0.0, 0.5], normal, [0.0, 0.0]),
            Vertex::new([0.5, 0.0, 0.5], normal, [1.0, 0.0]),
            Vertex::new([0.5, 0.0, -0.5], normal, [1.0, 1.0]),
            Vertex::new([-0.5, 0.0, -0.5], normal, [0.0, 1.0]),
        ],
        indices: vec![0, 1, 2, 0, 2, 3],
    }
}

// Outward normal, then the four corners counter-clockwise seen from outside.
const CUBE_FACES: [([f32; 3], [[f32; 3]; 4]); 6] = [
    (
        [0.0, 0.0, 1.0],
        [[-0.5, -0.5, 0.5], [0.5, -0.5, 0.5], [0.5, 0.5, 0.5], [-0.5, 0.5, 0.5]],
    ),
    (
        [0.0, 0.0, -1.0],
        [[0.5, -0.5, -0.5], [-0.5, -0.5, -0.5], [-0.5, 0.5, -0.5], [0.5, 0.5, -0.5]],
    ),
    (
        [-1.0, 0.0, 0.0],
        [[-0.5, -0.5, -0.5], [-0.5, -0.5, 0.5], [-0.5, 0.5, 0.5], [-0.5, 0.5, -0.5]],
    ),
    (
        [1.0, 0.0, 0.0],
        [[0.5, -0.5, 0.5], [0.5, -0.5, -0.5], [0.5, 0.5, -0.5], [0.5, 0.5, 0.5]],
    ),
    (
        [0.0, -1.0, 0.0],
        [[-0.5, -0.5, -0.5], [0.5, -0.5, -0.5], [0.5, -0.5, 0.5], [-0.5, -0.5, 0.5]],
    ),
    (
        [0.0, 1.0, 0.0],
        [[-0.5, 0.5, 0.5], [0.5, 0.5, 0.5], [0.5, 0.5, -0.5], [-0.5, 0.5, -0.5]],
    ),
];

const QUAD_TEXCOORDS: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

/// Unit cube with per-face normals and texture coordinates.
pub fn cube() -> MeshData {
    let mut mesh = MeshData::default();
    for (normal, corners) in CUBE_FACES {
        let base = mesh.vertices.len() as u16;
        for (corner, texcoord) in corners.into_iter().zip(QUAD_TEXCOORDS) {
            mesh.vertices.push(Vertex::new(corner, normal, texcoord));
        }
        mesh.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    mesh
}

/// UV sphere of diameter 1.
pub fn sphere(slices: u16, stacks: u16) -> MeshData {
    let slices = slices.max(3);
    let stacks = stacks.max(2);
    let radius = 0.5;
    let mut mesh = MeshData::default();

    for stack in 0..=stacks {
        let v = f32::from(stack) / f32::from(stacks);
        let phi = v * PI;
        for slice in 0..=slices {
            let u = f32::from(slice) / f32::from(slices);
            let theta = u * 2.0 * PI;
            let normal = [phi.sin() * theta.cos(), phi.cos(), -phi.sin() * theta.sin()];
            let position = normal.map(|c| c * radius);
            mesh.vertices
                .push(Vertex::new(position, normal, [u, 1.0 - v]));
        }
    }

    let row = slices + 1;
    for stack in 0..stacks {
        for slice in 0..slices {
            let top = stack * row + slice;
            let bottom = top + row;
            if stack != 0 {
                mesh.indices.extend_from_slice(&[top, bottom, top + 1]);
            }
            if stack != stacks - 1 {
                mesh.indices.extend_from_slice(&[top + 1, bottom, bottom + 1]);
            }
        }
    }
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_has_six_quads() {
        let mesh = cube();
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.face_index_count(), 36);
    }

    #[test]
    fn cube_faces_wind_outward() {
        let mesh = cube();
        for triangle in mesh.indices.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|i| glam::Vec3::from(mesh.vertices[triangle[i] as usize].position));
            let face_normal = (b - a).cross(c - a).normalize();
            let stored = glam::Vec3::from(mesh.vertices[triangle[0] as usize].normal);
            assert!(face_normal.dot(stored) > 0.99, "triangle {triangle:?} faces inward");
        }
    }

    #[test]
    fn sphere_vertices_sit_on_the_surface() {
        let mesh = sphere(16, 8);
        for vertex in &mesh.vertices {
            let length = glam::Vec3::from(vertex.position).length();
            assert!((length - 0.5).abs() < 1e-5);
        }
        // Poles contribute one triangle per slice, every other stack two.
        assert_eq!(mesh.face_index_count(), 3 * (2 * 16 * 8 - 2 * 16));
    }

    #[test]
    fn indices_stay_in_range() {
        let geometry = BuiltinGeometry::default();
        for kind in PrimitiveKind::ALL {
            let mesh = geometry.build(kind);
            assert!(mesh
                .indices
                .iter()
                .all(|&index| (index as usize) < mesh.vertices.len()));
        }
    }
}
