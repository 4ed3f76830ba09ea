use glam::Vec3;

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl MeshVertex {
    pub fn new(position: Vec3, normal: Vec3) -> Self {
        Self { position: position.to_array(), normal: normal.to_array() }
    }

    pub fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: 12,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

#[derive(Clone, Debug)]
pub struct Mesh {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
    pub bounds: MeshBounds,
}

#[derive(Clone, Copy, Debug)]
pub struct MeshBounds {
    pub min: Vec3,
    pub max: Vec3,
    pub center: Vec3,
    pub radius: f32,
}

impl MeshBounds {
    pub fn from_vertices(vertices: &[MeshVertex]) -> Self {
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for vertex in vertices {
            let p = Vec3::from_array(vertex.position);
            min = min.min(p);
            max = max.max(p);
        }
        if vertices.is_empty() {
            min = Vec3::ZERO;
            max = Vec3::ZERO;
        }
        let center = (min + max) * 0.5;
        let radius = (max - center).length();
        Self { min, max, center, radius }
    }
}

impl Mesh {
    pub fn new(vertices: Vec<MeshVertex>, indices: Vec<u32>) -> Self {
        let bounds = MeshBounds::from_vertices(&vertices);
        Self { vertices, indices, bounds }
    }

    /// Axis-aligned box centred on the origin.
    pub fn cuboid(width: f32, height: f32, depth: f32) -> Self {
        let hx = width * 0.5;
        let hy = height * 0.5;
        let hz = depth * 0.5;
        let corners = [
            Vec3::new(-hx, -hy, -hz),
            Vec3::new(hx, -hy, -hz),
            Vec3::new(hx, hy, -hz),
            Vec3::new(-hx, hy, -hz),
            Vec3::new(-hx, -hy, hz),
            Vec3::new(hx, -hy, hz),
            Vec3::new(hx, hy, hz),
            Vec3::new(-hx, hy, hz),
        ];
        let normals = [
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, -1.0, 0.0),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut write_face = |ids: [usize; 4], normal: Vec3| {
            for &id in ids.iter() {
                vertices.push(MeshVertex::new(corners[id], normal));
            }
        };
        write_face([0, 3, 2, 1], normals[0]); // back
        write_face([4, 5, 6, 7], normals[1]); // front
        write_face([0, 4, 7, 3], normals[2]); // left
        write_face([1, 2, 6, 5], normals[3]); // right
        write_face([3, 7, 6, 2], normals[4]); // top
        write_face([0, 1, 5, 4], normals[5]); // bottom

        let mut indices = Vec::with_capacity(36);
        for face in 0..6u32 {
            let base = face * 4;
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        Self::new(vertices, indices)
    }

    /// Flat quad in the XZ plane facing +Y.
    pub fn plane(width: f32, depth: f32) -> Self {
        let hx = width * 0.5;
        let hz = depth * 0.5;
        let up = Vec3::Y;
        let vertices = vec![
            MeshVertex::new(Vec3::new(-hx, 0.0, -hz), up),
            MeshVertex::new(Vec3::new(-hx, 0.0, hz), up),
            MeshVertex::new(Vec3::new(hx, 0.0, hz), up),
            MeshVertex::new(Vec3::new(hx, 0.0, -hz), up),
        ];
        let indices = vec![0, 1, 2, 0, 2, 3];
        Self::new(vertices, indices)
    }

    /// Upright cylinder centred on the origin, capped at both ends.
    pub fn cylinder(radius: f32, height: f32, segments: u32) -> Self {
        let segments = segments.max(3);
        let hy = height * 0.5;
        let mut vertices = Vec::new();
        let mut indices = Vec::new();

        for i in 0..=segments {
            let angle = i as f32 / segments as f32 * std::f32::consts::TAU;
            let (sin, cos) = angle.sin_cos();
            let normal = Vec3::new(cos, 0.0, sin);
            vertices.push(MeshVertex::new(Vec3::new(cos * radius, -hy, sin * radius), normal));
            vertices.push(MeshVertex::new(Vec3::new(cos * radius, hy, sin * radius), normal));
        }
        for i in 0..segments {
            let base = i * 2;
            indices.extend_from_slice(&[base, base + 1, base + 3, base, base + 3, base + 2]);
        }

        for (y, normal) in [(-hy, -Vec3::Y), (hy, Vec3::Y)] {
            let center = vertices.len() as u32;
            vertices.push(MeshVertex::new(Vec3::new(0.0, y, 0.0), normal));
            for i in 0..=segments {
                let angle = i as f32 / segments as f32 * std::f32::consts::TAU;
                let (sin, cos) = angle.sin_cos();
                vertices.push(MeshVertex::new(Vec3::new(cos * radius, y, sin * radius), normal));
            }
            for i in 0..segments {
                let a = center + 1 + i;
                let b = center + 2 + i;
                if normal.y > 0.0 {
                    indices.extend_from_slice(&[center, a, b]);
                } else {
                    indices.extend_from_slice(&[center, b, a]);
                }
            }
        }
        Self::new(vertices, indices)
    }

    /// Flat annulus in the XZ plane facing +Y.
    pub fn ring(inner_radius: f32, outer_radius: f32, segments: u32) -> Self {
        let segments = segments.max(3);
        let up = Vec3::Y;
        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        for i in 0..=segments {
            let angle = i as f32 / segments as f32 * std::f32::consts::TAU;
            let (sin, cos) = angle.sin_cos();
            vertices.push(MeshVertex::new(Vec3::new(cos * inner_radius, 0.0, sin * inner_radius), up));
            vertices.push(MeshVertex::new(Vec3::new(cos * outer_radius, 0.0, sin * outer_radius), up));
        }
        for i in 0..segments {
            let base = i * 2;
            indices.extend_from_slice(&[base, base + 3, base + 1, base, base + 2, base + 3]);
        }
        Self::new(vertices, indices)
    }

    /// Filled circle in the XZ plane facing +Y.
    pub fn disc(radius: f32, segments: u32) -> Self {
        let segments = segments.max(3);
        let up = Vec3::Y;
        let mut vertices = vec![MeshVertex::new(Vec3::ZERO, up)];
        for i in 0..=segments {
            let angle = i as f32 / segments as f32 * std::f32::consts::TAU;
            let (sin, cos) = angle.sin_cos();
            vertices.push(MeshVertex::new(Vec3::new(cos * radius, 0.0, sin * radius), up));
        }
        let mut indices = Vec::with_capacity(segments as usize * 3);
        for i in 0..segments {
            indices.extend_from_slice(&[0, 2 + i, 1 + i]);
        }
        Self::new(vertices, indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cuboid_has_expected_counts_and_bounds() {
        let mesh = Mesh::cuboid(2.0, 4.0, 6.0);
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.indices.len(), 36);
        assert!((mesh.bounds.max.y - 2.0).abs() < 1e-6);
        assert!((mesh.bounds.min.z + 3.0).abs() < 1e-6);
        assert!(mesh.bounds.center.length() < 1e-6);
    }

    #[test]
    fn cylinder_indices_stay_in_range() {
        let mesh = Mesh::cylinder(0.5, 1.0, 12);
        let count = mesh.vertices.len() as u32;
        assert!(mesh.indices.iter().all(|&i| i < count));
    }

    #[test]
    fn disc_radius_matches_bounds() {
        let mesh = Mesh::disc(1.5, 16);
        assert!((mesh.bounds.radius - 1.5).abs() < 1e-3);
    }
}
