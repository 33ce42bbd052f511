use super::vertex::{v, Vertex};
use crate::asset::Mesh;
use std::f32::consts::PI;

pub fn sphere_mesh(segments: u32, rings: u32) -> Mesh {
    let segments = segments.max(3);
    let rings = rings.max(2);
    let mut vertices = Vec::with_capacity(((rings + 1) * (segments + 1)) as usize);
    let mut indices = Vec::with_capacity((rings * segments * 6) as usize);

    for ring in 0..=rings {
        let phi = PI * ring as f32 / rings as f32;
        let y = phi.cos();
        let ring_radius = phi.sin();

        for segment in 0..=segments {
            let theta = 2.0 * PI * segment as f32 / segments as f32;
            let x = ring_radius * theta.cos();
            let z = ring_radius * theta.sin();
            let uv = [segment as f32 / segments as f32, ring as f32 / rings as f32];
            let tangent = [-theta.sin(), 0.0, theta.cos(), 1.0];

            // unit sphere: position doubles as normal
            vertices.push(v([x, y, z], [x, y, z], uv, tangent));
        }
    }

    for ring in 0..rings {
        for segment in 0..segments {
            let current = ring * (segments + 1) + segment;
            let next = current + segments + 1;

            indices.extend_from_slice(&[current, next, current + 1]);
            indices.extend_from_slice(&[current + 1, next, next + 1]);
        }
    }

    Mesh::new(format!("sphere_{segments}x{rings}"), vertices, indices)
}

pub fn cube_mesh() -> Mesh {
    // (normal, tangent) per face; the bitangent is normal x tangent
    const FACES: [([f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0]),
        ([0.0, 0.0, 1.0], [-1.0, 0.0, 0.0]),
        ([0.0, 0.0, -1.0], [1.0, 0.0, 0.0]),
    ];
    const CORNERS: [([f32; 2], [f32; 2]); 4] = [
        ([-0.5, -0.5], [0.0, 1.0]),
        ([-0.5, 0.5], [0.0, 0.0]),
        ([0.5, 0.5], [1.0, 0.0]),
        ([0.5, -0.5], [1.0, 1.0]),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);

    for (normal, tangent) in FACES {
        let n = glam::Vec3::from(normal);
        let t = glam::Vec3::from(tangent);
        let b = n.cross(t);
        let base = vertices.len() as u32;

        for (corner, uv) in CORNERS {
            let pos = n * 0.5 + t * corner[1] + b * corner[0];
            vertices.push(v(pos.into(), normal, uv, [t.x, t.y, t.z, 1.0]));
        }

        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    Mesh::new("cube", vertices, indices)
}

pub fn plane_mesh(size: f32) -> Mesh {
    let h = size * 0.5;
    let up = [0.0, 1.0, 0.0];
    let tangent = [1.0, 0.0, 0.0, 1.0];
    let vertices: Vec<Vertex> = vec![
        v([-h, 0.0, -h], up, [0.0, 0.0], tangent),
        v([-h, 0.0, h], up, [0.0, 1.0], tangent),
        v([h, 0.0, h], up, [1.0, 1.0], tangent),
        v([h, 0.0, -h], up, [1.0, 0.0], tangent),
    ];

    Mesh::new("plane", vertices, vec![0, 1, 2, 0, 2, 3])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_has_outward_facing_counter_clockwise_triangles() {
        let cube = cube_mesh();
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.index_count(), 36);

        for tri in cube.indices().chunks_exact(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| {
                glam::Vec3::from(cube.vertices()[i as usize].pos)
            });
            let normal = glam::Vec3::from(cube.vertices()[tri[0] as usize].normal);
            let face = (b - a).cross(c - a);
            assert!(face.dot(normal) > 0.0, "triangle {:?} winds inward", tri);
        }
    }

    #[test]
    fn sphere_indices_stay_in_range() {
        let sphere = sphere_mesh(8, 4);
        let count = sphere.vertex_count() as u32;
        assert!(sphere.indices().iter().all(|&i| i < count));
        assert_eq!(sphere.index_count(), 8 * 4 * 6);
    }
}
