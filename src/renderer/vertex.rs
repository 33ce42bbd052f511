use bytemuck::{Pod, Zeroable};
use std::mem;

/// Float count of the widest vertex layout the shared batch buffer accepts.
/// Every mesh is padded to this stride so a single vertex buffer binding
/// serves all batched meshes.
pub const MAX_VERTEX_ATTR_STRIDE_F: usize = 12;

pub const VERTEX_STRIDE: wgpu::BufferAddress =
    (MAX_VERTEX_ATTR_STRIDE_F * mem::size_of::<f32>()) as wgpu::BufferAddress;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub tangent: [f32; 4],
}

const _: () = assert!(mem::size_of::<Vertex>() == VERTEX_STRIDE as usize);

impl Vertex {
    pub const ATTRS: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x3,
        2 => Float32x2,
        3 => Float32x4
    ];

    pub fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: VERTEX_STRIDE,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }

    /// Builds a vertex from a narrower interleaved record, zero-filling the
    /// attributes it does not carry.
    pub fn from_floats(record: &[f32]) -> Self {
        let mut padded = [0.0f32; MAX_VERTEX_ATTR_STRIDE_F];
        let len = record.len().min(MAX_VERTEX_ATTR_STRIDE_F);
        padded[..len].copy_from_slice(&record[..len]);
        bytemuck::cast(padded)
    }
}

#[inline]
pub fn v(pos: [f32; 3], normal: [f32; 3], uv: [f32; 2], tangent: [f32; 4]) -> Vertex {
    Vertex {
        pos,
        normal,
        uv,
        tangent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_stride_matches_struct_size() {
        assert_eq!(
            Vertex::layout().array_stride,
            std::mem::size_of::<Vertex>() as wgpu::BufferAddress
        );
    }

    #[test]
    fn narrow_records_are_zero_padded() {
        let vertex = Vertex::from_floats(&[1.0, 2.0, 3.0, 0.0, 1.0, 0.0]);
        assert_eq!(vertex.pos, [1.0, 2.0, 3.0]);
        assert_eq!(vertex.normal, [0.0, 1.0, 0.0]);
        assert_eq!(vertex.uv, [0.0, 0.0]);
        assert_eq!(vertex.tangent, [0.0; 4]);
    }
}
