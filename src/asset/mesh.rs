use std::sync::atomic::{AtomicU64, Ordering};

use crate::renderer::vertex::{Vertex, MAX_VERTEX_ATTR_STRIDE_F};

static NEXT_MESH_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique mesh identity, used for batch sorting and deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(u64);

impl MeshId {
    fn next() -> Self {
        Self(NEXT_MESH_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// CPU-side geometry. Uploading is the batch renderer's job; a mesh never
/// owns GPU memory itself.
#[derive(Debug)]
pub struct Mesh {
    id: MeshId,
    name: String,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

impl Mesh {
    pub fn new(name: impl Into<String>, vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self {
            id: MeshId::next(),
            name: name.into(),
            vertices,
            indices,
        }
    }

    /// Builds a mesh from interleaved floats with `stride_f` floats per
    /// vertex, padding each vertex to the batch stride.
    pub fn from_interleaved(
        name: impl Into<String>,
        data: &[f32],
        stride_f: usize,
        indices: Vec<u32>,
    ) -> Self {
        debug_assert!(stride_f > 0 && stride_f <= MAX_VERTEX_ATTR_STRIDE_F);
        let vertices = data
            .chunks_exact(stride_f.max(1))
            .map(Vertex::from_floats)
            .collect();
        Self::new(name, vertices, indices)
    }

    pub fn id(&self) -> MeshId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}
