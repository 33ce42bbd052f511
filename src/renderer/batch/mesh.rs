use std::collections::{HashMap, HashSet};
use std::mem;
use std::sync::Arc;

use crate::asset::{Mesh, MeshId};
use crate::error::{RenderError, Result};
use crate::renderer::gpu_buffer::{BlockKey, BufferUpload, GrowableGpuBuffer};
use crate::renderer::thread::RecycleBin;
use crate::renderer::vertex::VERTEX_STRIDE;

const INDEX_SIZE: u64 = mem::size_of::<u32>() as u64;

/// Byte placement of one mesh inside the shared buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshInfo {
    pub vertex_offset: u64,
    pub vertex_size: u64,
    pub index_offset: u64,
    pub index_size: u64,
}

impl MeshInfo {
    pub fn index_count(&self) -> u32 {
        (self.index_size / INDEX_SIZE) as u32
    }

    pub fn first_index(&self) -> u32 {
        (self.index_offset / INDEX_SIZE) as u32
    }

    pub fn base_vertex(&self) -> i32 {
        (self.vertex_offset / VERTEX_STRIDE) as i32
    }
}

struct RegisteredMesh {
    _mesh: Arc<Mesh>,
    vertex_block: BlockKey,
    index_block: BlockKey,
}

/// Shared vertex and index buffers holding every batched mesh.
pub struct BatchMesh {
    vertices: GrowableGpuBuffer,
    indices: GrowableGpuBuffer,
    pending: Vec<Arc<Mesh>>,
    meshes: HashMap<MeshId, RegisteredMesh>,
    uploads: u64,
}

impl BatchMesh {
    pub fn new(initial_vertices: u32, initial_indices: u32) -> Self {
        Self {
            vertices: GrowableGpuBuffer::new(
                "Batch Mesh Vertex Buffer",
                wgpu::BufferUsages::VERTEX,
                initial_vertices as u64 * VERTEX_STRIDE,
            ),
            indices: GrowableGpuBuffer::new(
                "Batch Mesh Index Buffer",
                wgpu::BufferUsages::INDEX,
                initial_indices as u64 * INDEX_SIZE,
            ),
            pending: Vec::new(),
            meshes: HashMap::new(),
            uploads: 0,
        }
    }

    /// Queues `mesh` for upload. Safe to call any number of times.
    pub fn register_mesh(&mut self, mesh: &Arc<Mesh>) {
        if self.meshes.contains_key(&mesh.id()) {
            return;
        }
        self.pending.push(Arc::clone(mesh));
    }

    pub fn is_registered(&self, mesh: &Mesh) -> bool {
        self.meshes.contains_key(&mesh.id())
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Meshes copied into the shared buffers so far.
    pub fn upload_count(&self) -> u64 {
        self.uploads
    }

    pub fn get_mesh_info(&mut self, mesh: &Mesh) -> Result<MeshInfo> {
        self.register_actually()?;

        let Some(entry) = self.meshes.get(&mesh.id()) else {
            log::error!("Mesh {} ({}) used before registration", mesh.id().raw(), mesh.name());
            return Err(RenderError::UnregisteredMesh {
                mesh: mesh.id().raw(),
                name: mesh.name().to_string(),
            });
        };

        let vertex = self.vertices.block(entry.vertex_block)?;
        let index = self.indices.block(entry.index_block)?;
        Ok(MeshInfo {
            vertex_offset: vertex.offset,
            vertex_size: vertex.size,
            index_offset: index.offset,
            index_size: index.size,
        })
    }

    /// Uploads every pending mesh, growing each buffer at most once.
    pub fn register_actually(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let mut seen = HashSet::new();
        let mut fresh = Vec::new();
        let mut vertex_bytes = 0u64;
        let mut index_bytes = 0u64;
        for mesh in mem::take(&mut self.pending) {
            if self.meshes.contains_key(&mesh.id()) || !seen.insert(mesh.id()) {
                continue;
            }
            vertex_bytes += mesh.vertex_bytes().len() as u64;
            index_bytes += mesh.index_bytes().len() as u64;
            fresh.push(mesh);
        }

        self.vertices.reserve(self.vertices.len() + vertex_bytes);
        self.indices.reserve(self.indices.len() + index_bytes);

        for mesh in fresh {
            let vertex_block = self.vertices.alloc(mesh.vertex_bytes().len() as u64)?;
            self.vertices.write(vertex_block, mesh.vertex_bytes())?;
            let index_block = self.indices.alloc(mesh.index_bytes().len() as u64)?;
            self.indices.write(index_block, mesh.index_bytes())?;

            log::debug!(
                "Registered mesh {} ({} vertices, {} indices)",
                mesh.name(),
                mesh.vertex_count(),
                mesh.index_count()
            );
            self.uploads += 1;
            self.meshes.insert(
                mesh.id(),
                RegisteredMesh {
                    _mesh: mesh,
                    vertex_block,
                    index_block,
                },
            );
        }

        Ok(())
    }

    pub fn flush(&mut self, device: &wgpu::Device, recycle: &RecycleBin) -> Vec<BufferUpload> {
        [
            self.vertices.flush(device, recycle),
            self.indices.flush(device, recycle),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Vertex and index buffers to bind, once they exist on the GPU.
    pub fn buffers(&self) -> Option<(wgpu::Buffer, wgpu::Buffer)> {
        Some((
            self.vertices.resource()?.clone(),
            self.indices.resource()?.clone(),
        ))
    }

    pub fn bind_mesh(pass: &mut wgpu::RenderPass<'_>, buffers: &(wgpu::Buffer, wgpu::Buffer)) {
        pass.set_vertex_buffer(0, buffers.0.slice(..));
        pass.set_index_buffer(buffers.1.slice(..), wgpu::IndexFormat::Uint32);
    }

    pub fn vertex_buffer(&self) -> &GrowableGpuBuffer {
        &self.vertices
    }

    pub fn index_buffer(&self) -> &GrowableGpuBuffer {
        &self.indices
    }
}
