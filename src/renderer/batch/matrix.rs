use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::error::Result;
use crate::renderer::gpu_buffer::{BufferUpload, GrowableGpuBuffer};
use crate::renderer::slot_table::{KeyedSlotTable, SlotKey};
use crate::renderer::thread::RecycleBin;

/// GPU layout of one object's transform pair.
///
/// Stored column-major, which is what WGSL `mat4x4<f32>` expects.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable, PartialEq)]
pub struct BatchMatrix {
    pub local_to_world: [[f32; 4]; 4],
    pub world_to_local: [[f32; 4]; 4],
}

impl BatchMatrix {
    pub fn new(local_to_world: Mat4, world_to_local: Mat4) -> Self {
        Self {
            local_to_world: local_to_world.to_cols_array_2d(),
            world_to_local: world_to_local.to_cols_array_2d(),
        }
    }
}

impl Default for BatchMatrix {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY)
    }
}

const MATRIX_SIZE: u64 = std::mem::size_of::<BatchMatrix>() as u64;

/// Per-object matrix slots, re-uploaded as one flat array each frame.
pub struct BatchMatrixBuffer {
    table: KeyedSlotTable<BatchMatrix>,
    gpu: GrowableGpuBuffer,
    dirty: bool,
}

impl BatchMatrixBuffer {
    pub fn new(initial_count: u32) -> Self {
        Self {
            table: KeyedSlotTable::new("BatchMatrixBuffer", initial_count as usize),
            gpu: GrowableGpuBuffer::new(
                "Batch Matrix Buffer",
                wgpu::BufferUsages::STORAGE,
                initial_count.max(1) as u64 * MATRIX_SIZE,
            ),
            dirty: false,
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn alloc(&mut self, initial: BatchMatrix) -> Result<SlotKey> {
        self.dirty = true;
        self.table.alloc(initial)
    }

    pub fn free(&mut self, key: SlotKey) -> Result<()> {
        self.table.free(key)?;
        self.dirty = true;
        Ok(())
    }

    pub fn set(&mut self, key: SlotKey, matrix: BatchMatrix) -> Result<()> {
        self.table.set(key, matrix)?;
        self.dirty = true;
        Ok(())
    }

    pub fn get(&self, key: SlotKey) -> Result<&BatchMatrix> {
        self.table.get(key)
    }

    pub fn index_of(&self, key: SlotKey) -> Result<u32> {
        Ok(self.table.index_of(key)? as u32)
    }

    pub fn swap(&mut self, a: usize, b: usize) {
        self.table.swap(a, b);
        self.dirty = true;
    }

    /// Copies the dense matrix array into the GPU mirror if anything changed.
    pub fn upload(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let bytes: &[u8] = bytemuck::cast_slice(self.table.values());
        self.gpu.reserve(bytes.len() as u64);
        self.gpu.write_at(0, bytes)?;
        self.dirty = false;
        Ok(())
    }

    pub fn flush(&mut self, device: &wgpu::Device, recycle: &RecycleBin) -> Option<BufferUpload> {
        self.gpu.flush(device, recycle)
    }

    pub fn gpu(&self) -> &GrowableGpuBuffer {
        &self.gpu
    }

    pub fn gpu_mut(&mut self) -> &mut GrowableGpuBuffer {
        &mut self.gpu
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn upload_writes_dense_array_in_slot_order() {
        let mut buffer = BatchMatrixBuffer::new(1);
        let a = buffer.alloc(BatchMatrix::default()).unwrap();
        let b = buffer.alloc(BatchMatrix::default()).unwrap();

        let moved = Mat4::from_translation(Vec3::X);
        buffer.set(b, BatchMatrix::new(moved, moved.inverse())).unwrap();
        buffer.upload().unwrap();

        let uploaded: Vec<BatchMatrix> = buffer.gpu().bytes()[..2 * MATRIX_SIZE as usize]
            .chunks_exact(MATRIX_SIZE as usize)
            .map(bytemuck::pod_read_unaligned)
            .collect();
        assert_eq!(uploaded[buffer.index_of(a).unwrap() as usize], BatchMatrix::default());
        assert_eq!(uploaded[buffer.index_of(b).unwrap() as usize].local_to_world[3][0], 1.0);
        assert!(buffer.gpu().capacity() >= 2 * MATRIX_SIZE);
    }

    #[test]
    fn freeing_moves_last_matrix_into_the_hole() {
        let mut buffer = BatchMatrixBuffer::new(4);
        let a = buffer.alloc(BatchMatrix::default()).unwrap();
        let _b = buffer.alloc(BatchMatrix::default()).unwrap();
        let c = buffer
            .alloc(BatchMatrix::new(Mat4::from_scale(Vec3::splat(2.0)), Mat4::IDENTITY))
            .unwrap();

        buffer.free(a).unwrap();
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.index_of(c).unwrap(), 0);
        assert_eq!(buffer.get(c).unwrap().local_to_world[0][0], 2.0);
    }
}
