use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use wgpu::util::DeviceExt;

use crate::error::{RenderError, Result};
use crate::renderer::descriptor::{DescriptorPool, ShaderView, SrvHandle};
use crate::renderer::thread::RecycleBin;

const ALIGN: u64 = wgpu::COPY_BUFFER_ALIGNMENT;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

#[inline]
fn align_up(value: u64) -> u64 {
    (value + ALIGN - 1) & !(ALIGN - 1)
}

/// Opaque block identity. Keys survive growth; offsets are looked up
/// through [`GrowableGpuBuffer::block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockKey(u64);

impl BlockKey {
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBlock {
    pub offset: u64,
    pub size: u64,
}

/// One GPU buffer carved into caller-defined blocks.
///
/// All bookkeeping happens on a CPU mirror; [`flush`](Self::flush) turns the
/// accumulated changes into copy commands for the render thread. Growth
/// doubles capacity and replaces the backing resource, copying the old
/// contents across before any new data lands.
pub struct GrowableGpuBuffer {
    id: u64,
    label: &'static str,
    usage: wgpu::BufferUsages,
    staging: Vec<u8>,
    len: u64,
    blocks: HashMap<BlockKey, BufferBlock>,
    dirty: Option<Range<u64>>,
    rng: SmallRng,
    resource: Option<wgpu::Buffer>,
    view: Option<SrvHandle>,
    generation: u64,
}

impl GrowableGpuBuffer {
    pub fn new(label: &'static str, usage: wgpu::BufferUsages, capacity: u64) -> Self {
        Self::with_rng(label, usage, capacity, SmallRng::from_entropy())
    }

    pub fn with_seed(
        label: &'static str,
        usage: wgpu::BufferUsages,
        capacity: u64,
        seed: u64,
    ) -> Self {
        Self::with_rng(label, usage, capacity, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(
        label: &'static str,
        usage: wgpu::BufferUsages,
        capacity: u64,
        rng: SmallRng,
    ) -> Self {
        let capacity = align_up(capacity.max(ALIGN));
        Self {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            label,
            usage: usage | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
            staging: vec![0; capacity as usize],
            len: 0,
            blocks: HashMap::new(),
            dirty: None,
            rng,
            resource: None,
            view: None,
            generation: 0,
        }
    }

    /// Stable identity across regrows, used for state tracking.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn usage(&self) -> wgpu::BufferUsages {
        self.usage
    }

    pub fn capacity(&self) -> u64 {
        self.staging.len() as u64
    }

    /// Logical end of the allocated region.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Bumped whenever the backing resource is replaced.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn resource_key(&self) -> ResourceKey {
        ResourceKey {
            buffer: self.id,
            generation: self.generation,
            capacity: self.capacity(),
        }
    }

    pub fn alloc(&mut self, size: u64) -> Result<BlockKey> {
        let key = BlockKey(self.rng.gen());
        if self.blocks.contains_key(&key) {
            log::error!("{}: block key {:#x} collided", self.label, key.0);
            return Err(RenderError::OutOfKeySpace {
                owner: self.label,
                key: key.0,
            });
        }

        let offset = self.len;
        let end = offset + align_up(size);
        self.reserve(end);
        self.blocks.insert(key, BufferBlock { offset, size });
        self.len = end;

        log::trace!(
            "{}: allocated block {:#x} at {} ({} bytes)",
            self.label,
            key.0,
            offset,
            size
        );
        Ok(key)
    }

    pub fn block(&self, key: BlockKey) -> Result<BufferBlock> {
        self.blocks
            .get(&key)
            .copied()
            .ok_or(RenderError::UnknownKey {
                owner: self.label,
                key: key.0,
            })
    }

    pub fn write(&mut self, key: BlockKey, data: &[u8]) -> Result<()> {
        let block = self.block(key)?;
        if data.len() as u64 > block.size {
            return Err(RenderError::OutOfBounds {
                owner: self.label,
                offset: block.offset,
                len: data.len() as u64,
                limit: block.size,
            });
        }
        self.copy_in(block.offset, data);
        Ok(())
    }

    /// Raw write used by buffers managed as one flat array rather than blocks.
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let end = offset + data.len() as u64;
        if end > self.capacity() {
            return Err(RenderError::OutOfBounds {
                owner: self.label,
                offset,
                len: data.len() as u64,
                limit: self.capacity(),
            });
        }
        self.copy_in(offset, data);
        self.len = self.len.max(align_up(end));
        Ok(())
    }

    pub fn read(&self, key: BlockKey) -> Result<&[u8]> {
        let block = self.block(key)?;
        let start = block.offset as usize;
        Ok(&self.staging[start..start + block.size as usize])
    }

    pub fn bytes(&self) -> &[u8] {
        &self.staging[..self.len as usize]
    }

    /// Grows to at least `capacity` bytes by repeated doubling. Never shrinks.
    pub fn reserve(&mut self, capacity: u64) {
        let current = self.capacity();
        if capacity <= current {
            return;
        }

        let mut grown = current.max(ALIGN);
        while grown < capacity {
            grown *= 2;
        }

        log::info!("Growing {}: {} -> {} bytes", self.label, current, grown);
        self.staging.resize(grown as usize, 0);
    }

    fn copy_in(&mut self, offset: u64, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let start = offset as usize;
        self.staging[start..start + data.len()].copy_from_slice(data);

        let range = offset..offset + data.len() as u64;
        self.dirty = Some(match self.dirty.take() {
            Some(dirty) => dirty.start.min(range.start)..dirty.end.max(range.end),
            None => range,
        });
    }

    pub fn dirty_range(&self) -> Option<Range<u64>> {
        self.dirty.clone()
    }

    pub fn needs_flush(&self) -> bool {
        self.dirty.is_some()
            || self
                .resource
                .as_ref()
                .map_or(true, |buffer| buffer.size() != self.capacity())
    }

    pub fn resource(&self) -> Option<&wgpu::Buffer> {
        self.resource.as_ref()
    }

    /// Brings the GPU resource in line with the CPU mirror.
    ///
    /// Creates the resource on first use or after growth, then stages the
    /// dirty range. Replaced and transient buffers go to `recycle`.
    pub fn flush(&mut self, device: &wgpu::Device, recycle: &RecycleBin) -> Option<BufferUpload> {
        let capacity = self.capacity();
        let mut copies = Vec::new();

        let regrow = self
            .resource
            .as_ref()
            .map_or(true, |buffer| buffer.size() != capacity);
        if regrow {
            let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(self.label),
                size: capacity,
                usage: self.usage,
                mapped_at_creation: false,
            });

            if let Some(old) = self.resource.replace(buffer) {
                copies.push(BufferCopy {
                    src: old.clone(),
                    dst_offset: 0,
                    size: old.size().min(capacity),
                });
                recycle.add(old);
            }

            self.view = None;
            self.generation += 1;
        }

        if let Some(range) = self.dirty.take() {
            let start = range.start & !(ALIGN - 1);
            let end = align_up(range.end).min(capacity);
            let staging = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Staging Upload Buffer"),
                contents: &self.staging[start as usize..end as usize],
                usage: wgpu::BufferUsages::COPY_SRC,
            });
            copies.push(BufferCopy {
                src: staging.clone(),
                dst_offset: start,
                size: end - start,
            });
            recycle.add(staging);
        }

        let target = self.resource.clone()?;
        if copies.is_empty() {
            return None;
        }

        Some(BufferUpload {
            id: self.id,
            label: self.label,
            usage: self.usage,
            target,
            copies,
        })
    }

    /// Shader-visible view of the current resource, allocated on demand and
    /// dropped whenever the resource is replaced.
    pub fn shader_view(&mut self, pool: &DescriptorPool) -> Result<Option<SrvHandle>> {
        let Some(buffer) = self.resource.as_ref() else {
            return Ok(None);
        };
        if self.view.is_none() {
            self.view = Some(pool.alloc_srv(ShaderView::Buffer(buffer.clone()))?);
        }
        Ok(self.view.clone())
    }
}

struct BufferCopy {
    src: wgpu::Buffer,
    dst_offset: u64,
    size: u64,
}

/// Identifies the backing resource a binding was built against. Changes
/// whenever the resource is or will be replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub buffer: u64,
    pub generation: u64,
    pub capacity: u64,
}

/// Copy commands produced by a flush, recorded on the render thread ahead of
/// the frame's draws.
pub struct BufferUpload {
    id: u64,
    label: &'static str,
    usage: wgpu::BufferUsages,
    target: wgpu::Buffer,
    copies: Vec<BufferCopy>,
}

impl BufferUpload {
    pub fn buffer_id(&self) -> u64 {
        self.id
    }

    pub fn usage(&self) -> wgpu::BufferUsages {
        self.usage
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn copy_count(&self) -> usize {
        self.copies.len()
    }

    pub fn record(&self, encoder: &mut wgpu::CommandEncoder) {
        for copy in &self.copies {
            encoder.copy_buffer_to_buffer(&copy.src, 0, &self.target, copy.dst_offset, copy.size);
        }
    }
}
