use std::collections::HashMap;
use std::mem;
use std::sync::{Arc, Weak};

use glam::Mat4;

use crate::asset::MeshId;
use crate::error::Result;
use crate::renderer::batch::group::{BatchCmd, BatchEntry, BatchRenderGroup, DrawContext};
use crate::renderer::batch::matrix::{BatchMatrix, BatchMatrixBuffer};
use crate::renderer::batch::mesh::BatchMesh;
use crate::renderer::batch::signature::{BatchLayouts, BatchSignature, SignatureCache};
use crate::renderer::descriptor::{DescriptorPool, RenderTarget};
use crate::renderer::gpu_buffer::BufferUpload;
use crate::renderer::material::MaterialId;
use crate::renderer::render_object::RenderObjectId;
use crate::renderer::shader::ShaderId;
use crate::renderer::slot_table::SlotKey;
use crate::renderer::thread::RecycleBin;
use crate::renderer::{Material, RenderObject, Shader};
use crate::settings::BatchSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPass {
    Common,
    Shadow,
}

type SortKey = (ShaderId, MaterialId, MeshId);

struct BatchRenderObject {
    id: RenderObjectId,
    object: Weak<RenderObject>,
    matrix_key: SlotKey,
    sort_key: SortKey,
}

/// Device-side inputs for recording one batched pass.
pub struct PassContext<'a> {
    pub device: &'a wgpu::Device,
    pub pool: &'a DescriptorPool,
    pub view: &'a wgpu::BindGroup,
    pub target: &'a RenderTarget,
    pub multi_draw: bool,
}

/// Turns a changing set of render objects into indirect multi-draws.
///
/// Register, unregister and matrix updates are queued and only take effect
/// at [`register_actually`](Self::register_actually), which must run before
/// [`encode_cmd`](Self::encode_cmd) each frame.
pub struct BatchRenderer {
    mesh: BatchMesh,
    matrices: BatchMatrixBuffer,
    common: BatchRenderGroup,
    shadow: Option<BatchRenderGroup>,
    signatures: SignatureCache<BatchSignature>,
    layouts: Option<BatchLayouts>,

    pending_register: Vec<Arc<RenderObject>>,
    pending_unregister: Vec<RenderObjectId>,
    dirty: Vec<(RenderObjectId, BatchMatrix)>,

    objects: Vec<BatchRenderObject>,
    live: HashMap<RenderObjectId, SlotKey>,
}

impl BatchRenderer {
    pub fn new(settings: &BatchSettings) -> Self {
        let shadow = settings.shadow_pass.then(|| {
            let material = Material::new("draw_shadow", Some(Arc::new(Shader::shadow())));
            BatchRenderGroup::new(
                "ShadowBatchPass",
                Some(Arc::new(material)),
                settings.initial_indirect_arg_count,
                settings.initial_batch_index_count,
            )
        });

        log::info!(
            "Batch renderer: {} vertices, {} indices, {} matrices reserved (shadow pass {})",
            settings.initial_vertex_count,
            settings.initial_index_count,
            settings.initial_matrix_count,
            if shadow.is_some() { "on" } else { "off" }
        );

        Self {
            mesh: BatchMesh::new(settings.initial_vertex_count, settings.initial_index_count),
            matrices: BatchMatrixBuffer::new(settings.initial_matrix_count),
            common: BatchRenderGroup::new(
                "CommonBatchPass",
                None,
                settings.initial_indirect_arg_count,
                settings.initial_batch_index_count,
            ),
            shadow,
            signatures: SignatureCache::new(),
            layouts: None,
            pending_register: Vec::new(),
            pending_unregister: Vec::new(),
            dirty: Vec::new(),
            objects: Vec::new(),
            live: HashMap::new(),
        }
    }

    pub fn register(&mut self, object: &Arc<RenderObject>) {
        let id = object.id();
        if let Some(pos) = self.pending_unregister.iter().position(|&pending| pending == id) {
            self.pending_unregister.remove(pos);
            log::trace!("Register of {} cancels its pending unregister", id.raw());
            if self.live.contains_key(&id) {
                return;
            }
        }
        if !self.pending_register.iter().any(|pending| pending.id() == id) {
            self.pending_register.push(Arc::clone(object));
        }
    }

    pub fn unregister(&mut self, object: &RenderObject) {
        let id = object.id();
        if let Some(pos) = self.pending_register.iter().position(|pending| pending.id() == id) {
            self.pending_register.remove(pos);
            log::trace!("Unregister of {} cancels its pending register", id.raw());
            if !self.live.contains_key(&id) {
                return;
            }
        }
        if !self.pending_unregister.contains(&id) {
            self.pending_unregister.push(id);
        }
    }

    /// Queues a matrix write. Later updates for the same object win.
    pub fn update_matrix(&mut self, object: &RenderObject, local_to_world: Mat4, world_to_local: Mat4) {
        self.dirty
            .push((object.id(), BatchMatrix::new(local_to_world, world_to_local)));
    }

    /// Drains the pending queues, re-sorts the live list and applies dirty
    /// matrices. The live list changes nowhere else.
    pub fn register_actually(&mut self) -> Result<()> {
        for object in mem::take(&mut self.pending_register) {
            let id = object.id();
            if self.live.contains_key(&id) {
                log::trace!("Object {} already registered", id.raw());
                continue;
            }
            let Some(shader) = object.shader() else {
                log::trace!(
                    "Object {} not batched: material {} has no shader",
                    id.raw(),
                    object.material().name()
                );
                continue;
            };

            self.mesh.register_mesh(object.mesh());
            let constants = object.constants();
            let matrix_key = self.matrices.alloc(BatchMatrix::new(
                constants.local_to_world,
                constants.world_to_local,
            ))?;

            self.live.insert(id, matrix_key);
            self.objects.push(BatchRenderObject {
                id,
                object: Arc::downgrade(&object),
                matrix_key,
                sort_key: (shader.id(), object.material().id(), object.mesh().id()),
            });
        }

        for id in mem::take(&mut self.pending_unregister) {
            let Some(matrix_key) = self.live.remove(&id) else {
                log::trace!("Object {} was not registered", id.raw());
                continue;
            };
            self.matrices.free(matrix_key)?;
            self.objects.retain(|entry| entry.id != id);
        }

        let mut dropped = Vec::new();
        self.objects.retain(|entry| {
            let alive = entry.object.strong_count() > 0;
            if !alive {
                dropped.push((entry.id, entry.matrix_key));
            }
            alive
        });
        for (id, matrix_key) in dropped {
            log::debug!("Object {} dropped without unregistering", id.raw());
            self.live.remove(&id);
            self.matrices.free(matrix_key)?;
        }

        self.objects.sort_by_key(|entry| entry.sort_key);

        for (id, matrix) in mem::take(&mut self.dirty) {
            match self.live.get(&id) {
                Some(&matrix_key) => self.matrices.set(matrix_key, matrix)?,
                None => log::trace!("Matrix update for unregistered object {}", id.raw()),
            }
        }

        let pruned = self.signatures.prune();
        if pruned > 0 {
            log::debug!("Pruned {} batch signatures", pruned);
        }

        self.mesh.register_actually()?;
        self.matrices.upload()
    }

    fn entries(&mut self) -> Result<Vec<BatchEntry>> {
        let mut entries = Vec::with_capacity(self.objects.len());
        for entry in &self.objects {
            let Some(object) = entry.object.upgrade() else {
                continue;
            };
            let mesh = self.mesh.get_mesh_info(object.mesh())?;
            let matrix_index = self.matrices.index_of(entry.matrix_key)?;
            entries.push(BatchEntry {
                object,
                matrix_index,
                mesh,
            });
        }
        Ok(entries)
    }

    /// Builds and stages the draw arguments of every group from the live list.
    pub fn encode_cmd(&mut self) -> Result<()> {
        let entries = self.entries()?;
        self.common.encode(&entries)?;
        if let Some(shadow) = self.shadow.as_mut() {
            shadow.encode(&entries)?;
        }
        Ok(())
    }

    /// Realises every staged buffer change; the uploads must be recorded
    /// ahead of the frame's passes.
    pub fn flush(&mut self, device: &wgpu::Device, recycle: &RecycleBin) -> Vec<BufferUpload> {
        let mut uploads = self.mesh.flush(device, recycle);
        uploads.extend(self.matrices.flush(device, recycle));
        uploads.extend(self.common.flush(device, recycle));
        if let Some(shadow) = self.shadow.as_mut() {
            uploads.extend(shadow.flush(device, recycle));
        }
        uploads
    }

    pub fn layouts(&mut self, device: &wgpu::Device) -> &BatchLayouts {
        self.layouts.get_or_insert_with(|| BatchLayouts::new(device))
    }

    /// Snapshot of one pass for the render thread. Empty when nothing is
    /// live or the pass is disabled.
    pub fn create_cmd(&mut self, pass: BatchPass, ctx: &PassContext<'_>) -> Result<BatchCmd> {
        let layouts = self
            .layouts
            .get_or_insert_with(|| BatchLayouts::new(ctx.device));
        let group = match pass {
            BatchPass::Common => &mut self.common,
            BatchPass::Shadow => match self.shadow.as_mut() {
                Some(shadow) => shadow,
                None => return Ok(BatchCmd::empty("ShadowBatchPass")),
            },
        };

        let draw = DrawContext {
            device: ctx.device,
            layouts,
            mesh_buffers: self.mesh.buffers(),
            matrices: self.matrices.gpu_mut().shader_view(ctx.pool)?,
            matrices_key: self.matrices.gpu().resource_key(),
            view: ctx.view,
            target: ctx.target,
            multi_draw: ctx.multi_draw,
        };
        group.create_cmd(&draw, ctx.pool, &mut self.signatures)
    }

    pub fn live_len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_live(&self, object: &RenderObject) -> bool {
        self.live.contains_key(&object.id())
    }

    pub fn pending_len(&self) -> (usize, usize) {
        (self.pending_register.len(), self.pending_unregister.len())
    }

    /// Matrix-slot index of every live object, in draw order.
    pub fn live_matrix_indices(&self) -> Result<Vec<u32>> {
        self.objects
            .iter()
            .map(|entry| self.matrices.index_of(entry.matrix_key))
            .collect()
    }

    pub fn matrix_of(&self, object: &RenderObject) -> Option<&BatchMatrix> {
        let key = self.live.get(&object.id())?;
        self.matrices.get(*key).ok()
    }

    pub fn group(&self, pass: BatchPass) -> Option<&BatchRenderGroup> {
        match pass {
            BatchPass::Common => Some(&self.common),
            BatchPass::Shadow => self.shadow.as_ref(),
        }
    }

    pub fn mesh(&self) -> &BatchMesh {
        &self.mesh
    }

    pub fn matrices(&self) -> &BatchMatrixBuffer {
        &self.matrices
    }

    pub fn signature_count(&self) -> usize {
        self.signatures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::primitives::cube_mesh;
    use glam::Vec3;

    fn settings() -> BatchSettings {
        BatchSettings {
            initial_vertex_count: 16,
            initial_index_count: 16,
            initial_matrix_count: 2,
            initial_batch_index_count: 2,
            initial_indirect_arg_count: 1,
            ..BatchSettings::default()
        }
    }

    fn object() -> Arc<RenderObject> {
        let material = Arc::new(Material::new("lit", Some(Arc::new(Shader::lit()))));
        Arc::new(RenderObject::new(Arc::new(cube_mesh()), material))
    }

    #[test]
    fn register_then_unregister_in_one_frame_cancels() {
        let mut batch = BatchRenderer::new(&settings());
        let ro = object();

        batch.register(&ro);
        batch.unregister(&ro);
        assert_eq!(batch.pending_len(), (0, 0));
        batch.register_actually().unwrap();

        assert_eq!(batch.live_len(), 0);
        assert_eq!(batch.mesh().upload_count(), 0);
    }

    #[test]
    fn unregister_then_register_keeps_object_live() {
        let mut batch = BatchRenderer::new(&settings());
        let ro = object();
        batch.register(&ro);
        batch.register_actually().unwrap();

        batch.unregister(&ro);
        batch.register(&ro);
        batch.register_actually().unwrap();

        assert!(batch.is_live(&ro));
        assert_eq!(batch.live_len(), 1);
        assert_eq!(batch.matrices().len(), 1);
    }

    #[test]
    fn double_register_is_deduplicated() {
        let mut batch = BatchRenderer::new(&settings());
        let ro = object();
        batch.register(&ro);
        batch.register(&ro);
        batch.register_actually().unwrap();
        batch.register(&ro);
        batch.register_actually().unwrap();

        assert_eq!(batch.live_len(), 1);
        assert_eq!(batch.matrices().len(), 1);
    }

    #[test]
    fn last_matrix_update_wins() {
        let mut batch = BatchRenderer::new(&settings());
        let ro = object();
        batch.register(&ro);
        batch.register_actually().unwrap();

        let first = Mat4::from_translation(Vec3::X);
        let second = Mat4::from_translation(Vec3::Y * 5.0);
        batch.update_matrix(&ro, first, first.inverse());
        batch.update_matrix(&ro, second, second.inverse());
        batch.register_actually().unwrap();

        let stored = batch.matrix_of(&ro).unwrap();
        assert_eq!(stored.local_to_world, second.to_cols_array_2d());
    }

    #[test]
    fn dropped_objects_release_their_matrix_slot() {
        let mut batch = BatchRenderer::new(&settings());
        let kept = object();
        let dropped = object();
        batch.register(&kept);
        batch.register(&dropped);
        batch.register_actually().unwrap();
        assert_eq!(batch.matrices().len(), 2);

        drop(dropped);
        batch.register_actually().unwrap();
        assert_eq!(batch.live_len(), 1);
        assert_eq!(batch.matrices().len(), 1);
        assert_eq!(batch.live_matrix_indices().unwrap(), vec![0]);
    }

    #[test]
    fn shaderless_objects_are_a_no_op() {
        let mut batch = BatchRenderer::new(&settings());
        let material = Arc::new(Material::new("loading", None));
        let ro = Arc::new(RenderObject::new(Arc::new(cube_mesh()), material));
        batch.register(&ro);
        batch.register_actually().unwrap();
        batch.encode_cmd().unwrap();

        assert_eq!(batch.live_len(), 0);
        assert!(batch.group(BatchPass::Common).unwrap().plan().is_empty());
    }

    #[test]
    fn shadow_group_follows_settings() {
        let mut no_shadow = settings();
        no_shadow.shadow_pass = false;
        assert!(BatchRenderer::new(&no_shadow).group(BatchPass::Shadow).is_none());
        assert!(BatchRenderer::new(&settings()).group(BatchPass::Shadow).is_some());
    }
}
