use std::ops::Range;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use crate::asset::MeshId;
use crate::error::Result;
use crate::renderer::batch::mesh::{BatchMesh, MeshInfo};
use crate::renderer::batch::signature::{BatchLayouts, BatchSignature, SignatureCache};
use crate::renderer::descriptor::{DescriptorPool, RenderTarget, ShaderView, SrvHandle};
use crate::renderer::gpu_buffer::{BufferUpload, GrowableGpuBuffer, ResourceKey};
use crate::renderer::shader::PipelineKey;
use crate::renderer::thread::RecycleBin;
use crate::renderer::{Material, RenderObject, Shader};

/// One indirect draw: a run of instances sharing a mesh and material.
///
/// `base_instance_id` is where the run's entries start in the batch-indices
/// buffer; it reaches the shader as the draw's first instance.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable, PartialEq, Eq)]
pub struct IndirectArg {
    pub base_instance_id: u32,
    pub index_count: u32,
    pub instance_count: u32,
    pub start_index_location: u32,
    pub base_vertex_location: i32,
    pub start_instance_location: u32,
}

impl IndirectArg {
    pub fn to_draw_args(&self) -> wgpu::util::DrawIndexedIndirectArgs {
        wgpu::util::DrawIndexedIndirectArgs {
            index_count: self.index_count,
            instance_count: self.instance_count,
            first_index: self.start_index_location,
            base_vertex: self.base_vertex_location,
            first_instance: self.start_instance_location,
        }
    }
}

const DRAW_ARGS_SIZE: u64 = std::mem::size_of::<wgpu::util::DrawIndexedIndirectArgs>() as u64;

/// A live object as seen by the groups at encode time.
#[derive(Debug, Clone)]
pub struct BatchEntry {
    pub object: Arc<RenderObject>,
    pub matrix_index: u32,
    pub mesh: MeshInfo,
}

/// Consecutive draw arguments sharing one shader and material.
#[derive(Debug, Clone)]
pub struct DrawSegment {
    pub shader: Arc<Shader>,
    pub material: Arc<Material>,
    pub args: Range<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchPlan {
    pub args: Vec<IndirectArg>,
    pub batch_indices: Vec<u32>,
    pub segments: Vec<DrawSegment>,
}

impl BatchPlan {
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn instance_count(&self) -> u32 {
        self.args.iter().map(|arg| arg.instance_count).sum()
    }

    /// Walks `entries` in effective-key order and emits one argument per
    /// maximal run of the same mesh under the same material.
    pub fn build(entries: &[BatchEntry], replacement: Option<&Arc<Material>>) -> Self {
        let mut drawable: Vec<(&BatchEntry, &Arc<Material>, &Arc<Shader>)> = entries
            .iter()
            .filter_map(|entry| {
                let material = replacement.unwrap_or_else(|| entry.object.material());
                let Some(shader) = material.shader() else {
                    log::trace!(
                        "Skipping object {}: material {} has no shader",
                        entry.object.id().raw(),
                        material.name()
                    );
                    return None;
                };
                Some((entry, material, shader))
            })
            .collect();
        drawable.sort_by_key(|(entry, material, shader)| {
            (shader.id(), material.id(), entry.object.mesh().id())
        });

        let mut plan = BatchPlan::default();
        let mut run: Option<(MeshId, &Arc<Material>)> = None;
        for (entry, material, shader) in drawable {
            let instance = plan.batch_indices.len() as u32;
            plan.batch_indices.push(entry.matrix_index);

            let mesh_id = entry.object.mesh().id();
            let same_run = run.is_some_and(|(mesh, mat)| mesh == mesh_id && Arc::ptr_eq(mat, material));
            if same_run {
                if let Some(arg) = plan.args.last_mut() {
                    arg.instance_count += 1;
                }
                continue;
            }

            run = Some((mesh_id, material));
            let arg_index = plan.args.len() as u32;
            plan.args.push(IndirectArg {
                base_instance_id: instance,
                index_count: entry.mesh.index_count(),
                instance_count: 1,
                start_index_location: entry.mesh.first_index(),
                base_vertex_location: entry.mesh.base_vertex(),
                start_instance_location: instance,
            });

            match plan.segments.last_mut() {
                Some(segment) if Arc::ptr_eq(&segment.material, material) => {
                    segment.args.end = arg_index + 1;
                }
                _ => plan.segments.push(DrawSegment {
                    shader: Arc::clone(shader),
                    material: Arc::clone(material),
                    args: arg_index..arg_index + 1,
                }),
            }
        }

        plan
    }
}

/// Resources shared by every group when recording a frame.
pub struct DrawContext<'a> {
    pub device: &'a wgpu::Device,
    pub layouts: &'a BatchLayouts,
    pub mesh_buffers: Option<(wgpu::Buffer, wgpu::Buffer)>,
    pub matrices: Option<SrvHandle>,
    pub matrices_key: ResourceKey,
    pub view: &'a wgpu::BindGroup,
    pub target: &'a RenderTarget,
    pub multi_draw: bool,
}

struct DrawCall {
    pipeline: wgpu::RenderPipeline,
    material_slot: u32,
    material: wgpu::BindGroup,
    batch_slot: u32,
    args: Range<u32>,
}

/// A recorded render pass, captured by value for the render thread.
pub struct BatchCmd {
    label: &'static str,
    color: Option<wgpu::TextureView>,
    depth: Option<wgpu::TextureView>,
    mesh_buffers: Option<(wgpu::Buffer, wgpu::Buffer)>,
    view: Option<wgpu::BindGroup>,
    batch: Option<wgpu::BindGroup>,
    args_buffer: Option<wgpu::Buffer>,
    args: Vec<IndirectArg>,
    draws: Vec<DrawCall>,
    multi_draw: bool,
}

impl BatchCmd {
    pub fn empty(label: &'static str) -> Self {
        Self {
            label,
            color: None,
            depth: None,
            mesh_buffers: None,
            view: None,
            batch: None,
            args_buffer: None,
            args: Vec::new(),
            draws: Vec::new(),
            multi_draw: true,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    /// Draw calls the pass issues: one per segment, or one per argument
    /// without multi-draw support.
    pub fn draw_call_count(&self) -> usize {
        if self.multi_draw {
            self.draws.len()
        } else {
            self.args.len()
        }
    }

    pub fn record(self, encoder: &mut wgpu::CommandEncoder) {
        let (Some(mesh_buffers), Some(view), Some(batch), Some(args_buffer)) =
            (&self.mesh_buffers, &self.view, &self.batch, &self.args_buffer)
        else {
            return;
        };
        if self.draws.is_empty() {
            return;
        }

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = self
            .color
            .iter()
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(self.label),
            color_attachments: &color_attachments,
            depth_stencil_attachment: self.depth.as_ref().map(|view| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        BatchMesh::bind_mesh(&mut pass, mesh_buffers);
        pass.set_bind_group(0, view, &[]);

        for draw in &self.draws {
            pass.set_pipeline(&draw.pipeline);
            pass.set_bind_group(draw.batch_slot, batch, &[]);
            pass.set_bind_group(draw.material_slot, &draw.material, &[]);

            if self.multi_draw {
                pass.multi_draw_indexed_indirect(
                    args_buffer,
                    draw.args.start as u64 * DRAW_ARGS_SIZE,
                    draw.args.end - draw.args.start,
                );
            } else {
                for arg in &self.args[draw.args.start as usize..draw.args.end as usize] {
                    let first = arg.start_index_location;
                    let instance = arg.start_instance_location;
                    pass.draw_indexed(
                        first..first + arg.index_count,
                        arg.base_vertex_location,
                        instance..instance + arg.instance_count,
                    );
                }
            }
        }
    }
}

/// Backing resources of the matrix and batch-index bindings. Descriptor slot
/// numbers are reused after a regrow, so only these identify a bind group.
type BindingKey = (ResourceKey, ResourceKey);

/// One pass worth of batched draws over the shared mesh and matrix buffers.
///
/// With a replacement material every object is drawn with it instead of its
/// own, as the shadow pass does.
pub struct BatchRenderGroup {
    name: &'static str,
    replacement: Option<Arc<Material>>,
    args_buffer: GrowableGpuBuffer,
    indices_buffer: GrowableGpuBuffer,
    plan: BatchPlan,
    bind_group: Option<(BindingKey, wgpu::BindGroup)>,
}

impl BatchRenderGroup {
    pub fn new(
        name: &'static str,
        replacement: Option<Arc<Material>>,
        initial_args: u32,
        initial_indices: u32,
    ) -> Self {
        Self {
            name,
            replacement,
            args_buffer: GrowableGpuBuffer::new(
                "Batch Indirect Arg Buffer",
                wgpu::BufferUsages::INDIRECT,
                initial_args.max(1) as u64 * DRAW_ARGS_SIZE,
            ),
            indices_buffer: GrowableGpuBuffer::new(
                "Batch Indices Buffer",
                wgpu::BufferUsages::STORAGE,
                initial_indices.max(1) as u64 * 4,
            ),
            plan: BatchPlan::default(),
            bind_group: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn replacement(&self) -> Option<&Arc<Material>> {
        self.replacement.as_ref()
    }

    pub fn plan(&self) -> &BatchPlan {
        &self.plan
    }

    pub fn args_buffer(&self) -> &GrowableGpuBuffer {
        &self.args_buffer
    }

    pub fn indices_buffer(&self) -> &GrowableGpuBuffer {
        &self.indices_buffer
    }

    fn binding_key(&self, matrices: ResourceKey) -> BindingKey {
        (matrices, self.indices_buffer.resource_key())
    }

    /// Rebuilds the plan from `entries` and stages its argument and
    /// batch-index arrays.
    pub fn encode(&mut self, entries: &[BatchEntry]) -> Result<&BatchPlan> {
        self.plan = BatchPlan::build(entries, self.replacement.as_ref());
        if self.plan.is_empty() {
            return Ok(&self.plan);
        }

        let mut args_bytes = Vec::with_capacity(self.plan.args.len() * DRAW_ARGS_SIZE as usize);
        for arg in &self.plan.args {
            args_bytes.extend_from_slice(arg.to_draw_args().as_bytes());
        }
        self.args_buffer.reserve(args_bytes.len() as u64);
        self.args_buffer.write_at(0, &args_bytes)?;

        let index_bytes: &[u8] = bytemuck::cast_slice(&self.plan.batch_indices);
        self.indices_buffer.reserve(index_bytes.len() as u64);
        self.indices_buffer.write_at(0, index_bytes)?;

        log::debug!(
            "{}: {} instances, {} draw args, {} segments",
            self.name,
            self.plan.batch_indices.len(),
            self.plan.args.len(),
            self.plan.segments.len()
        );
        Ok(&self.plan)
    }

    pub fn flush(&mut self, device: &wgpu::Device, recycle: &RecycleBin) -> Vec<BufferUpload> {
        [
            self.args_buffer.flush(device, recycle),
            self.indices_buffer.flush(device, recycle),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Captures everything the pass needs so it can be recorded later on the
    /// render thread. An empty plan yields an empty command.
    pub fn create_cmd(
        &mut self,
        ctx: &DrawContext<'_>,
        pool: &DescriptorPool,
        signatures: &mut SignatureCache<BatchSignature>,
    ) -> Result<BatchCmd> {
        let mut cmd = BatchCmd::empty(self.name);
        if self.plan.is_empty() {
            return Ok(cmd);
        }
        let (Some(matrices), Some(args_buffer)) = (ctx.matrices.clone(), self.args_buffer.resource().cloned())
        else {
            log::warn!("{}: buffers not flushed, skipping pass", self.name);
            return Ok(cmd);
        };
        let Some(indices) = self.indices_buffer.shader_view(pool)? else {
            return Ok(cmd);
        };

        let Some(batch) = self.batch_bind_group(ctx, &matrices, &indices) else {
            return Ok(cmd);
        };

        for segment in &self.plan.segments {
            let signature = signatures.get_or_create(&segment.shader, |slot| {
                BatchSignature::new(ctx.device, ctx.layouts, slot)
            });
            cmd.draws.push(DrawCall {
                pipeline: segment.shader.pipeline(
                    ctx.device,
                    &signature,
                    PipelineKey {
                        state: segment.material.state(),
                        color_format: ctx.target.color_format(),
                        depth_format: ctx.target.depth_format(),
                    },
                ),
                material_slot: segment.shader.material_slot(),
                material: segment.material.bind_group(ctx.device, &ctx.layouts.material),
                batch_slot: segment.shader.batch_slot(),
                args: segment.args.clone(),
            });
        }

        cmd.batch = Some(batch);
        cmd.color = ctx.target.color_views().next().cloned();
        cmd.depth = ctx.target.depth_view().cloned();
        cmd.mesh_buffers = ctx.mesh_buffers.clone();
        cmd.view = Some(ctx.view.clone());
        cmd.args_buffer = Some(args_buffer);
        cmd.args = self.plan.args.clone();
        cmd.multi_draw = ctx.multi_draw;
        Ok(cmd)
    }

    fn batch_bind_group(
        &mut self,
        ctx: &DrawContext<'_>,
        matrices: &SrvHandle,
        indices: &SrvHandle,
    ) -> Option<wgpu::BindGroup> {
        let key = self.binding_key(ctx.matrices_key);
        if let Some((cached, group)) = &self.bind_group {
            if *cached == key {
                return Some(group.clone());
            }
        }

        let (ShaderView::Buffer(matrix_buffer), ShaderView::Buffer(index_buffer)) =
            (matrices.value(), indices.value())
        else {
            log::error!("{}: batch storage views must be buffers", self.name);
            return None;
        };
        log::debug!(
            "{}: rebuilding batch bind group (views {} and {})",
            self.name,
            matrices.index(),
            indices.index()
        );

        let group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("BatchStorageBindGroup"),
            layout: &ctx.layouts.batch,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: matrix_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: index_buffer.as_entire_binding(),
                },
            ],
        });
        self.bind_group = Some((key, group.clone()));
        Some(group)
    }
}
