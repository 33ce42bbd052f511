use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;

use crate::error::Result;
use crate::renderer::batch::{BatchPass, BatchRenderer, PassContext};
use crate::renderer::descriptor::{DescriptorPool, DescriptorStats, RenderTarget, RenderTargetDesc};
use crate::renderer::internal::context::{GpuContext, WgpuRecorder};
use crate::renderer::thread::{RecycleBin, RenderThread};
use crate::renderer::transitions::{ResourceState, ResourceStateTracker};
use crate::settings::BatchSettings;

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const SHADOW_MAP_SIZE: u32 = 2048;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ViewUniform {
    pub view_proj: [[f32; 4]; 4],
    pub light_dir: [f32; 4],
}

impl ViewUniform {
    pub fn new(view_proj: Mat4, light_dir: Vec3) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            light_dir: light_dir.normalize_or_zero().extend(0.0).to_array(),
        }
    }
}

impl Default for ViewUniform {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Vec3::NEG_Y)
    }
}

/// Camera and light matrices for one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameView {
    pub camera_view_proj: Mat4,
    pub light_view_proj: Mat4,
    pub light_dir: Vec3,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame: u64,
    pub live_objects: usize,
    pub draw_args: usize,
    pub segments: usize,
    pub uploads: usize,
    pub transitions: usize,
    pub recycled: usize,
}

struct ViewBinding {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl ViewBinding {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, label: &'static str) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::bytes_of(&ViewUniform::default()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        Self { buffer, bind_group }
    }
}

/// Drives one frame: drain, encode, upload, record, submit, wait.
pub struct FrameRenderer {
    context: GpuContext,
    pool: DescriptorPool,
    batch: BatchRenderer,
    thread: RenderThread<WgpuRecorder>,
    recycle: Arc<RecycleBin>,
    tracker: ResourceStateTracker,
    main_target: RenderTarget,
    shadow_target: Option<RenderTarget>,
    main_view: ViewBinding,
    shadow_view: ViewBinding,
    stats: FrameStats,
}

impl FrameRenderer {
    pub fn new(context: GpuContext, settings: &BatchSettings) -> Result<Self> {
        let pool = DescriptorPool::new(&settings.pools);
        let mut batch = BatchRenderer::new(settings);
        let recycle = Arc::new(RecycleBin::new());
        let thread = RenderThread::spawn(WgpuRecorder::new(&context), Arc::clone(&recycle))?;

        let main_target = pool.alloc_render_target(
            &context.device,
            RenderTargetDesc {
                label: "MainTarget",
                width: settings.resolution.width,
                height: settings.resolution.height,
                colors: vec![COLOR_FORMAT],
                depth: Some(DEPTH_FORMAT),
            },
        )?;
        let shadow_target = if settings.shadow_pass {
            Some(pool.alloc_render_target(
                &context.device,
                RenderTargetDesc {
                    label: "ShadowMap",
                    width: SHADOW_MAP_SIZE,
                    height: SHADOW_MAP_SIZE,
                    colors: Vec::new(),
                    depth: Some(DEPTH_FORMAT),
                },
            )?)
        } else {
            None
        };

        let layouts = batch.layouts(&context.device);
        let main_view = ViewBinding::new(&context.device, &layouts.view, "MainViewUniform");
        let shadow_view = ViewBinding::new(&context.device, &layouts.view, "ShadowViewUniform");

        Ok(Self {
            context,
            pool,
            batch,
            thread,
            recycle,
            tracker: ResourceStateTracker::new(),
            main_target,
            shadow_target,
            main_view,
            shadow_view,
            stats: FrameStats::default(),
        })
    }

    pub fn batch(&self) -> &BatchRenderer {
        &self.batch
    }

    pub fn batch_mut(&mut self) -> &mut BatchRenderer {
        &mut self.batch
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn descriptor_stats(&self) -> DescriptorStats {
        self.pool.stats()
    }

    pub fn set_view(&mut self, view: &FrameView) {
        let queue = &self.context.queue;
        queue.write_buffer(
            &self.main_view.buffer,
            0,
            bytemuck::bytes_of(&ViewUniform::new(view.camera_view_proj, view.light_dir)),
        );
        queue.write_buffer(
            &self.shadow_view.buffer,
            0,
            bytemuck::bytes_of(&ViewUniform::new(view.light_view_proj, view.light_dir)),
        );
    }

    /// Replaces the main target; the old textures outlive the frames that
    /// may still sample them.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let target = self.pool.alloc_render_target(
            &self.context.device,
            RenderTargetDesc {
                label: "MainTarget",
                width,
                height,
                colors: vec![COLOR_FORMAT],
                depth: Some(DEPTH_FORMAT),
            },
        )?;
        std::mem::replace(&mut self.main_target, target).retire(&self.recycle);
        Ok(())
    }

    pub fn render(&mut self) -> Result<FrameStats> {
        self.batch.register_actually()?;
        self.batch.encode_cmd()?;

        let uploads = self.batch.flush(&self.context.device, &self.recycle);
        // Copy and read transitions share one batch so a buffer already in its
        // read state round-trips away and the rest coalesce to one barrier.
        for upload in &uploads {
            self.tracker.transition(upload.buffer_id(), ResourceState::COPY_DEST);
            self.tracker
                .transition(upload.buffer_id(), ResourceState::read_state(upload.usage()));
        }
        let transitions = self.tracker.apply().len();

        let upload_count = uploads.len();
        self.thread.add_cmd(move |recorder: &mut WgpuRecorder| {
            let encoder = recorder.encoder();
            for upload in &uploads {
                upload.record(encoder);
            }
        });

        let multi_draw = self.context.indirect_first_instance;
        if let Some(shadow_target) = &self.shadow_target {
            let cmd = self.batch.create_cmd(
                BatchPass::Shadow,
                &PassContext {
                    device: &self.context.device,
                    pool: &self.pool,
                    view: &self.shadow_view.bind_group,
                    target: shadow_target,
                    multi_draw,
                },
            )?;
            self.thread
                .add_cmd(move |recorder: &mut WgpuRecorder| cmd.record(recorder.encoder()));
        }

        let cmd = self.batch.create_cmd(
            BatchPass::Common,
            &PassContext {
                device: &self.context.device,
                pool: &self.pool,
                view: &self.main_view.bind_group,
                target: &self.main_target,
                multi_draw,
            },
        )?;
        self.thread
            .add_cmd(move |recorder: &mut WgpuRecorder| cmd.record(recorder.encoder()));

        let frame = self.thread.frame();
        let pending = self.recycle.len();
        self.thread.execute();
        self.thread.wait_for_done()?;

        let (draw_args, segments) = [BatchPass::Common, BatchPass::Shadow]
            .into_iter()
            .filter_map(|pass| self.batch.group(pass))
            .fold((0, 0), |(args, segments), group| {
                (args + group.plan().args.len(), segments + group.plan().segments.len())
            });

        self.stats = FrameStats {
            frame,
            live_objects: self.batch.live_len(),
            draw_args,
            segments,
            uploads: upload_count,
            transitions,
            recycled: pending.saturating_sub(self.recycle.len()),
        };
        log::debug!("Frame {}: {:?}", frame, self.stats);
        Ok(self.stats)
    }

    pub fn shutdown(self) {
        self.thread.shutdown(false);
        let purged = self.recycle.purge();
        log::info!("Frame renderer shut down, {} resources released", purged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_uniform_matches_wgsl_layout() {
        assert_eq!(std::mem::size_of::<ViewUniform>(), 80);
        let uniform = ViewUniform::new(Mat4::IDENTITY, Vec3::new(0.0, -2.0, 0.0));
        assert_eq!(uniform.light_dir, [0.0, -1.0, 0.0, 0.0]);
    }
}
