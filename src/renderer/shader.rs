use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::renderer::batch::signature::BatchSignature;
use crate::renderer::material::RenderState;
use crate::renderer::{PipelineBuilder, Vertex};

pub const LIT_BATCH_WGSL: &str = include_str!("../shader/batch_lit.wgsl");
pub const SHADOW_BATCH_WGSL: &str = include_str!("../shader/draw_shadow.wgsl");

static NEXT_SHADER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(u64);

impl ShaderId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Everything a compiled pipeline depends on besides the shader itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub state: RenderState,
    pub color_format: Option<wgpu::TextureFormat>,
    pub depth_format: Option<wgpu::TextureFormat>,
}

/// A WGSL program plus its binding contract.
///
/// `batch_slot` is the bind group index the shader reads its matrix and
/// batch-index storage buffers from. Group 0 is always the view uniform;
/// the material uniform takes the remaining slot.
pub struct Shader {
    id: ShaderId,
    name: String,
    source: Cow<'static, str>,
    batch_slot: u32,
    fragment: bool,
    module: OnceLock<wgpu::ShaderModule>,
    pipelines: Mutex<HashMap<PipelineKey, wgpu::RenderPipeline>>,
}

impl std::fmt::Debug for Shader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shader")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("batch_slot", &self.batch_slot)
            .finish()
    }
}

impl Shader {
    pub fn new(name: impl Into<String>, source: impl Into<Cow<'static, str>>, batch_slot: u32) -> Self {
        debug_assert!(batch_slot == 1 || batch_slot == 2, "group 0 is reserved for the view");
        Self {
            id: ShaderId(NEXT_SHADER_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            source: source.into(),
            batch_slot,
            fragment: true,
            module: OnceLock::new(),
            pipelines: Mutex::new(HashMap::new()),
        }
    }

    pub fn lit() -> Self {
        Self::new("batch_lit", LIT_BATCH_WGSL, 2)
    }

    pub fn shadow() -> Self {
        Self::new("draw_shadow", SHADOW_BATCH_WGSL, 1).depth_only()
    }

    pub fn depth_only(mut self) -> Self {
        self.fragment = false;
        self
    }

    pub fn id(&self) -> ShaderId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn batch_slot(&self) -> u32 {
        self.batch_slot
    }

    pub fn material_slot(&self) -> u32 {
        if self.batch_slot == 1 {
            2
        } else {
            1
        }
    }

    pub fn has_fragment(&self) -> bool {
        self.fragment
    }

    fn module(&self, device: &wgpu::Device) -> &wgpu::ShaderModule {
        self.module.get_or_init(|| {
            log::info!("Compiling shader {}", self.name);
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&self.name),
                source: wgpu::ShaderSource::Wgsl(self.source.clone()),
            })
        })
    }

    pub fn cached_pipelines(&self) -> usize {
        self.pipelines.lock().len()
    }

    /// Returns the pipeline for `key`, building it on first request.
    pub fn pipeline(
        &self,
        device: &wgpu::Device,
        signature: &BatchSignature,
        key: PipelineKey,
    ) -> wgpu::RenderPipeline {
        if let Some(pipeline) = self.pipelines.lock().get(&key) {
            return pipeline.clone();
        }

        let module = self.module(device);
        let mut builder = PipelineBuilder::new(device, &signature.pipeline_layout, module)
            .with_label(&self.name)
            .with_vertex_buffer(Vertex::layout())
            .with_cull_mode(key.state.cull.to_wgpu());

        if let Some(format) = key.depth_format {
            builder = if self.fragment {
                builder.with_depth_stencil(
                    format,
                    key.state.depth_write,
                    key.state.depth_test.to_wgpu(),
                )
            } else {
                builder.with_depth_stencil_biased(
                    format,
                    key.state.depth_write,
                    key.state.depth_test.to_wgpu(),
                    2,
                    2.0,
                )
            };
        }

        builder = match key.color_format {
            Some(format) if self.fragment => {
                builder.with_color_target(format, key.state.blend.to_wgpu())
            }
            _ => builder.depth_only(),
        };

        let pipeline = builder.build();
        log::debug!("Built pipeline for {} ({:?})", self.name, key);
        self.pipelines.lock().insert(key, pipeline.clone());
        pipeline
    }
}
