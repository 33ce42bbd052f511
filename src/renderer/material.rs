use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::renderer::Shader;

static NEXT_MATERIAL_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(u64);

impl MaterialId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthTest {
    Always,
    Never,
    #[default]
    Less,
    LessEqual,
    Equal,
    Greater,
}

impl DepthTest {
    pub fn to_wgpu(self) -> wgpu::CompareFunction {
        match self {
            DepthTest::Always => wgpu::CompareFunction::Always,
            DepthTest::Never => wgpu::CompareFunction::Never,
            DepthTest::Less => wgpu::CompareFunction::Less,
            DepthTest::LessEqual => wgpu::CompareFunction::LessEqual,
            DepthTest::Equal => wgpu::CompareFunction::Equal,
            DepthTest::Greater => wgpu::CompareFunction::Greater,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    Off,
    #[default]
    Back,
    Front,
}

impl CullMode {
    pub fn to_wgpu(self) -> Option<wgpu::Face> {
        match self {
            CullMode::Off => None,
            CullMode::Back => Some(wgpu::Face::Back),
            CullMode::Front => Some(wgpu::Face::Front),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    #[default]
    Opaque,
    Alpha,
    Additive,
}

impl BlendMode {
    pub fn to_wgpu(self) -> Option<wgpu::BlendState> {
        match self {
            BlendMode::Opaque => None,
            BlendMode::Alpha => Some(wgpu::BlendState::ALPHA_BLENDING),
            BlendMode::Additive => Some(wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent::OVER,
            }),
        }
    }
}

/// Fixed-function toggles a material contributes to its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderState {
    pub depth_test: DepthTest,
    pub depth_write: bool,
    pub cull: CullMode,
    pub blend: BlendMode,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            depth_test: DepthTest::Less,
            depth_write: true,
            cull: CullMode::Back,
            blend: BlendMode::Opaque,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable, PartialEq)]
pub struct MaterialParams {
    pub base_color: [f32; 4],
}

impl Default for MaterialParams {
    fn default() -> Self {
        Self {
            base_color: [1.0; 4],
        }
    }
}

pub struct Material {
    id: MaterialId,
    name: String,
    shader: Option<Arc<Shader>>,
    state: RenderState,
    params: MaterialParams,
    bind_group: OnceLock<wgpu::BindGroup>,
}

impl std::fmt::Debug for Material {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Material")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("shader", &self.shader.as_ref().map(|s| s.name()))
            .field("state", &self.state)
            .finish()
    }
}

impl Material {
    pub fn new(name: impl Into<String>, shader: Option<Arc<Shader>>) -> Self {
        Self {
            id: MaterialId(NEXT_MATERIAL_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            shader,
            state: RenderState::default(),
            params: MaterialParams::default(),
            bind_group: OnceLock::new(),
        }
    }

    pub fn with_state(mut self, state: RenderState) -> Self {
        self.state = state;
        self
    }

    pub fn with_color(mut self, color: [f32; 4]) -> Self {
        self.params.base_color = color;
        self
    }

    pub fn id(&self) -> MaterialId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `None` marks a material that is not ready to draw; batching skips it.
    pub fn shader(&self) -> Option<&Arc<Shader>> {
        self.shader.as_ref()
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn params(&self) -> &MaterialParams {
        &self.params
    }

    /// Uniform bind group holding [`MaterialParams`], created on first use.
    pub fn bind_group(&self, device: &wgpu::Device, layout: &wgpu::BindGroupLayout) -> wgpu::BindGroup {
        self.bind_group
            .get_or_init(|| {
                let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("MaterialParamsBuffer"),
                    contents: bytemuck::bytes_of(&self.params),
                    usage: wgpu::BufferUsages::UNIFORM,
                });
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&self.name),
                    layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    }],
                })
            })
            .clone()
    }
}
