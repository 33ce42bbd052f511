pub mod slot_pool;

use std::sync::Arc;

pub use slot_pool::{SlotHandle, SlotPool};

use crate::error::{RenderError, Result};
use crate::renderer::thread::RecycleBin;
use crate::settings::PoolSizes;

/// A resource exposed to shaders through the bindless view table.
#[derive(Debug, Clone)]
pub enum ShaderView {
    Buffer(wgpu::Buffer),
    Texture(wgpu::TextureView),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Point,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapMode {
    Repeat,
    Clamp,
    Mirror,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    pub filter: FilterMode,
    pub wrap: WrapMode,
}

impl SamplerDesc {
    fn to_wgpu(self) -> wgpu::SamplerDescriptor<'static> {
        let address_mode = match self.wrap {
            WrapMode::Repeat => wgpu::AddressMode::Repeat,
            WrapMode::Clamp => wgpu::AddressMode::ClampToEdge,
            WrapMode::Mirror => wgpu::AddressMode::MirrorRepeat,
        };
        let filter = match self.filter {
            FilterMode::Point => wgpu::FilterMode::Nearest,
            FilterMode::Linear => wgpu::FilterMode::Linear,
        };
        wgpu::SamplerDescriptor {
            label: Some("PooledSampler"),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: filter,
            ..Default::default()
        }
    }
}

pub struct PooledSampler {
    pub desc: SamplerDesc,
    pub sampler: wgpu::Sampler,
}

pub type SrvHandle = Arc<SlotHandle<ShaderView>>;
pub type SamplerHandle = Arc<SlotHandle<PooledSampler>>;
pub type RtvHandle = Arc<SlotHandle<wgpu::TextureView>>;
pub type DsvHandle = Arc<SlotHandle<wgpu::TextureView>>;

/// Attachment layout of an offscreen render target.
#[derive(Debug, Clone)]
pub struct RenderTargetDesc {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub colors: Vec<wgpu::TextureFormat>,
    pub depth: Option<wgpu::TextureFormat>,
}

impl RenderTargetDesc {
    pub fn validate(&self) -> Result<()> {
        if self.colors.is_empty() && self.depth.is_none() {
            log::error!("Render target {} has no attachments", self.label);
            return Err(RenderError::InvalidAttachmentSet);
        }
        Ok(())
    }
}

pub struct ColorAttachment {
    pub texture: wgpu::Texture,
    pub rtv: RtvHandle,
    pub srv: SrvHandle,
}

pub struct DepthAttachment {
    pub texture: wgpu::Texture,
    pub dsv: DsvHandle,
    pub srv: SrvHandle,
}

pub struct RenderTarget {
    pub desc: RenderTargetDesc,
    pub colors: Vec<ColorAttachment>,
    pub depth: Option<DepthAttachment>,
}

impl RenderTarget {
    pub fn color_views(&self) -> impl Iterator<Item = &wgpu::TextureView> {
        self.colors.iter().map(|c| c.rtv.value())
    }

    pub fn depth_view(&self) -> Option<&wgpu::TextureView> {
        self.depth.as_ref().map(|d| d.dsv.value())
    }

    pub fn color_format(&self) -> Option<wgpu::TextureFormat> {
        self.desc.colors.first().copied()
    }

    pub fn depth_format(&self) -> Option<wgpu::TextureFormat> {
        self.desc.depth
    }

    pub fn textures(&self) -> impl Iterator<Item = &wgpu::Texture> {
        self.colors
            .iter()
            .map(|c| &c.texture)
            .chain(self.depth.iter().map(|d| &d.texture))
    }

    /// Hands the textures to `recycle`; the views' slots free as the handles
    /// drop.
    pub fn retire(self, recycle: &RecycleBin) {
        for texture in self.textures() {
            recycle.add(texture.clone());
        }
    }
}

/// Shader-visible view, sampler, render-target and depth view pools.
pub struct DescriptorPool {
    srv: SlotPool<ShaderView>,
    samplers: SlotPool<PooledSampler>,
    rtv: SlotPool<wgpu::TextureView>,
    dsv: SlotPool<wgpu::TextureView>,
}

impl DescriptorPool {
    pub fn new(sizes: &PoolSizes) -> Self {
        Self {
            srv: SlotPool::new("srv", sizes.srv),
            samplers: SlotPool::new("sampler", sizes.sampler),
            rtv: SlotPool::new("rtv", sizes.rtv),
            dsv: SlotPool::new("dsv", sizes.dsv),
        }
    }

    pub fn alloc_srv(&self, view: ShaderView) -> Result<SrvHandle> {
        self.srv.alloc(view)
    }

    /// Reuses a live sampler with the same filter and wrap mode when one exists.
    pub fn alloc_sampler(&self, device: &wgpu::Device, desc: SamplerDesc) -> Result<SamplerHandle> {
        self.samplers.find_or_alloc(
            |pooled| pooled.desc == desc,
            || {
                Ok(PooledSampler {
                    desc,
                    sampler: device.create_sampler(&desc.to_wgpu()),
                })
            },
        )
    }

    pub fn alloc_rtv(&self, view: wgpu::TextureView) -> Result<RtvHandle> {
        self.rtv.alloc(view)
    }

    pub fn alloc_dsv(&self, view: wgpu::TextureView) -> Result<DsvHandle> {
        self.dsv.alloc(view)
    }

    pub fn alloc_render_target(
        &self,
        device: &wgpu::Device,
        desc: RenderTargetDesc,
    ) -> Result<RenderTarget> {
        desc.validate()?;

        let size = wgpu::Extent3d {
            width: desc.width.max(1),
            height: desc.height.max(1),
            depth_or_array_layers: 1,
        };
        let create = |format: wgpu::TextureFormat| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(desc.label),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            })
        };

        let mut colors = Vec::with_capacity(desc.colors.len());
        for &format in &desc.colors {
            let texture = create(format);
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            colors.push(ColorAttachment {
                rtv: self.alloc_rtv(view.clone())?,
                srv: self.alloc_srv(ShaderView::Texture(view))?,
                texture,
            });
        }

        let depth = match desc.depth {
            Some(format) => {
                let texture = create(format);
                let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
                Some(DepthAttachment {
                    dsv: self.alloc_dsv(view.clone())?,
                    srv: self.alloc_srv(ShaderView::Texture(view))?,
                    texture,
                })
            }
            None => None,
        };

        log::info!(
            "Allocated render target {} ({}x{}, {} color, depth: {})",
            desc.label,
            size.width,
            size.height,
            colors.len(),
            depth.is_some()
        );

        Ok(RenderTarget {
            desc,
            colors,
            depth,
        })
    }

    pub fn stats(&self) -> DescriptorStats {
        DescriptorStats {
            srv: self.srv.live(),
            samplers: self.samplers.live(),
            rtv: self.rtv.live(),
            dsv: self.dsv.live(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DescriptorStats {
    pub srv: usize,
    pub samplers: usize,
    pub rtv: usize,
    pub dsv: usize,
}
