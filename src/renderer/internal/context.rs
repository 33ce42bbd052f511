use crate::error::{RenderError, Result};
use crate::renderer::thread::CommandRecorder;

/// Device and queue for offscreen batch rendering.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: wgpu::AdapterInfo,
    /// Indirect draws may carry a non-zero first instance.
    pub indirect_first_instance: bool,
}

impl GpuContext {
    pub async fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|err| RenderError::NoAdapter(err.to_string()))?;

        let adapter_info = adapter.get_info();
        log::info!("Using adapter: {:?}", adapter_info);
        log::info!("Using backend: {:?}", adapter_info.backend);
        let adapter_features = adapter.features();

        let mut required_features = wgpu::Features::empty();
        let indirect_first_instance =
            if adapter_features.contains(wgpu::Features::INDIRECT_FIRST_INSTANCE) {
                required_features |= wgpu::Features::INDIRECT_FIRST_INSTANCE;
                log::info!("Indirect multi-draw enabled");
                true
            } else {
                log::warn!("INDIRECT_FIRST_INSTANCE not supported, falling back to direct draws");
                false
            };

        let mut limits = wgpu::Limits::default();
        limits.max_bind_groups = limits.max_bind_groups.max(4);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Device"),
                required_features,
                required_limits: limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await?;

        Ok(Self {
            device,
            queue,
            adapter_info,
            indirect_first_instance,
        })
    }
}

/// [`CommandRecorder`] over a wgpu queue. Lives on the render thread.
pub struct WgpuRecorder {
    device: wgpu::Device,
    queue: wgpu::Queue,
    encoder: Option<wgpu::CommandEncoder>,
    in_flight: Option<wgpu::SubmissionIndex>,
    submitted: u64,
}

impl WgpuRecorder {
    pub fn new(context: &GpuContext) -> Self {
        Self {
            device: context.device.clone(),
            queue: context.queue.clone(),
            encoder: None,
            in_flight: None,
            submitted: 0,
        }
    }

    /// The frame's encoder, created on first use.
    pub fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        self.encoder.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Frame Encoder"),
                })
        })
    }

    pub fn submitted(&self) -> u64 {
        self.submitted
    }
}

impl CommandRecorder for WgpuRecorder {
    fn begin(&mut self) -> Result<()> {
        if self.encoder.take().is_some() {
            log::warn!("Discarding commands left from an unsubmitted frame");
        }
        Ok(())
    }

    fn submit(&mut self) -> Result<()> {
        let Some(encoder) = self.encoder.take() else {
            return Ok(());
        };
        self.in_flight = Some(self.queue.submit(std::iter::once(encoder.finish())));
        self.submitted += 1;
        Ok(())
    }

    fn wait_for_fence(&mut self) -> Result<()> {
        let Some(index) = self.in_flight.take() else {
            return Ok(());
        };
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: Some(index),
                timeout: None,
            })
            .map_err(|err| RenderError::Fence(err.to_string()))?;
        Ok(())
    }
}
