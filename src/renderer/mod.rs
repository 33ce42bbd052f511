pub mod batch;
pub mod descriptor;
pub mod frame;
pub mod gpu_buffer;
pub mod internal;
pub mod material;
pub mod pipeline_builder;
pub mod primitives;
pub mod render_object;
pub mod shader;
pub mod slot_table;
pub mod thread;
pub mod transitions;
pub mod vertex;

pub use batch::{BatchPass, BatchRenderer};
pub use descriptor::DescriptorPool;
pub use frame::{FrameRenderer, FrameStats, FrameView};
pub use gpu_buffer::GrowableGpuBuffer;
pub use internal::context::{GpuContext, WgpuRecorder};
pub use material::{BlendMode, CullMode, DepthTest, Material, RenderState};
pub use pipeline_builder::PipelineBuilder;
pub use primitives::{cube_mesh, plane_mesh, sphere_mesh};
pub use render_object::{ObjectConstants, RenderObject};
pub use shader::Shader;
pub use slot_table::KeyedSlotTable;
pub use vertex::Vertex;
