pub mod consumer;
pub mod recycle;
pub mod render_thread;

pub use consumer::ConsumerThread;
pub use recycle::{Recyclable, RecycleBin};
pub use render_thread::{CommandRecorder, RenderCmd, RenderThread, RenderThreadState};
