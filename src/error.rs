use thiserror::Error;

/// Failures surfaced by the batch core.
///
/// Capacity and lookup errors abort the frame that hit them. Nothing in the
/// crate retries; callers either fix their configuration or stop rendering.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("{pool} pool exhausted (capacity {capacity})")]
    PoolExhausted { pool: &'static str, capacity: usize },

    #[error("unknown key {key:#018x} in {owner}")]
    UnknownKey { owner: &'static str, key: u64 },

    #[error("mesh {mesh} ({name}) was never registered")]
    UnregisteredMesh { mesh: u64, name: String },

    #[error("render target requested without any color or depth attachment")]
    InvalidAttachmentSet,

    #[error("key generator produced a live key {key:#018x} in {owner}")]
    OutOfKeySpace { owner: &'static str, key: u64 },

    #[error("{owner}: {len} bytes at offset {offset} exceed limit of {limit} bytes")]
    OutOfBounds {
        owner: &'static str,
        offset: u64,
        len: u64,
        limit: u64,
    },

    #[error("no suitable GPU adapter: {0}")]
    NoAdapter(String),

    #[error("failed to create device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("fence wait failed: {0}")]
    Fence(String),

    #[error("render thread failure: {0}")]
    RenderThread(String),
}

pub type Result<T, E = RenderError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_diagnostic_context() {
        let err = RenderError::UnknownKey {
            owner: "BatchMatrixBuffer",
            key: 0xbeef,
        };
        let text = err.to_string();
        assert!(text.contains("BatchMatrixBuffer"));
        assert!(text.contains("beef"));

        let err = RenderError::PoolExhausted {
            pool: "sampler",
            capacity: 32,
        };
        assert_eq!(err.to_string(), "sampler pool exhausted (capacity 32)");
    }
}
