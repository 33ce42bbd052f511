pub mod group;
pub mod matrix;
pub mod mesh;
pub mod renderer;
pub mod signature;

pub use group::{BatchCmd, BatchEntry, BatchPlan, BatchRenderGroup, DrawSegment, IndirectArg};
pub use matrix::{BatchMatrix, BatchMatrixBuffer};
pub use mesh::{BatchMesh, MeshInfo};
pub use renderer::{BatchPass, BatchRenderer, PassContext};
pub use signature::{BatchLayouts, BatchSignature, SignatureCache};
