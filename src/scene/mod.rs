pub mod camera;
pub mod components;
pub(crate) mod internal;
pub mod scene;
pub mod transform;

pub use camera::{Camera, DirectionalLight};
pub use components::{
    Children, MaterialComponent, MeshComponent, Name, Parent, Renderable, TransformComponent,
    Visible, WorldTransform,
};
pub use internal::rendering::SyncStats;
pub use scene::Scene;
pub use transform::Transform;
