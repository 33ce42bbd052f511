use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glam::Mat4;
use parking_lot::Mutex;

use crate::asset::Mesh;
use crate::renderer::{Material, Shader};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderObjectId(u64);

impl RenderObjectId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Per-object transform pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectConstants {
    pub local_to_world: Mat4,
    pub world_to_local: Mat4,
}

impl Default for ObjectConstants {
    fn default() -> Self {
        Self {
            local_to_world: Mat4::IDENTITY,
            world_to_local: Mat4::IDENTITY,
        }
    }
}

impl ObjectConstants {
    pub fn from_local_to_world(local_to_world: Mat4) -> Self {
        Self {
            local_to_world,
            world_to_local: local_to_world.inverse(),
        }
    }
}

/// One drawable instance. The scene owns it; the batch renderer only
/// observes it between registration and unregistration.
#[derive(Debug)]
pub struct RenderObject {
    id: RenderObjectId,
    mesh: Arc<Mesh>,
    material: Arc<Material>,
    constants: Mutex<ObjectConstants>,
}

impl RenderObject {
    pub fn new(mesh: Arc<Mesh>, material: Arc<Material>) -> Self {
        Self::with_transform(mesh, material, Mat4::IDENTITY)
    }

    pub fn with_transform(mesh: Arc<Mesh>, material: Arc<Material>, local_to_world: Mat4) -> Self {
        Self {
            id: RenderObjectId(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed)),
            mesh,
            material,
            constants: Mutex::new(ObjectConstants::from_local_to_world(local_to_world)),
        }
    }

    pub fn id(&self) -> RenderObjectId {
        self.id
    }

    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    pub fn material(&self) -> &Arc<Material> {
        &self.material
    }

    pub fn shader(&self) -> Option<&Arc<Shader>> {
        self.material.shader()
    }

    pub fn constants(&self) -> ObjectConstants {
        *self.constants.lock()
    }

    pub fn set_constants(&self, constants: ObjectConstants) {
        *self.constants.lock() = constants;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn constants_keep_an_exact_inverse_pair() {
        let mesh = Arc::new(Mesh::new("m", Vec::new(), Vec::new()));
        let material = Arc::new(Material::new("mat", None));
        let transform = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let object = RenderObject::with_transform(mesh, material, transform);

        let constants = object.constants();
        let roundtrip = constants.world_to_local * constants.local_to_world;
        assert!(roundtrip.abs_diff_eq(Mat4::IDENTITY, 1e-6));
        assert!(object.shader().is_none());
    }
}
