use std::sync::Arc;

use hecs::World;

use super::components::*;
use super::internal::rendering::{despawn_entity, sync_render_objects, SyncStats};
use super::internal::transforms::propagate_transforms;
use crate::asset::{Assets, Handle, Mesh};
use crate::renderer::{BatchRenderer, FrameView, Material};
use crate::scene::{Camera, DirectionalLight, Transform};

/// Entities plus the assets they reference.
pub struct Scene {
    pub world: World,
    pub assets: Assets,
    pub camera: Camera,
    pub light: DirectionalLight,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            world: World::new(),
            assets: Assets::default(),
            camera: Camera::default(),
            light: DirectionalLight::default(),
        }
    }

    pub fn spawn_mesh(
        &mut self,
        name: impl Into<String>,
        mesh: Handle<Mesh>,
        material: Arc<Material>,
        transform: Transform,
    ) -> hecs::Entity {
        self.world.spawn((
            Name::new(name),
            TransformComponent(transform),
            MeshComponent(mesh),
            MaterialComponent(material),
            Visible::default(),
        ))
    }

    pub fn attach(&mut self, parent: hecs::Entity, child: hecs::Entity) -> bool {
        if self.world.insert_one(child, Parent(parent)).is_err() {
            return false;
        }
        match self.world.get::<&mut Children>(parent) {
            Ok(mut children) => {
                children.0.push(child);
                return true;
            }
            Err(hecs::ComponentError::NoSuchEntity) => return false,
            Err(hecs::ComponentError::MissingComponent(_)) => {}
        }
        self.world.insert_one(parent, Children(vec![child])).is_ok()
    }

    pub fn set_visible(&mut self, entity: hecs::Entity, visible: bool) {
        if let Ok(mut v) = self.world.get::<&mut Visible>(entity) {
            v.0 = visible;
        }
    }

    pub fn despawn(&mut self, entity: hecs::Entity, batch: &mut BatchRenderer) -> bool {
        despawn_entity(&mut self.world, entity, batch)
    }

    /// Propagates transforms and pushes the frame's changes to `batch`.
    pub fn sync(&mut self, batch: &mut BatchRenderer) -> SyncStats {
        propagate_transforms(&mut self.world);
        sync_render_objects(&mut self.world, &self.assets, batch)
    }

    pub fn frame_view(&self, aspect: f32) -> FrameView {
        FrameView {
            camera_view_proj: self.camera.view_proj(aspect),
            light_view_proj: self.light.view_proj(self.camera.target),
            light_dir: self.light.direction,
        }
    }

    pub fn entity_count(&self) -> u32 {
        self.world.len()
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}
