use std::sync::Arc;

use glam::Mat4;

use crate::asset::{Handle, Mesh};
use crate::renderer::{Material, RenderObject};
use crate::scene::Transform;

#[derive(Debug, Clone, Copy)]
pub struct TransformComponent(pub Transform);

/// Local-to-world matrix, written by transform propagation.
#[derive(Debug, Clone, Copy)]
pub struct WorldTransform(pub Mat4);

#[derive(Debug, Clone, Copy)]
pub struct MeshComponent(pub Handle<Mesh>);

#[derive(Debug, Clone)]
pub struct MaterialComponent(pub Arc<Material>);

#[derive(Debug, Clone, Copy)]
pub struct Visible(pub bool);

impl Default for Visible {
    fn default() -> Self {
        Self(true)
    }
}

#[derive(Debug, Clone)]
pub struct Name(pub String);

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Parent(pub hecs::Entity);

#[derive(Debug, Clone)]
pub struct Children(pub Vec<hecs::Entity>);

/// The render object an entity owns while it is batched.
#[derive(Debug, Clone)]
pub struct Renderable(pub Arc<RenderObject>);
