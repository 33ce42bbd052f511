use std::sync::Arc;

use glam::Mat4;
use hecs::World;
use rayon::prelude::*;

use crate::asset::Assets;
use crate::renderer::{BatchRenderer, ObjectConstants, RenderObject};
use crate::scene::components::{MaterialComponent, MeshComponent, Name, Renderable, Visible, WorldTransform};

/// What one sync pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub registered: usize,
    pub unregistered: usize,
    pub updated: usize,
}

/// Mirrors entity state into the batch renderer: visible drawables gain a
/// [`Renderable`], hidden ones lose it, and every renderable pushes its
/// current matrices.
pub(crate) fn sync_render_objects(world: &mut World, assets: &Assets, batch: &mut BatchRenderer) -> SyncStats {
    let mut stats = SyncStats::default();

    let appearing: Vec<(hecs::Entity, Arc<RenderObject>)> = world
        .query::<(&MeshComponent, &MaterialComponent, &Visible, Option<&WorldTransform>, Option<&Name>)>()
        .without::<&Renderable>()
        .iter()
        .filter(|(_, (_, _, visible, _, _))| visible.0)
        .filter_map(|(entity, (mesh, material, _, world_transform, name))| {
            let Some(mesh) = assets.meshes.get(mesh.0) else {
                log::warn!(
                    "Entity {:?} ({}) references a missing mesh",
                    entity,
                    name.map_or("unnamed", |n| n.0.as_str())
                );
                return None;
            };
            let local_to_world = world_transform.map_or(Mat4::IDENTITY, |wt| wt.0);
            let object = RenderObject::with_transform(Arc::clone(mesh), Arc::clone(&material.0), local_to_world);
            Some((entity, Arc::new(object)))
        })
        .collect();

    for (entity, object) in appearing {
        batch.register(&object);
        if let Err(e) = world.insert_one(entity, Renderable(object)) {
            log::error!("Failed to attach Renderable to {:?}: {:?}", entity, e);
            continue;
        }
        stats.registered += 1;
    }

    let hidden: Vec<hecs::Entity> = world
        .query::<(&Renderable, &Visible)>()
        .iter()
        .filter(|(_, (_, visible))| !visible.0)
        .map(|(entity, _)| entity)
        .collect();

    for entity in hidden {
        if let Ok(Renderable(object)) = world.remove_one::<Renderable>(entity) {
            batch.unregister(&object);
            stats.unregistered += 1;
        }
    }

    let live: Vec<(Arc<RenderObject>, Mat4)> = world
        .query::<(&Renderable, &WorldTransform)>()
        .iter()
        .map(|(_, (renderable, wt))| (Arc::clone(&renderable.0), wt.0))
        .collect();

    let updates: Vec<(Arc<RenderObject>, ObjectConstants)> = live
        .into_par_iter()
        .map(|(object, local_to_world)| (object, ObjectConstants::from_local_to_world(local_to_world)))
        .collect();

    for (object, constants) in updates {
        object.set_constants(constants);
        batch.update_matrix(&object, constants.local_to_world, constants.world_to_local);
        stats.updated += 1;
    }

    log::trace!("Render sync: {:?}", stats);
    stats
}

/// Unregisters `entity`'s render object before despawning it.
pub(crate) fn despawn_entity(world: &mut World, entity: hecs::Entity, batch: &mut BatchRenderer) -> bool {
    if let Ok(renderable) = world.get::<&Renderable>(entity) {
        batch.unregister(&renderable.0);
    }
    world.despawn(entity).is_ok()
}
