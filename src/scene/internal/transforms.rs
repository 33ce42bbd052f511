use glam::Mat4;
use hecs::World;

use crate::scene::components::{Children, Parent, TransformComponent, WorldTransform};

/// Writes [`WorldTransform`] for every entity reachable from a root.
///
/// Walks each hierarchy with an explicit stack so deep trees cannot
/// overflow the call stack.
pub(crate) fn propagate_transforms(world: &mut World) {
    let roots: Vec<hecs::Entity> = world
        .query::<&TransformComponent>()
        .without::<&Parent>()
        .iter()
        .map(|(entity, _)| entity)
        .collect();

    log::trace!("Propagating transforms from {} root entities", roots.len());

    let mut stack: Vec<(hecs::Entity, Mat4)> = Vec::new();
    let mut missing: Vec<(hecs::Entity, WorldTransform)> = Vec::new();

    for root in roots {
        stack.push((root, Mat4::IDENTITY));

        while let Some((entity, parent_world)) = stack.pop() {
            let local = match world.get::<&TransformComponent>(entity) {
                Ok(t) => t.0.matrix(),
                Err(_) => {
                    log::trace!("Entity {:?} has no TransformComponent, skipping", entity);
                    continue;
                }
            };
            let world_matrix = parent_world * local;

            match world.get::<&mut WorldTransform>(entity) {
                Ok(mut wt) => wt.0 = world_matrix,
                Err(_) => missing.push((entity, WorldTransform(world_matrix))),
            }

            if let Ok(children) = world.get::<&Children>(entity) {
                for &child in children.0.iter().rev() {
                    stack.push((child, world_matrix));
                }
            }
        }
    }

    for (entity, world_transform) in missing {
        if let Err(e) = world.insert_one(entity, world_transform) {
            log::error!("Failed to insert WorldTransform for entity {:?}: {:?}", entity, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::components::Name;
    use crate::scene::Transform;
    use glam::{Quat, Vec3};

    fn spawn_pair(world: &mut World, parent: Transform, child: Transform) -> (hecs::Entity, hecs::Entity) {
        let p = world.spawn((Name::new("Parent"), TransformComponent(parent)));
        let c = world.spawn((Name::new("Child"), TransformComponent(child), Parent(p)));
        world.insert_one(p, Children(vec![c])).ok();
        (p, c)
    }

    fn translation(world: &World, entity: hecs::Entity) -> Vec3 {
        world.get::<&WorldTransform>(entity).unwrap().0.w_axis.truncate()
    }

    #[test]
    fn child_inherits_parent_translation() {
        let mut world = World::new();
        let (parent, child) = spawn_pair(
            &mut world,
            Transform::from_translation(Vec3::new(5.0, 0.0, 0.0)),
            Transform::from_translation(Vec3::new(2.0, 0.0, 0.0)),
        );

        propagate_transforms(&mut world);

        assert_eq!(translation(&world, parent), Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(translation(&world, child), Vec3::new(7.0, 0.0, 0.0));
    }

    #[test]
    fn child_inherits_parent_rotation() {
        let mut world = World::new();
        let (_, child) = spawn_pair(
            &mut world,
            Transform::from_trs(Vec3::ZERO, Quat::from_rotation_y(std::f32::consts::FRAC_PI_2), Vec3::ONE),
            Transform::from_translation(Vec3::X),
        );

        propagate_transforms(&mut world);

        assert!(translation(&world, child).abs_diff_eq(Vec3::new(0.0, 0.0, -1.0), 1e-5));
    }

    #[test]
    fn repropagation_updates_existing_world_transform() {
        let mut world = World::new();
        let (parent, child) = spawn_pair(
            &mut world,
            Transform::IDENTITY,
            Transform::from_translation(Vec3::new(2.0, 0.0, 0.0)),
        );
        propagate_transforms(&mut world);

        world.get::<&mut TransformComponent>(parent).unwrap().0.translation = Vec3::X;
        propagate_transforms(&mut world);

        assert_eq!(translation(&world, child), Vec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn deep_chains_do_not_recurse() {
        let mut world = World::new();
        let mut parent = world.spawn((TransformComponent(Transform::from_translation(Vec3::X)),));
        let root = parent;
        for _ in 0..10_000 {
            let child = world.spawn((TransformComponent(Transform::from_translation(Vec3::X)), Parent(parent)));
            world.insert_one(parent, Children(vec![child])).ok();
            parent = child;
        }

        propagate_transforms(&mut world);

        assert_eq!(translation(&world, root), Vec3::X);
        assert!((translation(&world, parent).x - 10_001.0).abs() < 1e-2);
    }
}
