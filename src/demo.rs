use std::sync::Arc;

use glam::{Quat, Vec3};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use wgpu_batch::asset::{Handle, Mesh};
use wgpu_batch::renderer::{
    cube_mesh, plane_mesh, sphere_mesh, BatchRenderer, CullMode, Material, RenderState, Shader,
};
use wgpu_batch::scene::{Scene, Transform};

const PALETTE: [[f32; 4]; 4] = [
    [0.85, 0.25, 0.2, 1.0],
    [0.2, 0.6, 0.85, 1.0],
    [0.3, 0.8, 0.35, 1.0],
    [0.9, 0.8, 0.3, 1.0],
];

/// Grid of cubes and spheres over a ground plane, churned every frame.
pub struct ChurnDemo {
    meshes: [Handle<Mesh>; 2],
    materials: Vec<Arc<Material>>,
    spawned: Vec<hecs::Entity>,
    rng: SmallRng,
    grid: i32,
}

impl ChurnDemo {
    pub fn setup(scene: &mut Scene, grid: i32, seed: u64) -> Self {
        let shader = Arc::new(Shader::lit());
        let cube = scene.assets.meshes.insert_named("cube", cube_mesh);
        let sphere = scene.assets.meshes.insert_named("sphere", || sphere_mesh(24, 16));
        let plane = scene.assets.meshes.insert_named("plane", || plane_mesh(60.0));

        let materials: Vec<Arc<Material>> = PALETTE
            .iter()
            .enumerate()
            .map(|(i, color)| {
                Arc::new(Material::new(format!("lit_{}", i), Some(Arc::clone(&shader))).with_color(*color))
            })
            .collect();

        let ground = Arc::new(
            Material::new("ground", Some(shader))
                .with_color([0.5, 0.5, 0.5, 1.0])
                .with_state(RenderState {
                    cull: CullMode::Off,
                    ..RenderState::default()
                }),
        );
        scene.spawn_mesh("Ground", plane, ground, Transform::from_translation(Vec3::new(0.0, -1.0, 0.0)));

        let mut demo = Self {
            meshes: [cube, sphere],
            materials,
            spawned: Vec::new(),
            rng: SmallRng::seed_from_u64(seed),
            grid,
        };

        for x in -grid..=grid {
            for z in -grid..=grid {
                demo.spawn_at(scene, x, z);
            }
        }
        log::info!("Demo scene ready with {} drawables", demo.spawned.len() + 1);
        demo
    }

    fn spawn_at(&mut self, scene: &mut Scene, x: i32, z: i32) {
        let mesh = self.meshes[self.rng.gen_range(0..self.meshes.len())];
        let material = Arc::clone(&self.materials[self.rng.gen_range(0..self.materials.len())]);
        let transform = Transform::from_trs(
            Vec3::new(x as f32 * 2.5, 0.0, z as f32 * 2.5),
            Quat::from_rotation_y(self.rng.gen_range(0.0..std::f32::consts::TAU)),
            Vec3::splat(self.rng.gen_range(0.5..1.0)),
        );
        let entity = scene.spawn_mesh(format!("Drawable_{}_{}", x, z), mesh, material, transform);
        self.spawned.push(entity);
    }

    /// Hides, reveals, despawns and respawns a handful of drawables.
    pub fn churn(&mut self, scene: &mut Scene, batch: &mut BatchRenderer, frame: u32) {
        for _ in 0..4 {
            if self.spawned.is_empty() {
                break;
            }
            let pick = self.rng.gen_range(0..self.spawned.len());
            let entity = self.spawned[pick];
            match self.rng.gen_range(0..3) {
                0 => {
                    let visible = self.rng.gen_bool(0.5);
                    scene.set_visible(entity, visible);
                }
                1 => {
                    scene.despawn(entity, batch);
                    self.spawned.swap_remove(pick);
                }
                _ => {
                    let x = self.rng.gen_range(-self.grid..=self.grid);
                    let z = self.rng.gen_range(-self.grid..=self.grid);
                    self.spawn_at(scene, x, z);
                }
            }
        }

        let angle = frame as f32 * 0.01;
        let radius = self.grid as f32 * 3.0 + 10.0;
        scene.camera.eye = Vec3::new(angle.cos() * radius, radius * 0.5, angle.sin() * radius);
    }
}
