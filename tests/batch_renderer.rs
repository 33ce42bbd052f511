use std::collections::HashSet;
use std::sync::Arc;

use glam::{Mat4, Vec3};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use wgpu_batch::asset::Mesh;
use wgpu_batch::renderer::{
    cube_mesh, sphere_mesh, BatchPass, BatchRenderer, Material, RenderObject, Shader,
};
use wgpu_batch::BatchSettings;

fn small_settings() -> BatchSettings {
    BatchSettings {
        initial_vertex_count: 8,
        initial_index_count: 8,
        initial_matrix_count: 1,
        initial_batch_index_count: 1,
        initial_indirect_arg_count: 1,
        shadow_pass: false,
        ..BatchSettings::default()
    }
}

fn lit(name: &str) -> Arc<Material> {
    Arc::new(Material::new(name, Some(Arc::new(Shader::lit()))))
}

fn frame(batch: &mut BatchRenderer) {
    batch.register_actually().unwrap();
    batch.encode_cmd().unwrap();
}

#[test]
fn shared_mesh_objects_merge_into_one_draw() {
    let m1 = Arc::new(cube_mesh());
    let m2 = Arc::new(sphere_mesh(8, 6));
    let a = lit("A");
    let b = lit("B");

    let ro1 = Arc::new(RenderObject::new(Arc::clone(&m1), Arc::clone(&a)));
    let ro2 = Arc::new(RenderObject::new(Arc::clone(&m1), Arc::clone(&a)));
    let ro3 = Arc::new(RenderObject::new(Arc::clone(&m2), Arc::clone(&b)));

    let mut batch = BatchRenderer::new(&small_settings());
    for ro in [&ro1, &ro2, &ro3] {
        batch.register(ro);
    }
    frame(&mut batch);

    let plan = batch.group(BatchPass::Common).unwrap().plan();
    assert_eq!(plan.args.len(), 2);
    assert_eq!(plan.segments.len(), 2);
    assert_eq!(plan.segments[0].material.name(), "A");
    assert_eq!(plan.segments[1].material.name(), "B");

    assert_eq!(plan.args[0].instance_count, 2);
    assert_eq!(plan.args[0].base_instance_id, 0);
    assert_eq!(plan.args[0].index_count, m1.index_count() as u32);
    assert_eq!(plan.args[0].start_index_location, 0);
    assert_eq!(plan.args[0].base_vertex_location, 0);

    assert_eq!(plan.args[1].instance_count, 1);
    assert_eq!(plan.args[1].base_instance_id, 2);
    assert_eq!(plan.args[1].index_count, m2.index_count() as u32);
    assert_eq!(plan.args[1].start_index_location, m1.index_count() as u32);
    assert_eq!(plan.args[1].base_vertex_location, m1.vertex_count() as i32);

    let matrices: HashSet<u32> = plan.batch_indices.iter().copied().collect();
    assert_eq!(matrices, HashSet::from([0, 1, 2]));
}

#[test]
fn every_live_object_is_drawn_exactly_once() {
    let mut rng = SmallRng::seed_from_u64(7);
    let meshes: Vec<Arc<Mesh>> = (0..5)
        .map(|i| Arc::new(sphere_mesh(4 + i, 3 + i)))
        .collect();
    let materials: Vec<Arc<Material>> = (0..3).map(|i| lit(&format!("lit_{}", i))).collect();

    let mut batch = BatchRenderer::new(&small_settings());
    let mut live: Vec<Arc<RenderObject>> = Vec::new();

    for _ in 0..20 {
        for _ in 0..rng.gen_range(0..12) {
            let mesh = Arc::clone(&meshes[rng.gen_range(0..meshes.len())]);
            let material = Arc::clone(&materials[rng.gen_range(0..materials.len())]);
            let ro = Arc::new(RenderObject::new(mesh, material));
            batch.register(&ro);
            live.push(ro);
        }
        for _ in 0..rng.gen_range(0..6) {
            if live.is_empty() {
                break;
            }
            let ro = live.swap_remove(rng.gen_range(0..live.len()));
            batch.unregister(&ro);
        }
        frame(&mut batch);

        let plan = batch.group(BatchPass::Common).unwrap().plan();
        assert_eq!(plan.instance_count() as usize, live.len());
        assert_eq!(plan.batch_indices.len(), live.len());

        let mut expected: Vec<u32> = batch.live_matrix_indices().unwrap();
        let mut drawn = plan.batch_indices.clone();
        expected.sort_unstable();
        drawn.sort_unstable();
        assert_eq!(drawn, expected);
        assert_eq!(drawn, (0..live.len() as u32).collect::<Vec<_>>());

        let mut next = 0;
        for arg in &plan.args {
            assert_eq!(arg.base_instance_id, next);
            assert_eq!(arg.start_instance_location, next);
            next += arg.instance_count;
        }
        // neighbours inside one material segment always switch mesh
        for segment in &plan.segments {
            let args = &plan.args[segment.args.start as usize..segment.args.end as usize];
            for pair in args.windows(2) {
                assert_ne!(pair[0].start_index_location, pair[1].start_index_location);
            }
        }
    }
}

#[test]
fn mesh_geometry_is_uploaded_once() {
    let mesh = Arc::new(cube_mesh());
    let material = lit("lit");
    let mut batch = BatchRenderer::new(&small_settings());

    let objects: Vec<_> = (0..10)
        .map(|_| Arc::new(RenderObject::new(Arc::clone(&mesh), Arc::clone(&material))))
        .collect();
    for ro in &objects {
        batch.register(ro);
    }
    frame(&mut batch);
    frame(&mut batch);

    assert_eq!(batch.mesh().mesh_count(), 1);
    assert_eq!(batch.mesh().upload_count(), 1);
    assert_eq!(
        batch.mesh().vertex_buffer().len(),
        mesh.vertex_bytes().len() as u64
    );
    assert_eq!(batch.mesh().index_buffer().len(), mesh.index_bytes().len() as u64);
}

#[test]
fn unregister_releases_the_matrix_slot() {
    let material = lit("lit");
    let mesh = Arc::new(cube_mesh());
    let a = Arc::new(RenderObject::new(Arc::clone(&mesh), Arc::clone(&material)));
    let b = Arc::new(RenderObject::new(Arc::clone(&mesh), Arc::clone(&material)));

    let mut batch = BatchRenderer::new(&small_settings());
    batch.register(&a);
    batch.register(&b);
    frame(&mut batch);
    assert_eq!(batch.matrices().len(), 2);

    batch.update_matrix(&b, Mat4::from_translation(Vec3::Z), Mat4::from_translation(-Vec3::Z));
    batch.unregister(&a);
    frame(&mut batch);

    assert_eq!(batch.matrices().len(), 1);
    assert!(!batch.is_live(&a));
    let plan = batch.group(BatchPass::Common).unwrap().plan();
    assert_eq!(plan.batch_indices, vec![0]);
    assert_eq!(batch.matrix_of(&b).unwrap().local_to_world[3][2], 1.0);
}

#[test]
fn register_and_unregister_cancel_within_a_frame() {
    let material = lit("lit");
    let ro = Arc::new(RenderObject::new(Arc::new(cube_mesh()), material));
    let mut batch = BatchRenderer::new(&small_settings());

    batch.register(&ro);
    batch.unregister(&ro);
    frame(&mut batch);
    assert_eq!(batch.live_len(), 0);
    assert!(batch.group(BatchPass::Common).unwrap().plan().is_empty());

    batch.register(&ro);
    frame(&mut batch);
    batch.unregister(&ro);
    batch.register(&ro);
    frame(&mut batch);
    assert!(batch.is_live(&ro));
    assert_eq!(batch.live_len(), 1);
}

#[test]
fn shadow_group_draws_every_object_with_one_material() {
    let mut batch = BatchRenderer::new(&BatchSettings {
        shadow_pass: true,
        ..small_settings()
    });
    let cube = Arc::new(cube_mesh());
    let sphere = Arc::new(sphere_mesh(6, 4));

    let objects = [
        RenderObject::new(Arc::clone(&cube), lit("red")),
        RenderObject::new(Arc::clone(&cube), lit("blue")),
        RenderObject::new(Arc::clone(&sphere), lit("green")),
    ]
    .map(Arc::new);
    for ro in &objects {
        batch.register(ro);
    }
    frame(&mut batch);

    let common = batch.group(BatchPass::Common).unwrap().plan();
    let shadow = batch.group(BatchPass::Shadow).unwrap().plan();
    assert_eq!(common.args.len(), 3);
    assert_eq!(common.segments.len(), 3);
    assert_eq!(shadow.args.len(), 2);
    assert_eq!(shadow.segments.len(), 1);
    assert_eq!(shadow.instance_count(), 3);
}
