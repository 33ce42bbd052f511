mod demo;

use demo::ChurnDemo;
use wgpu_batch::renderer::{FrameRenderer, GpuContext};
use wgpu_batch::scene::Scene;
use wgpu_batch::{BatchSettings, Result};

fn run() -> Result<()> {
    let settings = BatchSettings::load();
    let context = pollster::block_on(GpuContext::new())?;
    let mut renderer = FrameRenderer::new(context, &settings)?;

    let mut scene = Scene::new();
    let mut demo = ChurnDemo::setup(&mut scene, 6, 0x5eed);
    let aspect = settings.resolution.width as f32 / settings.resolution.height as f32;

    for frame in 0..settings.frames {
        demo.churn(&mut scene, renderer.batch_mut(), frame);
        let sync = scene.sync(renderer.batch_mut());
        renderer.set_view(&scene.frame_view(aspect));
        let stats = renderer.render()?;

        if frame % 30 == 0 {
            log::info!(
                "Frame {}: {} live, {} draw args in {} segments, {} uploads, sync {:?}",
                stats.frame,
                stats.live_objects,
                stats.draw_args,
                stats.segments,
                stats.uploads,
                sync
            );
        }
    }

    log::info!("Descriptor usage: {:?}", renderer.descriptor_stats());
    renderer.shutdown();
    Ok(())
}

fn main() {
    wgpu_batch::init_logging();
    log::info!("Starting batch renderer demo");

    if let Err(err) = run() {
        log::error!("Demo failed: {}", err);
        std::process::exit(1);
    }
}
