use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use wgpu_batch::renderer::descriptor::SlotPool;
use wgpu_batch::renderer::thread::{CommandRecorder, Recyclable, RecycleBin, RenderThread};
use wgpu_batch::{RenderError, Result};

#[derive(Default)]
struct CountingRecorder {
    frames: Arc<AtomicUsize>,
    passes: Arc<Mutex<Vec<u64>>>,
}

impl CommandRecorder for CountingRecorder {
    fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    fn submit(&mut self) -> Result<()> {
        Ok(())
    }

    fn wait_for_fence(&mut self) -> Result<()> {
        self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct DropFlag(Arc<AtomicUsize>);

impl Recyclable for DropFlag {
    fn recycle(self: Box<Self>) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn released_resources_survive_two_frame_boundaries() {
    let recycle = Arc::new(RecycleBin::new());
    let mut thread = RenderThread::spawn(CountingRecorder::default(), Arc::clone(&recycle)).unwrap();
    let destroyed = Arc::new(AtomicUsize::new(0));

    // released while recording frame 1
    recycle.add(DropFlag(Arc::clone(&destroyed)));

    thread.execute();
    thread.wait_for_done().unwrap();
    assert_eq!(destroyed.load(Ordering::SeqCst), 0);

    thread.execute();
    thread.wait_for_done().unwrap();
    assert_eq!(destroyed.load(Ordering::SeqCst), 0);

    thread.execute();
    thread.wait_for_done().unwrap();
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    assert!(recycle.is_empty());

    thread.shutdown(false);
}

#[test]
fn passes_record_in_submission_order_across_frames() {
    let recorder = CountingRecorder::default();
    let frames = Arc::clone(&recorder.frames);
    let passes = Arc::clone(&recorder.passes);
    let mut thread = RenderThread::spawn(recorder, Arc::new(RecycleBin::new())).unwrap();

    for frame in 0..4u64 {
        for pass in 0..3u64 {
            thread.add_cmd(move |rec: &mut CountingRecorder| rec.passes.lock().push(frame * 10 + pass));
        }
        thread.execute();
        thread.wait_for_done().unwrap();
    }
    thread.shutdown(false);

    assert_eq!(frames.load(Ordering::SeqCst), 4);
    let recorded = passes.lock().clone();
    let mut sorted = recorded.clone();
    sorted.sort_unstable();
    assert_eq!(recorded, sorted);
    assert_eq!(recorded.len(), 12);
}

#[test]
fn descriptor_slots_are_reused_after_release() {
    let pool = SlotPool::new("srv", 8);
    let held: Vec<_> = (0..8).map(|i| pool.alloc(i).unwrap()).collect();
    assert!(matches!(
        pool.alloc(8),
        Err(RenderError::PoolExhausted { capacity: 8, .. })
    ));

    let freed = held[3].index();
    drop(held);
    let again = pool.alloc(42).unwrap();
    assert!(again.index() <= freed);
    assert_eq!(pool.live(), 1);

    let clone = Arc::clone(&again);
    drop(again);
    assert_eq!(pool.live(), 1);
    drop(clone);
    assert_eq!(pool.live(), 0);
}
