use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// A GPU object whose destruction must wait for the GPU to stop using it.
pub trait Recyclable: Send + 'static {
    fn recycle(self: Box<Self>);
}

impl Recyclable for wgpu::Buffer {
    fn recycle(self: Box<Self>) {
        self.destroy();
    }
}

impl Recyclable for wgpu::Texture {
    fn recycle(self: Box<Self>) {
        self.destroy();
    }
}

struct Entry {
    frame: u64,
    item: Box<dyn Recyclable>,
}

/// Frame-keyed deferred destruction.
///
/// An item released during frame `N` is destroyed by the first flush that
/// runs once the current frame is past `N + 1`, so both frame `N` and frame
/// `N + 1` can still read it on the GPU.
pub struct RecycleBin {
    frame: AtomicU64,
    pending: Mutex<Vec<Entry>>,
}

impl RecycleBin {
    pub fn new() -> Self {
        Self {
            frame: AtomicU64::new(0),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn current_frame(&self) -> u64 {
        self.frame.load(Ordering::Acquire)
    }

    pub fn set_frame(&self, frame: u64) {
        self.frame.store(frame, Ordering::Release);
    }

    pub fn add<R: Recyclable>(&self, item: R) {
        self.add_boxed(Box::new(item));
    }

    pub fn add_boxed(&self, item: Box<dyn Recyclable>) {
        let frame = self.current_frame();
        self.pending.lock().push(Entry { frame, item });
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Destroys every item whose grace period has elapsed and returns how
    /// many were destroyed.
    pub fn flush(&self) -> usize {
        let current = self.current_frame();
        let expired: Vec<Entry> = {
            let mut pending = self.pending.lock();
            let (expired, kept) = pending
                .drain(..)
                .partition(|entry: &Entry| entry.frame + 1 < current);
            *pending = kept;
            expired
        };

        let count = expired.len();
        for entry in expired {
            entry.item.recycle();
        }
        if count > 0 {
            log::debug!("Recycled {} GPU objects at frame {}", count, current);
        }
        count
    }

    /// Destroys everything regardless of age. Only valid once the GPU is idle.
    pub fn purge(&self) -> usize {
        let all: Vec<Entry> = std::mem::take(&mut *self.pending.lock());
        let count = all.len();
        for entry in all {
            entry.item.recycle();
        }
        count
    }
}

impl Default for RecycleBin {
    fn default() -> Self {
        Self::new()
    }
}
