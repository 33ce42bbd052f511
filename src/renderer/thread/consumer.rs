use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

struct State<T> {
    queue: VecDeque<T>,
    idle: bool,
    stopping: bool,
    discard: bool,
    failure: Option<String>,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    has_product: Condvar,
    idle: Condvar,
}

/// A single worker thread consuming items strictly in enqueue order.
///
/// `wait` blocks until the queue is empty and the worker is parked; that is
/// the only synchronisation point callers need.
pub struct ConsumerThread<T: Send + 'static> {
    name: String,
    shared: Arc<Shared<T>>,
    handle: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> ConsumerThread<T> {
    pub fn spawn<F>(name: impl Into<String>, mut consume: F) -> std::io::Result<Self>
    where
        F: FnMut(T) + Send + 'static,
    {
        let name = name.into();
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                idle: false,
                stopping: false,
                discard: false,
                failure: None,
            }),
            has_product: Condvar::new(),
            idle: Condvar::new(),
        });

        let worker = Arc::clone(&shared);
        let thread_name = name.clone();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            log::info!("{} started", thread_name);
            loop {
                let item = {
                    let mut state = worker.state.lock();
                    loop {
                        if state.discard {
                            state.queue.clear();
                        }
                        if let Some(item) = state.queue.pop_front() {
                            state.idle = false;
                            break Some(item);
                        }
                        state.idle = true;
                        worker.idle.notify_all();
                        if state.stopping {
                            break None;
                        }
                        worker.has_product.wait(&mut state);
                    }
                };

                let Some(item) = item else {
                    break;
                };

                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| consume(item))) {
                    let message = payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    log::error!("{} panicked: {}", thread_name, message);

                    let mut state = worker.state.lock();
                    state.failure = Some(message);
                    state.stopping = true;
                    state.discard = true;
                }
            }
            log::info!("{} stopped", thread_name);
        })?;

        Ok(Self {
            name,
            shared,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queues an item. Items enqueued after a stop are dropped.
    pub fn enqueue(&self, item: T) {
        let mut state = self.shared.state.lock();
        if state.stopping {
            log::warn!("{}: dropping item enqueued after stop", self.name);
            return;
        }
        state.queue.push_back(item);
        state.idle = false;
        self.shared.has_product.notify_one();
    }

    /// Blocks until every queued item has been consumed.
    pub fn wait(&self) {
        let mut state = self.shared.state.lock();
        while !(state.idle && state.queue.is_empty()) {
            self.shared.idle.wait(&mut state);
        }
    }

    /// Asks the worker to exit. A graceful stop drains the queue first; an
    /// immediate stop discards whatever has not started yet.
    pub fn stop(&self, immediate: bool) {
        let mut state = self.shared.state.lock();
        state.stopping = true;
        state.discard |= immediate;
        self.shared.has_product.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.state.lock().stopping
    }

    pub fn pending(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Message of the panic that stopped the worker, if any.
    pub fn failure(&self) -> Option<String> {
        self.shared.state.lock().failure.clone()
    }

    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("{} could not be joined", self.name);
            }
        }
    }
}

impl<T: Send + 'static> Drop for ConsumerThread<T> {
    fn drop(&mut self) {
        self.stop(false);
        self.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn items_are_consumed_in_enqueue_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let consumer = ConsumerThread::spawn("order", move |n: u32| sink.lock().push(n)).unwrap();

        for n in 0..1000 {
            consumer.enqueue(n);
        }
        consumer.wait();

        assert_eq!(*seen.lock(), (0..1000).collect::<Vec<_>>());
    }

    #[test]
    fn wait_returns_only_after_slow_work_finishes() {
        let done = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&done);
        let consumer = ConsumerThread::spawn("slow", move |_: ()| {
            thread::sleep(Duration::from_millis(5));
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        for _ in 0..5 {
            consumer.enqueue(());
        }
        consumer.wait();
        assert_eq!(done.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn graceful_stop_drains_queue() {
        let done = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&done);
        let mut consumer = ConsumerThread::spawn("drain", move |_: ()| {
            thread::sleep(Duration::from_millis(1));
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        for _ in 0..20 {
            consumer.enqueue(());
        }
        consumer.stop(false);
        consumer.join();
        assert_eq!(done.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn immediate_stop_discards_unstarted_items() {
        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        let done = Arc::new(AtomicUsize::new(0));
        let (worker_gate, counter) = (Arc::clone(&gate), Arc::clone(&done));
        let mut consumer = ConsumerThread::spawn("discard", move |_: ()| {
            let (open, cvar) = &*worker_gate;
            let mut open = open.lock();
            while !*open {
                cvar.wait(&mut open);
            }
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        for _ in 0..10 {
            consumer.enqueue(());
        }
        // let the worker pick up the first item before stopping
        while consumer.pending() == 10 {
            thread::yield_now();
        }
        consumer.stop(true);
        {
            let (open, cvar) = &*gate;
            *open.lock() = true;
            cvar.notify_all();
        }
        consumer.join();

        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_item_is_reported_and_unblocks_wait() {
        let consumer = ConsumerThread::spawn("panics", |n: u32| {
            if n == 2 {
                panic!("bad item");
            }
        })
        .unwrap();

        for n in 0..5 {
            consumer.enqueue(n);
        }
        consumer.wait();

        assert_eq!(consumer.failure().as_deref(), Some("bad item"));
        assert!(consumer.is_stopped());
    }
}
