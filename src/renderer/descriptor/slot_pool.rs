use std::ops::Deref;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::{RenderError, Result};

struct PoolState<T> {
    slots: Vec<Weak<SlotHandle<T>>>,
    first_free: usize,
    live: usize,
}

/// A descriptor slot held by reference count. Dropping the last clone
/// returns the slot to its pool.
pub struct SlotHandle<T> {
    index: usize,
    value: T,
    pool: Weak<Mutex<PoolState<T>>>,
}

impl<T> SlotHandle<T> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn value(&self) -> &T {
        &self.value
    }
}

impl<T> Deref for SlotHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> Drop for SlotHandle<T> {
    fn drop(&mut self) {
        let Some(pool) = self.pool.upgrade() else {
            return;
        };
        let mut state = pool.lock();
        state.live -= 1;
        if self.index < state.first_free {
            state.first_free = self.index;
        }
    }
}

/// Fixed-capacity pool of shader-visible slots.
///
/// The search for a free slot starts at `first_free`, which only moves
/// down when a handle below it is released.
pub struct SlotPool<T> {
    name: &'static str,
    capacity: usize,
    state: Arc<Mutex<PoolState<T>>>,
}

impl<T> SlotPool<T> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        log::info!("Created {} descriptor pool with {} slots", name, capacity);
        Self {
            name,
            capacity,
            state: Arc::new(Mutex::new(PoolState {
                slots: Vec::with_capacity(capacity),
                first_free: 0,
                live: 0,
            })),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn live(&self) -> usize {
        self.state.lock().live
    }

    pub fn alloc(&self, value: T) -> Result<Arc<SlotHandle<T>>> {
        let mut state = self.state.lock();

        let start = state.first_free;
        let index = (start..self.capacity)
            .find(|&i| {
                state
                    .slots
                    .get(i)
                    .map_or(true, |slot| slot.strong_count() == 0)
            })
            .ok_or_else(|| {
                log::error!(
                    "{} pool exhausted: {} of {} slots live",
                    self.name,
                    state.live,
                    self.capacity
                );
                RenderError::PoolExhausted {
                    pool: self.name,
                    capacity: self.capacity,
                }
            })?;

        let handle = Arc::new(SlotHandle {
            index,
            value,
            pool: Arc::downgrade(&self.state),
        });

        if index == state.slots.len() {
            state.slots.push(Arc::downgrade(&handle));
        } else {
            state.slots[index] = Arc::downgrade(&handle);
        }
        state.first_free = index + 1;
        state.live += 1;

        Ok(handle)
    }

    /// Returns a live handle whose value satisfies `matches`, if any.
    pub fn find(&self, matches: impl Fn(&T) -> bool) -> Option<Arc<SlotHandle<T>>> {
        // Upgrade outside the search so a temporary that turns out to be the
        // last reference is not dropped while the pool is locked.
        let live: Vec<Arc<SlotHandle<T>>> = {
            let state = self.state.lock();
            state.slots.iter().filter_map(Weak::upgrade).collect()
        };
        live.into_iter().find(|handle| matches(&handle.value))
    }

    pub fn find_or_alloc(
        &self,
        matches: impl Fn(&T) -> bool,
        make: impl FnOnce() -> Result<T>,
    ) -> Result<Arc<SlotHandle<T>>> {
        if let Some(handle) = self.find(matches) {
            return Ok(handle);
        }
        self.alloc(make()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn live_handles_never_share_an_index() {
        let pool = SlotPool::new("test", 16);
        let mut held = Vec::new();

        for round in 0..8 {
            for i in 0..4 {
                held.push(pool.alloc(round * 10 + i).unwrap());
            }
            // drop every other handle
            let mut keep = false;
            held.retain(|_| {
                keep = !keep;
                keep
            });

            let indices: HashSet<_> = held.iter().map(|h| h.index()).collect();
            assert_eq!(indices.len(), held.len());
            assert_eq!(pool.live(), held.len());
        }
    }

    #[test]
    fn exhausted_pool_recovers_full_capacity_after_release() {
        let pool = SlotPool::new("test", 4);
        let handles: Vec<_> = (0..4).map(|i| pool.alloc(i).unwrap()).collect();

        assert!(matches!(
            pool.alloc(99),
            Err(RenderError::PoolExhausted { capacity: 4, .. })
        ));

        drop(handles);
        assert_eq!(pool.live(), 0);

        let again: Vec<_> = (0..4).map(|i| pool.alloc(i).unwrap()).collect();
        let mut indices: Vec<_> = again.iter().map(|h| h.index()).collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn released_low_slot_is_reused_first() {
        let pool = SlotPool::new("test", 8);
        let a = pool.alloc('a').unwrap();
        let _b = pool.alloc('b').unwrap();
        let _c = pool.alloc('c').unwrap();
        assert_eq!(a.index(), 0);

        drop(a);
        let d = pool.alloc('d').unwrap();
        assert_eq!(d.index(), 0);
        let e = pool.alloc('e').unwrap();
        assert_eq!(e.index(), 3);
    }

    #[test]
    fn clones_keep_the_slot_until_the_last_one_drops() {
        let pool = SlotPool::new("test", 2);
        let a = pool.alloc(1).unwrap();
        let a2 = Arc::clone(&a);
        drop(a);
        assert_eq!(pool.live(), 1);
        drop(a2);
        assert_eq!(pool.live(), 0);
    }

    #[test]
    fn find_or_alloc_reuses_matching_entries() {
        let pool = SlotPool::new("sampler", 4);
        let linear = pool.find_or_alloc(|v| *v == "linear", || Ok("linear")).unwrap();
        let again = pool.find_or_alloc(|v| *v == "linear", || Ok("linear")).unwrap();
        let nearest = pool.find_or_alloc(|v| *v == "nearest", || Ok("nearest")).unwrap();

        assert!(Arc::ptr_eq(&linear, &again));
        assert_ne!(linear.index(), nearest.index());
        assert_eq!(pool.live(), 2);
    }
}
