use std::collections::HashMap;

use bitflags::bitflags;

bitflags! {
    /// How a tracked resource is currently being accessed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceState: u32 {
        const VERTEX_BUFFER = 1 << 0;
        const INDEX_BUFFER = 1 << 1;
        const SHADER_READ = 1 << 2;
        const INDIRECT_ARGUMENT = 1 << 3;
        const COPY_SOURCE = 1 << 4;
        const COPY_DEST = 1 << 5;
        const RENDER_TARGET = 1 << 6;
        const DEPTH_WRITE = 1 << 7;
    }
}

impl Default for ResourceState {
    fn default() -> Self {
        Self::empty()
    }
}

impl ResourceState {
    /// Read state a buffer with `usage` sits in between uploads.
    pub fn read_state(usage: wgpu::BufferUsages) -> Self {
        let mut state = Self::empty();
        if usage.contains(wgpu::BufferUsages::VERTEX) {
            state |= Self::VERTEX_BUFFER;
        }
        if usage.contains(wgpu::BufferUsages::INDEX) {
            state |= Self::INDEX_BUFFER;
        }
        if usage.intersects(wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::UNIFORM) {
            state |= Self::SHADER_READ;
        }
        if usage.contains(wgpu::BufferUsages::INDIRECT) {
            state |= Self::INDIRECT_ARGUMENT;
        }
        state
    }

    pub fn is_write(self) -> bool {
        self.intersects(Self::COPY_DEST | Self::RENDER_TARGET | Self::DEPTH_WRITE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub resource: u64,
    pub before: ResourceState,
    pub after: ResourceState,
}

/// Tracks resource states and batches the barriers needed to move between
/// them.
#[derive(Debug, Default)]
pub struct ResourceStateTracker {
    states: HashMap<u64, ResourceState>,
    queued: Vec<Transition>,
    applied: u64,
}

impl ResourceStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, resource: u64) -> ResourceState {
        self.states.get(&resource).copied().unwrap_or_default()
    }

    pub fn queued(&self) -> &[Transition] {
        &self.queued
    }

    /// Barriers handed out by [`apply`](Self::apply) so far.
    pub fn applied(&self) -> u64 {
        self.applied
    }

    pub fn transition(&mut self, resource: u64, after: ResourceState) {
        let before = self.state(resource);
        if before == after {
            return;
        }
        self.states.insert(resource, after);

        if let Some(pos) = self.queued.iter().position(|t| t.resource == resource) {
            let original = self.queued[pos].before;
            if original == after {
                self.queued.remove(pos);
            } else {
                self.queued[pos].after = after;
            }
            return;
        }

        self.queued.push(Transition {
            resource,
            before,
            after,
        });
    }

    pub fn apply(&mut self) -> Vec<Transition> {
        let batch = std::mem::take(&mut self.queued);
        if !batch.is_empty() {
            log::trace!("Applying {} resource transitions", batch.len());
        }
        self.applied += batch.len() as u64;
        batch
    }

    pub fn forget(&mut self, resource: u64) {
        self.states.remove(&resource);
        self.queued.retain(|t| t.resource != resource);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_state_queues_nothing() {
        let mut tracker = ResourceStateTracker::new();
        tracker.transition(1, ResourceState::COPY_DEST);
        tracker.transition(1, ResourceState::COPY_DEST);
        assert_eq!(tracker.apply().len(), 1);
        tracker.transition(1, ResourceState::COPY_DEST);
        assert!(tracker.apply().is_empty());
    }

    #[test]
    fn queued_transitions_coalesce_per_resource() {
        let mut tracker = ResourceStateTracker::new();
        tracker.transition(7, ResourceState::SHADER_READ);
        tracker.apply();

        tracker.transition(7, ResourceState::COPY_DEST);
        tracker.transition(7, ResourceState::INDIRECT_ARGUMENT);
        let batch = tracker.apply();
        assert_eq!(
            batch,
            vec![Transition {
                resource: 7,
                before: ResourceState::SHADER_READ,
                after: ResourceState::INDIRECT_ARGUMENT,
            }]
        );
        assert_eq!(tracker.applied(), 2);
    }

    #[test]
    fn round_trip_within_a_batch_is_dropped() {
        let mut tracker = ResourceStateTracker::new();
        tracker.transition(3, ResourceState::VERTEX_BUFFER);
        tracker.apply();

        tracker.transition(3, ResourceState::COPY_DEST);
        tracker.transition(3, ResourceState::VERTEX_BUFFER);
        assert!(tracker.queued().is_empty());
        assert_eq!(tracker.state(3), ResourceState::VERTEX_BUFFER);
    }

    #[test]
    fn read_state_follows_buffer_usage() {
        let usage = wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST;
        assert_eq!(ResourceState::read_state(usage), ResourceState::VERTEX_BUFFER);
        assert_eq!(
            ResourceState::read_state(wgpu::BufferUsages::STORAGE),
            ResourceState::SHADER_READ
        );
        assert!(ResourceState::COPY_DEST.is_write());
        assert!(!ResourceState::SHADER_READ.is_write());
    }

    #[test]
    fn upload_batches_settle_in_read_state() {
        let mut tracker = ResourceStateTracker::new();
        let upload = |tracker: &mut ResourceStateTracker, id: u64, read: ResourceState| {
            tracker.transition(id, ResourceState::COPY_DEST);
            tracker.transition(id, read);
        };

        upload(&mut tracker, 1, ResourceState::VERTEX_BUFFER);
        upload(&mut tracker, 2, ResourceState::SHADER_READ);
        let first = tracker.apply();
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|t| t.before == ResourceState::default()));
        assert_eq!(first[0].after, ResourceState::VERTEX_BUFFER);

        upload(&mut tracker, 1, ResourceState::VERTEX_BUFFER);
        upload(&mut tracker, 3, ResourceState::INDIRECT_ARGUMENT);
        let second = tracker.apply();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].resource, 3);
        assert_eq!(tracker.state(1), ResourceState::VERTEX_BUFFER);
    }
}
