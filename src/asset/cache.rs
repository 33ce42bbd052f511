use std::collections::HashMap;
use std::sync::Arc;

use super::Handle;

/// Append-only store of shared assets with optional name lookup.
///
/// Entries are handed out as `Arc`s so render objects keep an asset alive
/// after the scene drops its handle.
pub struct AssetCache<T> {
    items: Vec<Arc<T>>,
    names: HashMap<String, Handle<T>>,
}

impl<T> AssetCache<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            names: HashMap::new(),
        }
    }

    pub fn insert(&mut self, item: T) -> Handle<T> {
        self.insert_shared(Arc::new(item))
    }

    pub fn insert_shared(&mut self, item: Arc<T>) -> Handle<T> {
        let handle = Handle::new(self.items.len() as u32);
        self.items.push(item);
        handle
    }

    /// Inserts under `name`, or returns the existing handle if the name is taken.
    pub fn insert_named(&mut self, name: impl Into<String>, make: impl FnOnce() -> T) -> Handle<T> {
        let name = name.into();
        if let Some(&handle) = self.names.get(&name) {
            return handle;
        }
        let handle = self.insert(make());
        self.names.insert(name, handle);
        handle
    }

    pub fn find(&self, name: &str) -> Option<Handle<T>> {
        self.names.get(name).copied()
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&Arc<T>> {
        self.items.get(handle.index())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for AssetCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_insert_is_idempotent() {
        let mut cache = AssetCache::new();
        let a = cache.insert_named("cube", || 1u32);
        let b = cache.insert_named("cube", || 2u32);

        assert_eq!(a, b);
        assert_eq!(cache.len(), 1);
        assert_eq!(**cache.get(a).unwrap(), 1);
        assert_eq!(cache.find("cube"), Some(a));
        assert_eq!(cache.find("sphere"), None);
    }
}
