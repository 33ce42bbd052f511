use std::collections::HashMap;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::error::{RenderError, Result};

/// Stable identity of a slot. Dense indices move on removal, keys do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey(u64);

impl SlotKey {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Dense array addressed through stable random keys.
///
/// `key_to_index` and `index_to_key` are kept as exact inverses: every
/// mutation updates both before returning. Removal swaps the last slot into
/// the hole so indices always cover `0..len()`.
pub struct KeyedSlotTable<T> {
    owner: &'static str,
    values: Vec<T>,
    index_to_key: Vec<SlotKey>,
    key_to_index: HashMap<SlotKey, usize>,
    rng: SmallRng,
}

impl<T> KeyedSlotTable<T> {
    pub fn new(owner: &'static str, capacity: usize) -> Self {
        Self::with_rng(owner, capacity, SmallRng::from_entropy())
    }

    pub fn with_seed(owner: &'static str, capacity: usize, seed: u64) -> Self {
        Self::with_rng(owner, capacity, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(owner: &'static str, capacity: usize, rng: SmallRng) -> Self {
        Self {
            owner,
            values: Vec::with_capacity(capacity),
            index_to_key: Vec::with_capacity(capacity),
            key_to_index: HashMap::with_capacity(capacity),
            rng,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.values.capacity()
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn alloc(&mut self, value: T) -> Result<SlotKey> {
        let key = SlotKey(self.rng.gen());
        if self.key_to_index.contains_key(&key) {
            log::error!("{}: slot key {:#x} collided", self.owner, key.0);
            return Err(RenderError::OutOfKeySpace {
                owner: self.owner,
                key: key.0,
            });
        }

        let index = self.values.len();
        self.values.push(value);
        self.index_to_key.push(key);
        self.key_to_index.insert(key, index);
        Ok(key)
    }

    pub fn index_of(&self, key: SlotKey) -> Result<usize> {
        self.key_to_index
            .get(&key)
            .copied()
            .ok_or(RenderError::UnknownKey {
                owner: self.owner,
                key: key.0,
            })
    }

    pub fn key_at(&self, index: usize) -> Option<SlotKey> {
        self.index_to_key.get(index).copied()
    }

    pub fn get(&self, key: SlotKey) -> Result<&T> {
        let index = self.index_of(key)?;
        Ok(&self.values[index])
    }

    pub fn set(&mut self, key: SlotKey, value: T) -> Result<()> {
        let index = self.index_of(key)?;
        self.values[index] = value;
        Ok(())
    }

    /// Exchanges two dense slots, keeping both maps consistent.
    pub fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.values.swap(a, b);
        self.index_to_key.swap(a, b);
        self.key_to_index.insert(self.index_to_key[a], a);
        self.key_to_index.insert(self.index_to_key[b], b);
    }

    /// Removes a slot by moving the last slot into its place.
    pub fn free(&mut self, key: SlotKey) -> Result<T> {
        let index = self.index_of(key)?;
        let last = self.values.len() - 1;
        self.swap(index, last);

        self.key_to_index.remove(&key);
        self.index_to_key.pop();
        // last slot is the freed one after the swap
        Ok(self.values.swap_remove(last))
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.index_to_key.clear();
        self.key_to_index.clear();
    }

    #[cfg(test)]
    fn assert_bijection(&self) {
        assert_eq!(self.key_to_index.len(), self.index_to_key.len());
        assert_eq!(self.values.len(), self.index_to_key.len());
        for (index, key) in self.index_to_key.iter().enumerate() {
            assert_eq!(self.key_to_index[key], index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;

    #[test]
    fn maps_stay_inverse_through_alloc_swap_and_free() {
        let mut table = KeyedSlotTable::with_seed("test", 4, 42);
        let mut rng = SmallRng::seed_from_u64(3);
        let mut keys = Vec::new();

        for step in 0..500u32 {
            match step % 5 {
                0 | 1 | 2 => keys.push(table.alloc(step).unwrap()),
                3 if table.len() > 1 => {
                    let a = rng.gen_range(0..table.len());
                    let b = rng.gen_range(0..table.len());
                    table.swap(a, b);
                }
                _ => {
                    if let Some(&key) = keys.choose(&mut rng) {
                        keys.retain(|&k| k != key);
                        table.free(key).unwrap();
                    }
                }
            }
            table.assert_bijection();
        }

        assert_eq!(table.len(), keys.len());
    }

    #[test]
    fn keys_follow_their_values_across_swaps() {
        let mut table = KeyedSlotTable::with_seed("test", 4, 1);
        let a = table.alloc("a").unwrap();
        let b = table.alloc("b").unwrap();
        let c = table.alloc("c").unwrap();

        table.swap(0, 2);
        assert_eq!(*table.get(a).unwrap(), "a");
        assert_eq!(table.index_of(a).unwrap(), 2);
        assert_eq!(table.index_of(c).unwrap(), 0);
        assert_eq!(table.key_at(1), Some(b));
    }

    #[test]
    fn free_compacts_without_gaps() {
        let mut table = KeyedSlotTable::with_seed("test", 4, 9);
        let a = table.alloc(1).unwrap();
        let b = table.alloc(2).unwrap();
        let c = table.alloc(3).unwrap();

        assert_eq!(table.free(a).unwrap(), 1);
        assert_eq!(table.values(), &[3, 2]);
        assert_eq!(table.index_of(c).unwrap(), 0);
        assert_eq!(table.index_of(b).unwrap(), 1);
        assert!(matches!(table.set(a, 5), Err(RenderError::UnknownKey { .. })));
    }
}
