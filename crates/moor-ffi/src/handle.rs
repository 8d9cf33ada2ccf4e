//! Generation-checked handle table for values owned across the C boundary.
//!
//! A handle is `index << 32 | generation`. Removing a value bumps its
//! entry's generation, so a destroyed handle no longer resolves and a
//! second destroy is a no-op. Handle `0` is never issued: generations
//! start at 1.

const FIRST_GENERATION: u32 = 1;

fn pack(index: u32, generation: u32) -> u64 {
    (u64::from(index) << 32) | u64::from(generation)
}

fn unpack(handle: u64) -> (u32, u32) {
    ((handle >> 32) as u32, handle as u32)
}

struct Entry<T> {
    generation: u32,
    value: Option<T>,
}

/// Table of owned values addressed by opaque `u64` handles.
pub(crate) struct HandleTable<T> {
    entries: Vec<Entry<T>>,
    vacant: Vec<u32>,
}

impl<T> HandleTable<T> {
    /// An empty table. `const` so it can back a `static Mutex`.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            vacant: Vec::new(),
        }
    }

    /// Take ownership of `value` and return its handle.
    pub fn insert(&mut self, value: T) -> u64 {
        match self.vacant.pop() {
            Some(index) => {
                let entry = &mut self.entries[index as usize];
                entry.value = Some(value);
                pack(index, entry.generation)
            }
            None => {
                let index = self.entries.len() as u32;
                self.entries.push(Entry {
                    generation: FIRST_GENERATION,
                    value: Some(value),
                });
                pack(index, FIRST_GENERATION)
            }
        }
    }

    /// The value behind `handle`, unless stale or never issued.
    pub fn get(&self, handle: u64) -> Option<&T> {
        let (index, generation) = unpack(handle);
        let entry = self.entries.get(index as usize)?;
        if entry.generation != generation {
            return None;
        }
        entry.value.as_ref()
    }

    /// Remove and return the value behind `handle`.
    ///
    /// An entry whose generation would wrap is retired instead of reused,
    /// so an old handle can never resolve to a newer value.
    pub fn remove(&mut self, handle: u64) -> Option<T> {
        let (index, generation) = unpack(handle);
        let entry = self.entries.get_mut(index as usize)?;
        if entry.generation != generation {
            return None;
        }
        let value = entry.value.take()?;
        match entry.generation.checked_add(1) {
            Some(next) => {
                entry.generation = next;
                self.vacant.push(index);
            }
            None => entry.generation = 0,
        }
        Some(value)
    }

    /// Number of live values.
    pub fn len(&self) -> usize {
        self.entries.len() - self.vacant.len() - self.retired()
    }

    fn retired(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.generation == 0 && e.value.is_none())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_never_a_handle() {
        let mut table = HandleTable::new();
        let h = table.insert("a");
        assert_ne!(h, 0);
        assert!(table.get(0).is_none());
    }

    #[test]
    fn removed_handle_goes_stale() {
        let mut table = HandleTable::new();
        let h = table.insert(5u8);
        assert_eq!(table.remove(h), Some(5));
        assert!(table.get(h).is_none());
        assert!(table.remove(h).is_none());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn reused_index_gets_new_generation() {
        let mut table = HandleTable::new();
        let old = table.insert(1u8);
        table.remove(old);
        let new = table.insert(2u8);
        assert_eq!(unpack(old).0, unpack(new).0);
        assert_ne!(old, new);
        assert!(table.get(old).is_none());
        assert_eq!(table.get(new), Some(&2));
    }

    #[test]
    fn exhausted_generation_retires_entry() {
        let mut table = HandleTable::new();
        let h = table.insert(1u8);
        table.remove(h);
        table.entries[0].generation = u32::MAX;
        let last = table.insert(2u8);
        assert_eq!(unpack(last).1, u32::MAX);
        table.remove(last);
        assert!(table.vacant.is_empty());
        let fresh = table.insert(3u8);
        assert_eq!(unpack(fresh).0, 1);
        assert_eq!(table.len(), 1);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn live_handles_resolve_and_dead_ones_do_not(
                ops in prop::collection::vec(any::<bool>(), 1..64),
            ) {
                let mut table = HandleTable::new();
                let mut live: Vec<(u64, usize)> = Vec::new();
                let mut dead: Vec<u64> = Vec::new();
                for (i, insert) in ops.into_iter().enumerate() {
                    if insert || live.is_empty() {
                        live.push((table.insert(i), i));
                    } else {
                        let (h, v) = live.remove(0);
                        prop_assert_eq!(table.remove(h), Some(v));
                        dead.push(h);
                    }
                }
                for (h, v) in &live {
                    prop_assert_eq!(table.get(*h), Some(v));
                }
                for h in &dead {
                    prop_assert!(table.get(*h).is_none());
                }
                prop_assert_eq!(table.len(), live.len());
            }
        }
    }
}
