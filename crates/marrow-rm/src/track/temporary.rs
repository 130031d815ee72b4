use std::{fmt::Debug, hash::Hash};

use ahash::AHashMap;
use smallvec::SmallVec;

use super::{Guard, GuardQuery};

///Keeps track of resources that only live until some GPU work finished. Each one is tagged with a [Guard], once the
/// guard is passed the resource is handed back to the caller for destruction.
pub struct TempResources<K> {
    res_map: AHashMap<K, Guard>,
    remove_buffer: Vec<K>,
}

impl<K: Copy + Eq + Hash + Debug> TempResources<K> {
    pub fn new() -> Self {
        TempResources {
            res_map: AHashMap::default(),
            remove_buffer: Vec::new(),
        }
    }

    ///Tags `res` with `guard`. If `res` is already temporary, the later guard is kept, so a resource that is used again
    /// lives long enough.
    pub fn register(&mut self, res: K, guard: Guard) {
        self.res_map
            .entry(res)
            .and_modify(|g| *g = g.later(guard))
            .or_insert(guard);
    }

    pub fn contains(&self, res: &K) -> bool {
        self.res_map.contains_key(res)
    }

    pub fn guard(&self, res: &K) -> Option<Guard> {
        self.res_map.get(res).copied()
    }

    ///Stops tracking `res` without releasing it.
    pub fn forget(&mut self, res: &K) -> Option<Guard> {
        self.res_map.remove(res)
    }

    pub fn len(&self) -> usize {
        self.res_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.res_map.is_empty()
    }

    ///Removes all resources whose guard passed, and returns them.
    pub fn release_stale(&mut self, query: &impl GuardQuery) -> SmallVec<[K; 8]> {
        self.remove_buffer.clear();
        for (reskey, guard) in self.res_map.iter() {
            if query.guard_finished(guard) {
                #[cfg(feature = "logging")]
                log::trace!("Releasing temporary resource {:?}, passed {:?}", reskey, guard);
                self.remove_buffer.push(*reskey);
            }
        }

        let mut released = SmallVec::new();
        for rem in self.remove_buffer.drain(..) {
            if self.res_map.remove(&rem).is_some() {
                released.push(rem);
            }
        }
        released
    }
}

impl<K: Copy + Eq + Hash + Debug> Default for TempResources<K> {
    fn default() -> Self {
        Self::new()
    }
}
