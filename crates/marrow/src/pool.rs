//! # Handle pool
//!
//! A fixed capacity, generational object pool. Every slot carries a generation counter which is
//! bumped whenever the slot's payload is deleted. A [Handle] stores the generation of the slot at the time it
//! was reserved, so a handle to a deleted (and possibly reused) slot never validates again.
//!
//! Free slots form an intrusive singly linked list through the slot array. The list is seeded at
//! construction (`slot[i].next_free = i + 1`) and reserving pops its head, deleting pushes the slot back.
//!
//! The pool never grows. Running out of slots is a configuration error, [HandlePool::reserve] panics in that case,
//! [HandlePool::try_reserve] reports it as [PoolError::Exhausted].

use std::{
    fmt::Debug,
    hash::{Hash, Hasher},
    marker::PhantomData,
};

use crate::PoolError;

///Untyped (index, generation) pair. Use [Handle] wherever the payload type is known.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawHandle {
    index: u32,
    generation: u32,
}

impl RawHandle {
    ///Explicitly invalid handle. Never validates against any pool.
    pub const NULL: Self = RawHandle {
        index: u32::MAX,
        generation: u32::MAX,
    };

    pub const fn new(index: u32, generation: u32) -> Self {
        RawHandle { index, generation }
    }

    pub const fn index(&self) -> u32 {
        self.index
    }

    pub const fn generation(&self) -> u32 {
        self.generation
    }

    pub const fn is_null(&self) -> bool {
        self.index == u32::MAX
    }

    ///Packs the handle into a single u64, generation in the upper 32 bits.
    pub const fn to_bits(&self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    pub const fn from_bits(bits: u64) -> Self {
        RawHandle {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

impl Default for RawHandle {
    fn default() -> Self {
        Self::NULL
    }
}

impl Debug for RawHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            write!(f, "RawHandle(null)")
        } else {
            write!(f, "RawHandle({}v{})", self.index, self.generation)
        }
    }
}

///Typed handle into a [HandlePool<T>]. Cheap to copy, does not keep the payload alive.
pub struct Handle<T> {
    raw: RawHandle,
    ty: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    pub const NULL: Self = Handle {
        raw: RawHandle::NULL,
        ty: PhantomData,
    };

    pub const fn from_raw(raw: RawHandle) -> Self {
        Handle {
            raw,
            ty: PhantomData,
        }
    }

    pub const fn raw(&self) -> RawHandle {
        self.raw
    }

    pub const fn index(&self) -> u32 {
        self.raw.index
    }

    pub const fn generation(&self) -> u32 {
        self.raw.generation
    }

    pub const fn is_null(&self) -> bool {
        self.raw.is_null()
    }
}

//NOTE: manual impls, deriving would put the bounds on `T`.
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state)
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::NULL
    }
}

impl<T> Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            write!(f, "Handle<{}>(null)", std::any::type_name::<T>())
        } else {
            write!(
                f,
                "Handle<{}>({}v{})",
                std::any::type_name::<T>(),
                self.raw.index,
                self.raw.generation
            )
        }
    }
}

impl<T> From<Handle<T>> for RawHandle {
    fn from(h: Handle<T>) -> Self {
        h.raw
    }
}

struct Slot<T> {
    value: Option<T>,
    generation: u32,
    next_free: u32,
}

///Fixed capacity generational pool. See the [module](self) documentation.
pub struct HandlePool<T> {
    slots: Box<[Slot<T>]>,
    ///Head of the intrusive free list. `NONE` if exhausted.
    free_head: u32,
    live: u32,
}

impl<T> HandlePool<T> {
    const NONE: u32 = u32::MAX;

    ///Creates a pool with `capacity` slots. All slots are allocated up front.
    ///
    /// # Panics
    ///
    /// If `capacity` is `u32::MAX` or more, since that index is reserved for the null handle.
    pub fn new(capacity: u32) -> Self {
        assert!(
            capacity < u32::MAX,
            "HandlePool capacity must be smaller than u32::MAX"
        );

        let slots = (0..capacity)
            .map(|i| Slot {
                value: None,
                generation: 0,
                next_free: if i + 1 < capacity { i + 1 } else { Self::NONE },
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        HandlePool {
            slots,
            free_head: if capacity > 0 { 0 } else { Self::NONE },
            live: 0,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    ///Number of live entries.
    pub fn len(&self) -> u32 {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    ///Returns true if no slot is free anymore.
    pub fn is_full(&self) -> bool {
        self.free_head == Self::NONE
    }

    ///Reserves a slot and constructs the payload via `init`. The closure receives the handle the payload will be
    /// reachable through, which lets payloads store their own handle.
    pub fn try_reserve_with(&mut self, init: impl FnOnce(Handle<T>) -> T) -> Result<Handle<T>, PoolError> {
        if self.free_head == Self::NONE {
            #[cfg(feature = "logging")]
            log::error!(
                "HandlePool<{}> exhausted at capacity {}",
                std::any::type_name::<T>(),
                self.capacity()
            );
            return Err(PoolError::Exhausted {
                capacity: self.capacity(),
            });
        }

        let index = self.free_head;
        let slot = &mut self.slots[index as usize];
        debug_assert!(slot.value.is_none(), "free list pointed at live slot {}", index);
        self.free_head = slot.next_free;
        slot.next_free = Self::NONE;

        let handle = Handle::from_raw(RawHandle::new(index, slot.generation));
        slot.value = Some(init(handle));
        self.live += 1;

        Ok(handle)
    }

    pub fn try_reserve(&mut self, value: T) -> Result<Handle<T>, PoolError> {
        self.try_reserve_with(|_| value)
    }

    ///Reserves a slot for `value`.
    ///
    /// # Panics
    ///
    /// If the pool is exhausted. Size pools up front, or use [try_reserve](Self::try_reserve).
    pub fn reserve(&mut self, value: T) -> Handle<T> {
        self.try_reserve(value).unwrap_or_else(|e| panic!("{e}"))
    }

    ///Like [reserve](Self::reserve), but constructs the payload with knowledge of its handle.
    pub fn reserve_with(&mut self, init: impl FnOnce(Handle<T>) -> T) -> Handle<T> {
        self.try_reserve_with(init).unwrap_or_else(|e| panic!("{e}"))
    }

    ///Slot for `handle` if the handle is still valid.
    fn live_slot(&self, handle: Handle<T>) -> Option<&Slot<T>> {
        if handle.is_null() {
            return None;
        }
        let slot = self.slots.get(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        Some(slot)
    }

    ///Returns the payload for `handle`, or `None` if the handle is null or stale.
    pub fn find(&self, handle: Handle<T>) -> Option<&T> {
        self.live_slot(handle)?.value.as_ref()
    }

    pub fn find_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        if handle.is_null() {
            return None;
        }
        let slot = self.slots.get_mut(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.value.as_mut()
    }

    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.find(handle).is_some()
    }

    ///Deletes the payload `handle` points to and returns it. Invalidates all copies of `handle`.
    ///
    /// Deleting a stale or null handle is a no-op and returns `None`. This makes double frees safe.
    pub fn delete(&mut self, handle: Handle<T>) -> Option<T> {
        if handle.is_null() {
            return None;
        }
        let index = handle.index();
        let slot = self.slots.get_mut(index as usize)?;
        if slot.generation != handle.generation() || slot.value.is_none() {
            #[cfg(feature = "logging")]
            log::trace!("Ignoring delete of stale {:?}", handle);
            return None;
        }

        let value = slot.value.take();
        slot.generation += 1;
        self.live -= 1;

        //A slot whose generation reached the end of the counter is retired. Wrapping would let ancient handles validate again.
        if slot.generation == u32::MAX {
            #[cfg(feature = "logging")]
            log::warn!(
                "Retiring slot {} of HandlePool<{}>, generation counter exhausted",
                index,
                std::any::type_name::<T>()
            );
        } else {
            slot.next_free = self.free_head;
            self.free_head = index;
        }

        value
    }

    ///Iterates all live entries together with their handles.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            slot.value.as_ref().map(|v| {
                (
                    Handle::from_raw(RawHandle::new(idx as u32, slot.generation)),
                    v,
                )
            })
        })
    }
}

impl<T> Debug for HandlePool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlePool")
            .field("type", &std::any::type_name::<T>())
            .field("capacity", &self.capacity())
            .field("live", &self.live)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahash::AHashSet;
    use static_assertions::assert_impl_all;

    struct Texture {
        id: u32,
    }

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Handle<Texture>: Send, Sync, Copy);
        assert_impl_all!(HandlePool<Texture>: Send, Sync);
    }

    #[test]
    fn reserve_find_delete() {
        let mut pool = HandlePool::new(4);
        let a = pool.reserve(Texture { id: 1 });
        assert_eq!(pool.find(a).map(|t| t.id), Some(1));
        assert_eq!(pool.len(), 1);

        assert_eq!(pool.delete(a).map(|t| t.id), Some(1));
        assert!(pool.find(a).is_none());
        assert!(pool.is_empty());
        //double free is a no-op
        assert!(pool.delete(a).is_none());
        assert!(pool.delete(Handle::NULL).is_none());
    }

    #[test]
    fn stale_handle_after_reuse() {
        let mut pool = HandlePool::new(1);
        let a = pool.reserve(Texture { id: 1 });
        pool.delete(a);
        let b = pool.reserve(Texture { id: 2 });

        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert!(pool.find(a).is_none());
        assert_eq!(pool.find(b).map(|t| t.id), Some(2));
        //deleting the stale handle must not touch the new payload
        assert!(pool.delete(a).is_none());
        assert!(pool.contains(b));
    }

    #[test]
    fn exhaustion_is_deterministic() {
        let mut pool = HandlePool::new(8);
        for i in 0..8 {
            pool.reserve(Texture { id: i });
        }
        assert!(pool.is_full());
        assert_eq!(
            pool.try_reserve(Texture { id: 8 }).err(),
            Some(PoolError::Exhausted { capacity: 8 })
        );
    }

    #[test]
    #[should_panic(expected = "exhausted")]
    fn reserve_panics_when_full() {
        let mut pool = HandlePool::new(1);
        pool.reserve(Texture { id: 0 });
        pool.reserve(Texture { id: 1 });
    }

    #[test]
    fn churn_never_fails() {
        let mut pool = HandlePool::new(16);
        let mut live = Vec::new();
        for i in 0..16 {
            live.push(pool.reserve(Texture { id: i }));
        }
        for round in 0..16 {
            let h = live.remove(round % live.len());
            assert!(pool.delete(h).is_some());
            live.push(pool.reserve(Texture { id: 100 + round as u32 }));
        }
        assert_eq!(pool.len(), 16);

        let unique: AHashSet<_> = live.iter().copied().collect();
        assert_eq!(unique.len(), live.len());
    }

    #[test]
    fn reserve_with_sees_own_handle() {
        struct SelfRef {
            me: Handle<SelfRef>,
        }
        let mut pool = HandlePool::new(2);
        let h = pool.reserve_with(|me| SelfRef { me });
        assert_eq!(pool.find(h).unwrap().me, h);
    }

    #[test]
    fn texture_scenario() {
        let mut pool = HandlePool::new(1000);
        let handles = (0..1000)
            .map(|i| pool.reserve(Texture { id: i }))
            .collect::<Vec<_>>();

        let (deleted, kept): (Vec<_>, Vec<_>) = handles
            .iter()
            .copied()
            .enumerate()
            .partition(|(i, _)| i % 2 == 0);
        for (_, h) in &deleted {
            assert!(pool.delete(*h).is_some());
        }

        let new_handles = (0..500)
            .map(|i| {
                pool.try_reserve(Texture { id: 1000 + i })
                    .expect("reserve after delete must not fail")
            })
            .collect::<Vec<_>>();

        for (_, h) in &deleted {
            assert!(pool.find(*h).is_none());
        }
        for (i, h) in &kept {
            assert_eq!(pool.find(*h).map(|t| t.id), Some(*i as u32));
        }
        for h in &new_handles {
            assert!(pool.find(*h).is_some());
        }
        assert!(pool.is_full());

        let all: AHashSet<_> = kept
            .iter()
            .map(|(_, h)| *h)
            .chain(new_handles.iter().copied())
            .collect();
        assert_eq!(all.len(), 1000);
        assert_eq!(pool.iter().count(), 1000);
    }

    #[test]
    fn raw_bits_roundtrip() {
        let raw = RawHandle::new(17, 3);
        assert_eq!(RawHandle::from_bits(raw.to_bits()), raw);
        assert!(RawHandle::NULL.is_null());
        assert!(Handle::<Texture>::default().is_null());
    }
}
