//! # Resource state tracking
//!
//! The [ResourceTracker] knows the last [StateInfo] of every live buffer and image. Whenever a resource is about to be
//! used differently, the tracker computes the [Barrier] from the known state to the new one, and commits the new state.
//! Updates have to happen in the same order the barriers are recorded into the command stream.
//!
//! Images are tracked as a whole, until a transition touches only some of their subresources (mip × layer). From then
//! on the image is tracked per subresource, until a transition covers the whole image again. A query (or transition)
//! over subresources that are in different states is a usage error, and panics.

use std::{fmt::Debug, hash::Hash};

use ahash::AHashMap;
use marrow::ash::vk;
use smallvec::SmallVec;

use crate::TrackError;

mod state;
pub use state::{ResState, StateInfo};

mod barrier;
pub use barrier::{Barrier, BarrierBuilder};

mod guard;
pub use guard::{Guard, GuardQuery, TrackId, Tracks};

mod temporary;
pub use temporary::TempResources;

struct ImageTrack {
    mip_levels: u32,
    array_layers: u32,
    aspect: vk::ImageAspectFlags,
    whole: StateInfo,
    //mip major, lazily allocated on the first partial transition
    subresources: Option<Box<[StateInfo]>>,
}

//Resolved subresource range, half open.
#[derive(Clone, Copy)]
struct SubRange {
    mips: (u32, u32),
    layers: (u32, u32),
}

impl ImageTrack {
    fn resolve(&self, range: Option<&vk::ImageSubresourceRange>) -> Result<SubRange, TrackError> {
        let Some(range) = range else {
            return Ok(SubRange {
                mips: (0, self.mip_levels),
                layers: (0, self.array_layers),
            });
        };

        let count = |base: u32, count: u32, max: u32| {
            if count == vk::REMAINING_MIP_LEVELS {
                max.saturating_sub(base)
            } else {
                count
            }
        };
        //REMAINING_MIP_LEVELS and REMAINING_ARRAY_LAYERS are both !0
        let mips = (
            range.base_mip_level,
            range
                .base_mip_level
                .saturating_add(count(range.base_mip_level, range.level_count, self.mip_levels)),
        );
        let layers = (
            range.base_array_layer,
            range
                .base_array_layer
                .saturating_add(count(range.base_array_layer, range.layer_count, self.array_layers)),
        );

        if mips.1 > self.mip_levels || layers.1 > self.array_layers || mips.0 >= mips.1 || layers.0 >= layers.1 {
            #[cfg(feature = "logging")]
            log::error!("Invalid subresource range {:?}", range);
            return Err(TrackError::RangeOutOfBounds {
                mips,
                layers,
                mip_levels: self.mip_levels,
                array_layers: self.array_layers,
            });
        }

        Ok(SubRange { mips, layers })
    }

    fn is_full(&self, range: &SubRange) -> bool {
        range.mips == (0, self.mip_levels) && range.layers == (0, self.array_layers)
    }

    fn indices(&self, range: SubRange) -> impl Iterator<Item = usize> + '_ {
        (range.mips.0..range.mips.1).flat_map(move |mip| {
            (range.layers.0..range.layers.1)
                .map(move |layer| (mip * self.array_layers + layer) as usize)
        })
    }

    fn state(&self, range: SubRange) -> StateInfo {
        let Some(subresources) = &self.subresources else {
            return self.whole;
        };

        let mut indices = self.indices(range);
        //ranges are never empty
        let first = subresources[indices.next().unwrap_or(0)];
        for idx in indices {
            if subresources[idx] != first {
                #[cfg(feature = "logging")]
                log::error!(
                    "Subresources mips {:?} layers {:?} are in different states: {:?} and {:?}",
                    range.mips,
                    range.layers,
                    first,
                    subresources[idx]
                );
                panic!(
                    "Inconsistent subresource state in mips {:?} layers {:?}: {:?} vs {:?}",
                    range.mips, range.layers, first, subresources[idx]
                );
            }
        }
        first
    }

    fn set(&mut self, range: SubRange, state: StateInfo) {
        if self.is_full(&range) {
            self.whole = state;
            self.subresources = None;
            return;
        }

        let count = (self.mip_levels * self.array_layers) as usize;
        let whole = self.whole;
        let mut subresources = self
            .subresources
            .take()
            .unwrap_or_else(|| vec![whole; count].into_boxed_slice());
        for idx in self.indices(range).collect::<SmallVec<[usize; 16]>>() {
            subresources[idx] = state;
        }

        //collapse if everything is in the same state again
        if subresources.iter().all(|s| *s == subresources[0]) {
            self.whole = subresources[0];
        } else {
            self.subresources = Some(subresources);
        }
    }

    fn full_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.aspect,
            base_mip_level: 0,
            level_count: self.mip_levels,
            base_array_layer: 0,
            layer_count: self.array_layers,
        }
    }

    fn vk_range(&self, range: SubRange) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.aspect,
            base_mip_level: range.mips.0,
            level_count: range.mips.1 - range.mips.0,
            base_array_layer: range.layers.0,
            layer_count: range.layers.1 - range.layers.0,
        }
    }
}

enum Tracked {
    Buffer(StateInfo),
    Image(ImageTrack),
}

///Tracks the synchronisation state of resources identified by `K`.
pub struct ResourceTracker<K> {
    states: AHashMap<K, Tracked>,
    temporary: TempResources<K>,
}

impl<K: Copy + Eq + Hash + Debug> ResourceTracker<K> {
    pub fn new() -> Self {
        ResourceTracker {
            states: AHashMap::default(),
            temporary: TempResources::new(),
        }
    }

    fn insert(&mut self, key: K, tracked: Tracked) -> Result<(), TrackError> {
        if self.states.contains_key(&key) {
            #[cfg(feature = "logging")]
            log::error!("Resource {:?} is already tracked", key);
            return Err(TrackError::ResourceExists(format!("{:?}", key)));
        }
        self.states.insert(key, tracked);
        Ok(())
    }

    pub fn track_buffer(&mut self, key: K, initial: impl Into<StateInfo>) -> Result<(), TrackError> {
        self.insert(key, Tracked::Buffer(initial.into()))
    }

    ///Tracks an image with `mip_levels` × `array_layers` subresources. The whole image starts in `initial`.
    pub fn track_image(
        &mut self,
        key: K,
        initial: impl Into<StateInfo>,
        mip_levels: u32,
        array_layers: u32,
        aspect: vk::ImageAspectFlags,
    ) -> Result<(), TrackError> {
        self.insert(
            key,
            Tracked::Image(ImageTrack {
                mip_levels: mip_levels.max(1),
                array_layers: array_layers.max(1),
                aspect,
                whole: initial.into(),
                subresources: None,
            }),
        )
    }

    ///Stops tracking `key`. Also drops it from temporary tracking.
    pub fn remove(&mut self, key: K) -> Result<(), TrackError> {
        self.temporary.forget(&key);
        match self.states.remove(&key) {
            Some(_) => Ok(()),
            None => Err(Self::not_tracked(key)),
        }
    }

    pub fn is_tracked(&self, key: K) -> bool {
        self.states.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn not_tracked(key: K) -> TrackError {
        #[cfg(feature = "logging")]
        log::error!("Resource {:?} is not tracked", key);
        TrackError::NotTracked(format!("{:?}", key))
    }

    ///Current state of `key`. `range` is only considered for images, `None` means the whole image.
    ///
    /// # Panics
    ///
    /// if the subresources in `range` are in different states.
    pub fn get_state(
        &self,
        key: K,
        range: Option<&vk::ImageSubresourceRange>,
    ) -> Result<StateInfo, TrackError> {
        match self.states.get(&key) {
            None => Err(Self::not_tracked(key)),
            Some(Tracked::Buffer(state)) => Ok(*state),
            Some(Tracked::Image(image)) => {
                let range = image.resolve(range)?;
                Ok(image.state(range))
            }
        }
    }

    ///Computes the barrier that moves `key` (or the subresources in `range`) into `new_state`. Does not change the
    /// tracked state, see [update_state](Self::update_state).
    ///
    /// # Panics
    ///
    /// if the subresources in `range` are in different states.
    pub fn compute_barrier(
        &self,
        key: K,
        new_state: impl Into<StateInfo>,
        range: Option<&vk::ImageSubresourceRange>,
    ) -> Result<Barrier, TrackError> {
        let dst = new_state.into();
        match self.states.get(&key) {
            None => Err(Self::not_tracked(key)),
            Some(Tracked::Buffer(state)) => Ok(Barrier {
                src: *state,
                dst,
                range: None,
            }),
            Some(Tracked::Image(image)) => {
                let resolved = image.resolve(range)?;
                Ok(Barrier {
                    src: image.state(resolved),
                    dst,
                    range: Some(if image.is_full(&resolved) {
                        image.full_range()
                    } else {
                        image.vk_range(resolved)
                    }),
                })
            }
        }
    }

    ///Commits `new_state` for `key` (or the subresources in `range`).
    pub fn update_state(
        &mut self,
        key: K,
        new_state: impl Into<StateInfo>,
        range: Option<&vk::ImageSubresourceRange>,
    ) -> Result<(), TrackError> {
        let new_state = new_state.into();
        match self.states.get_mut(&key) {
            None => Err(Self::not_tracked(key)),
            Some(Tracked::Buffer(state)) => {
                *state = new_state;
                Ok(())
            }
            Some(Tracked::Image(image)) => {
                let resolved = image.resolve(range)?;
                image.set(resolved, new_state);
                Ok(())
            }
        }
    }

    ///[compute_barrier](Self::compute_barrier) followed by [update_state](Self::update_state).
    pub fn transition(
        &mut self,
        key: K,
        new_state: impl Into<StateInfo>,
        range: Option<&vk::ImageSubresourceRange>,
    ) -> Result<Barrier, TrackError> {
        let new_state = new_state.into();
        let barrier = self.compute_barrier(key, new_state, range)?;
        self.update_state(key, new_state, range)?;

        #[cfg(feature = "logging")]
        log::trace!("{:?}: {:?} -> {:?}", key, barrier.src, barrier.dst);

        Ok(barrier)
    }

    ///True if the image `key` is currently tracked per subresource.
    pub fn is_per_subresource(&self, key: K) -> bool {
        matches!(
            self.states.get(&key),
            Some(Tracked::Image(ImageTrack {
                subresources: Some(_),
                ..
            }))
        )
    }

    ///Marks `key` as temporary. It is released by [release_stale_temp_resources](Self::release_stale_temp_resources)
    /// once `guard` passed.
    pub fn track_temporary(&mut self, key: K, guard: Guard) -> Result<(), TrackError> {
        if !self.states.contains_key(&key) {
            return Err(Self::not_tracked(key));
        }
        self.temporary.register(key, guard);
        Ok(())
    }

    pub fn is_temporary(&self, key: K) -> bool {
        self.temporary.contains(&key)
    }

    ///Stops tracking every temporary resource whose guard passed. The returned keys can be destroyed.
    pub fn release_stale_temp_resources(&mut self, query: &impl GuardQuery) -> SmallVec<[K; 8]> {
        let released = self.temporary.release_stale(query);
        for key in &released {
            self.states.remove(key);
        }
        released
    }
}

impl<K: Copy + Eq + Hash + Debug> Default for ResourceTracker<K> {
    fn default() -> Self {
        Self::new()
    }
}
