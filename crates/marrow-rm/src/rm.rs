//! # Rm
//!
//! The resource manager context. It owns every piece of the substrate, and is passed around by reference instead of
//! living in a global:
//!
//! - handle pools for images, buffers and samplers,
//! - the descriptor heap including the renderer's [BindingTable],
//! - the [ResourceTracker] of all images and buffers,
//! - the transient [RingAllocator] and the [FramePacer] driving it.
//!
//! Adding a resource reserves a handle, starts tracking its state and writes its descriptors. Removing it invalidates
//! the handle immediately, but its descriptors are only reused, and its Vulkan objects only handed back through
//! [drain_released](Rm::drain_released), once the GPU finished every frame that could still use them.

use std::collections::VecDeque;

use marrow::{
    FrameError,
    ash::vk,
    bytemuck::Pod,
    frame::{FramePacer, FramePacerDesc, FrameStatus, FrameToken, PresentStatus, PresentTarget},
    limits::DeviceLimits,
    memory::{HostMemory, MappedMemory},
    pool::{Handle, HandlePool},
    ring::{RingAllocation, RingAllocator, RingDesc},
    sync::{HostTimeline, Timeline},
};
use marrow_descriptor::{
    BindingTable, DescriptorBinding, DescriptorCategory, DescriptorEncoder, DescriptorHeap,
    DescriptorHeapDesc, DescriptorIndex, HostEncoder,
};

use crate::{
    AnyResKey, BufferDesc, ImageDesc, ImageDescriptors, Released, ResBuffer, ResImage, ResSampler,
    RmError,
    resources::Retired,
    track::{Barrier, BarrierBuilder, Guard, GuardQuery, ResState, ResourceTracker, StateInfo},
};

///Configuration of an [Rm].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RmDesc {
    pub limits: DeviceLimits,
    ///Descriptor capacities. `frames_in_flight` is overwritten with the pacer's value.
    pub heap: DescriptorHeapDesc,
    pub ring: RingDesc,
    pub pacer: FramePacerDesc,
    pub max_images: u32,
    pub max_buffers: u32,
    pub max_samplers: u32,
}

impl RmDesc {
    pub const DEFAULT_MAX_IMAGES: u32 = 4096;
    pub const DEFAULT_MAX_BUFFERS: u32 = 1024;
    pub const DEFAULT_MAX_SAMPLERS: u32 = 128;

    fn heap_desc(&self) -> DescriptorHeapDesc {
        DescriptorHeapDesc {
            frames_in_flight: self.pacer.frames_in_flight as u32,
            ..self.heap
        }
    }
}

impl Default for RmDesc {
    fn default() -> Self {
        RmDesc {
            limits: DeviceLimits::default(),
            heap: DescriptorHeapDesc::default(),
            ring: RingDesc::default(),
            pacer: FramePacerDesc::default(),
            max_images: Self::DEFAULT_MAX_IMAGES,
            max_buffers: Self::DEFAULT_MAX_BUFFERS,
            max_samplers: Self::DEFAULT_MAX_SAMPLERS,
        }
    }
}

///Resource manager context.
pub struct Rm<M: MappedMemory, E: DescriptorEncoder, T: Timeline = HostTimeline> {
    limits: DeviceLimits,
    heap: DescriptorHeap<M, E>,
    bindings: BindingTable,
    tracker: ResourceTracker<AnyResKey>,
    ring: RingAllocator<M>,
    pacer: FramePacer<T>,

    images: HandlePool<ResImage>,
    buffers: HandlePool<ResBuffer>,
    samplers: HandlePool<ResSampler>,

    //removed resources, in order of their guards
    retired: VecDeque<(Guard, Retired)>,
    released: Vec<Released>,
}

///Headless [Rm], backed by host memory and a simulated timeline.
pub type HostRm = Rm<HostMemory, HostEncoder, HostTimeline>;

impl HostRm {
    ///Fake device address of the descriptor heap.
    pub const HOST_HEAP_ADDRESS: vk::DeviceAddress = 0x1_0000_0000;
    ///Fake device address of the ring.
    pub const HOST_RING_ADDRESS: vk::DeviceAddress = 0x2_0000_0000;

    pub fn new_host(desc: &RmDesc) -> Result<Self, RmError> {
        let encoder = HostEncoder::new(desc.limits);
        let heap_size = DescriptorHeap::<HostMemory, HostEncoder>::required_size(
            &desc.heap_desc(),
            &desc.limits,
            &encoder,
        );
        Self::new(
            HostMemory::with_address(heap_size, Self::HOST_HEAP_ADDRESS),
            HostMemory::with_address(desc.ring.size, Self::HOST_RING_ADDRESS),
            encoder,
            HostTimeline::new(0),
            desc,
        )
    }
}

impl<M: MappedMemory, E: DescriptorEncoder, T: Timeline> Rm<M, E, T> {
    ///Creates the context. `heap_memory` has to be at least [DescriptorHeap::required_size] big, and needs
    /// [DescriptorHeap::required_usage]. `timeline` is the frame timeline, expected to be at 0.
    ///
    /// # Panics
    ///
    /// if `desc.pacer.frames_in_flight` is out of range, see [FramePacer::new].
    pub fn new(
        heap_memory: M,
        ring_memory: M,
        encoder: E,
        timeline: T,
        desc: &RmDesc,
    ) -> Result<Self, RmError> {
        let mut heap = DescriptorHeap::new(heap_memory, encoder, &desc.heap_desc(), &desc.limits)?;
        let bindings = BindingTable::new(&mut heap)?;

        #[cfg(feature = "logging")]
        log::info!(
            "Rm with {} frames in flight, {} byte ring, pools {}/{}/{}",
            desc.pacer.frames_in_flight,
            ring_memory.size(),
            desc.max_images,
            desc.max_buffers,
            desc.max_samplers
        );

        Ok(Rm {
            limits: desc.limits,
            heap,
            bindings,
            tracker: ResourceTracker::new(),
            ring: RingAllocator::new(ring_memory, desc.ring.max_in_flight)
                .with_atom_size(desc.limits.non_coherent_atom_size),
            pacer: FramePacer::new(timeline, desc.pacer),
            images: HandlePool::new(desc.max_images),
            buffers: HandlePool::new(desc.max_buffers),
            samplers: HandlePool::new(desc.max_samplers),
            retired: VecDeque::new(),
            released: Vec::new(),
        })
    }

    pub fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    pub fn heap(&self) -> &DescriptorHeap<M, E> {
        &self.heap
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    pub fn tracker(&self) -> &ResourceTracker<AnyResKey> {
        &self.tracker
    }

    pub fn ring(&self) -> &RingAllocator<M> {
        &self.ring
    }

    pub fn pacer(&self) -> &FramePacer<T> {
        &self.pacer
    }

    pub fn images(&self) -> &HandlePool<ResImage> {
        &self.images
    }

    pub fn buffers(&self) -> &HandlePool<ResBuffer> {
        &self.buffers
    }

    pub fn samplers(&self) -> &HandlePool<ResSampler> {
        &self.samplers
    }

    pub fn current_frame(&self) -> u64 {
        self.pacer.current_frame()
    }

    pub fn last_finished_frame(&self) -> Option<u64> {
        self.pacer.last_finished_frame()
    }

    ///Guard that passes once the current frame finished.
    pub fn frame_guard(&self) -> Guard {
        Guard::for_frame(self.pacer.current_frame())
    }

    //Last frame that might use a resource that is removed right now.
    fn last_use_guard(&self) -> Option<Guard> {
        if self.pacer.frame_in_progress().is_some() {
            Some(Guard::for_frame(self.pacer.current_frame()))
        } else {
            self.pacer.current_frame().checked_sub(1).map(Guard::for_frame)
        }
    }

    ///Adds `desc` in `initial` state. Images with `SAMPLED` or `STORAGE` usage get a descriptor in the corresponding
    /// array.
    pub fn add_image(&mut self, desc: ImageDesc, initial: ResState) -> Result<Handle<ResImage>, RmError> {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        if !initial.is_image_state() {
            return Err(RmError::InvalidState {
                state: initial,
                resource: "images",
            });
        }

        let handle = self.images.try_reserve(ResImage {
            desc,
            sampled_descriptor: None,
            storage_descriptor: None,
        })?;

        if let Err(e) = self.init_image(handle, initial) {
            #[cfg(feature = "logging")]
            log::error!("Failed to add image {:?}: {}", desc.image, e);
            if let Some(mut image) = self.images.delete(handle) {
                for descriptor in image.take_descriptors() {
                    self.heap.free(descriptor);
                }
            }
            if self.tracker.is_tracked(handle.into()) {
                self.tracker.remove(handle.into())?;
            }
            return Err(e);
        }

        Ok(handle)
    }

    fn init_image(&mut self, handle: Handle<ResImage>, initial: ResState) -> Result<(), RmError> {
        let image = self.images.find_mut(handle).ok_or(RmError::InvalidHandle)?;
        let desc = image.desc;
        self.tracker.track_image(
            handle.into(),
            initial,
            desc.mip_levels,
            desc.array_layers,
            desc.aspect,
        )?;

        if desc.usage.contains(vk::ImageUsageFlags::SAMPLED) {
            let layout = if desc.aspect.intersects(vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL) {
                vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
            } else {
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
            };
            let allocation = self.heap.try_allocate(DescriptorCategory::SampledImage, 1, 1)?;
            let written = self.heap.write_descriptor(
                &allocation,
                &DescriptorBinding::SampledImage {
                    view: desc.view,
                    layout,
                },
                0,
            );
            image.sampled_descriptor = Some(allocation);
            written?;
        }

        if desc.usage.contains(vk::ImageUsageFlags::STORAGE) {
            let allocation = self.heap.try_allocate(DescriptorCategory::StorageImage, 1, 1)?;
            let written = self.heap.write_descriptor(
                &allocation,
                &DescriptorBinding::StorageImage {
                    view: desc.view,
                    layout: vk::ImageLayout::GENERAL,
                },
                0,
            );
            image.storage_descriptor = Some(allocation);
            written?;
        }

        Ok(())
    }

    ///Adds `desc` in `initial` state. Buffers with `STORAGE_BUFFER` usage get a descriptor in the storage buffer array.
    pub fn add_buffer(&mut self, desc: BufferDesc, initial: ResState) -> Result<Handle<ResBuffer>, RmError> {
        if !initial.is_buffer_state() {
            return Err(RmError::InvalidState {
                state: initial,
                resource: "buffers",
            });
        }

        let handle = self.buffers.try_reserve(ResBuffer {
            desc,
            storage_descriptor: None,
        })?;

        if let Err(e) = self.init_buffer(handle, initial) {
            #[cfg(feature = "logging")]
            log::error!("Failed to add buffer {:?}: {}", desc.buffer, e);
            if let Some(descriptor) = self
                .buffers
                .delete(handle)
                .and_then(|mut b| b.storage_descriptor.take())
            {
                self.heap.free(descriptor);
            }
            if self.tracker.is_tracked(handle.into()) {
                self.tracker.remove(handle.into())?;
            }
            return Err(e);
        }

        Ok(handle)
    }

    fn init_buffer(&mut self, handle: Handle<ResBuffer>, initial: ResState) -> Result<(), RmError> {
        let buffer = self.buffers.find_mut(handle).ok_or(RmError::InvalidHandle)?;
        let desc = buffer.desc;
        self.tracker.track_buffer(handle.into(), initial)?;

        if desc.usage.contains(vk::BufferUsageFlags::STORAGE_BUFFER) {
            let allocation = self.heap.try_allocate(DescriptorCategory::StorageBuffer, 1, 1)?;
            let written = self.heap.write_descriptor(
                &allocation,
                &DescriptorBinding::StorageBuffer {
                    address: desc.address,
                    range: desc.size,
                },
                0,
            );
            buffer.storage_descriptor = Some(allocation);
            written?;
        }
        Ok(())
    }

    pub fn add_sampler(&mut self, sampler: vk::Sampler) -> Result<Handle<ResSampler>, RmError> {
        let allocation = self.heap.try_allocate(DescriptorCategory::Sampler, 1, 1)?;
        if let Err(e) = self
            .heap
            .write_descriptor(&allocation, &DescriptorBinding::Sampler(sampler), 0)
        {
            self.heap.free(allocation);
            return Err(e.into());
        }

        match self.samplers.try_reserve(ResSampler {
            sampler,
            descriptor: None,
        }) {
            Ok(handle) => {
                if let Some(res) = self.samplers.find_mut(handle) {
                    res.descriptor = Some(allocation);
                }
                Ok(handle)
            }
            Err(e) => {
                self.heap.free(allocation);
                Err(e.into())
            }
        }
    }

    ///Removes `handle`. The handle is invalid afterwards, the image's descriptors and Vulkan objects are released once
    /// no in-flight frame can use them anymore.
    pub fn remove_image(&mut self, handle: Handle<ResImage>) -> Result<(), RmError> {
        let Some(mut image) = self.images.delete(handle) else {
            #[cfg(feature = "logging")]
            log::warn!("Tried to remove stale image {:?}", handle);
            return Err(RmError::InvalidHandle);
        };
        self.tracker.remove(handle.into())?;
        self.retire(Retired {
            descriptors: image.take_descriptors(),
            released: Released::Image {
                image: image.desc.image,
                view: image.desc.view,
            },
        });
        Ok(())
    }

    ///Like [remove_image](Self::remove_image), for buffers.
    pub fn remove_buffer(&mut self, handle: Handle<ResBuffer>) -> Result<(), RmError> {
        let Some(mut buffer) = self.buffers.delete(handle) else {
            #[cfg(feature = "logging")]
            log::warn!("Tried to remove stale buffer {:?}", handle);
            return Err(RmError::InvalidHandle);
        };
        self.tracker.remove(handle.into())?;
        self.retire(Retired {
            descriptors: buffer.storage_descriptor.take().into_iter().collect(),
            released: Released::Buffer(buffer.desc.buffer),
        });
        Ok(())
    }

    ///Like [remove_image](Self::remove_image), for samplers.
    pub fn remove_sampler(&mut self, handle: Handle<ResSampler>) -> Result<(), RmError> {
        let Some(mut sampler) = self.samplers.delete(handle) else {
            #[cfg(feature = "logging")]
            log::warn!("Tried to remove stale sampler {:?}", handle);
            return Err(RmError::InvalidHandle);
        };
        self.retire(Retired {
            descriptors: sampler.descriptor.take().into_iter().collect(),
            released: Released::Sampler(sampler.sampler),
        });
        Ok(())
    }

    ///Removes `key` once the current frame finished. Use it for resources that only live for a single frame.
    pub fn mark_temporary(&mut self, key: impl Into<AnyResKey>) -> Result<(), RmError> {
        let key = key.into();
        if !self.contains(key) {
            return Err(RmError::InvalidHandle);
        }
        let guard = self.frame_guard();
        self.tracker.track_temporary(key, guard)?;
        Ok(())
    }

    pub fn contains(&self, key: impl Into<AnyResKey>) -> bool {
        match key.into() {
            AnyResKey::Image(h) => self.images.contains(h),
            AnyResKey::Buffer(h) => self.buffers.contains(h),
        }
    }

    fn retire(&mut self, retired: Retired) {
        match self.last_use_guard() {
            Some(guard) if !self.pacer.guard_finished(&guard) => {
                #[cfg(feature = "logging")]
                log::trace!("Retiring {:?} until {:?}", retired.released, guard);
                self.retired.push_back((guard, retired));
            }
            _ => self.release(retired),
        }
    }

    fn release(&mut self, retired: Retired) {
        for descriptor in retired.descriptors {
            self.heap.free(descriptor);
        }
        self.released.push(retired.released);
    }

    //Releases retired resources whose guard passed. Guards are pushed in frame order, so the queue is drained from the front.
    fn release_retired(&mut self) -> usize {
        let mut count = 0;
        while let Some(guard) = self.retired.front().map(|(guard, _)| *guard) {
            if !self.pacer.guard_finished(&guard) {
                break;
            }
            if let Some((_, retired)) = self.retired.pop_front() {
                self.release(retired);
                count += 1;
            }
        }
        count
    }

    ///Releases everything whose last use finished on the GPU. Called by [begin_frame](Self::begin_frame).
    pub fn collect_garbage(&mut self) {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        for key in self.tracker.release_stale_temp_resources(&self.pacer) {
            let retired = match key {
                AnyResKey::Image(h) => self.images.delete(h).map(|mut image| Retired {
                    descriptors: image.take_descriptors(),
                    released: Released::Image {
                        image: image.desc.image,
                        view: image.desc.view,
                    },
                }),
                AnyResKey::Buffer(h) => self.buffers.delete(h).map(|mut buffer| Retired {
                    descriptors: buffer.storage_descriptor.take().into_iter().collect(),
                    released: Released::Buffer(buffer.desc.buffer),
                }),
            };
            if let Some(retired) = retired {
                self.release(retired);
            }
        }

        let _released = self.release_retired();
        let _flushed = self.ring.flush(&self.pacer);

        #[cfg(feature = "logging")]
        log::trace!(
            "Released {} resources, retired {} ring allocations",
            _released,
            _flushed
        );
    }

    ///Returns the Vulkan objects that are not used anymore. The caller destroys them.
    pub fn drain_released(&mut self) -> std::vec::Drain<'_, Released> {
        self.released.drain(..)
    }

    ///Number of removed resources that wait for the GPU.
    pub fn pending_release_count(&self) -> usize {
        self.retired.len()
    }

    ///Starts the next frame, see [FramePacer::begin_frame]. Also releases everything the GPU finished with.
    pub fn begin_frame(&mut self, target: &mut impl PresentTarget) -> Result<FrameStatus, RmError> {
        let status = self.pacer.begin_frame(target)?;
        self.collect_garbage();
        Ok(status)
    }

    ///Ends the frame of `token`, see [FramePacer::end_frame].
    pub fn end_frame(
        &mut self,
        token: FrameToken,
        target: &mut impl PresentTarget,
    ) -> Result<PresentStatus, RmError> {
        Ok(self.pacer.end_frame(token, target)?)
    }

    ///Waits for all submitted frames, then releases everything.
    pub fn wait_idle(&mut self) -> Result<(), RmError> {
        self.pacer.wait_idle().map_err(FrameError::from)?;
        self.collect_garbage();
        Ok(())
    }

    fn check_state(&self, key: AnyResKey, state: ResState) -> Result<(), RmError> {
        let (valid, resource) = match key {
            AnyResKey::Image(h) => {
                if !self.images.contains(h) {
                    return Err(RmError::InvalidHandle);
                }
                (state.is_image_state(), "images")
            }
            AnyResKey::Buffer(h) => {
                if !self.buffers.contains(h) {
                    return Err(RmError::InvalidHandle);
                }
                (state.is_buffer_state(), "buffers")
            }
        };
        if valid {
            Ok(())
        } else {
            Err(RmError::InvalidState { state, resource })
        }
    }

    pub fn get_state(
        &self,
        key: impl Into<AnyResKey>,
        range: Option<&vk::ImageSubresourceRange>,
    ) -> Result<StateInfo, RmError> {
        let key = key.into();
        if !self.contains(key) {
            return Err(RmError::InvalidHandle);
        }
        Ok(self.tracker.get_state(key, range)?)
    }

    ///Moves `key` (or the subresources in `range`) into `state`, and returns the barrier that has to be recorded
    /// before the next use.
    ///
    /// # Panics
    ///
    /// if the subresources in `range` are in different states.
    pub fn transition(
        &mut self,
        key: impl Into<AnyResKey>,
        state: ResState,
        range: Option<&vk::ImageSubresourceRange>,
    ) -> Result<Barrier, RmError> {
        let key = key.into();
        self.check_state(key, state)?;
        Ok(self.tracker.transition(key, state, range)?)
    }

    ///Transitions `handle` and pushes the barrier into `builder`. Returns false if no barrier was needed.
    pub fn record_image_transition(
        &mut self,
        builder: &mut BarrierBuilder,
        handle: Handle<ResImage>,
        state: ResState,
        range: Option<&vk::ImageSubresourceRange>,
    ) -> Result<bool, RmError> {
        let barrier = self.transition(handle, state, range)?;
        let image = self.images.find(handle).ok_or(RmError::InvalidHandle)?;
        Ok(builder.image(image.desc.image, &barrier))
    }

    ///Transitions `handle` and pushes the barrier into `builder`. Returns false if no barrier was needed.
    pub fn record_buffer_transition(
        &mut self,
        builder: &mut BarrierBuilder,
        handle: Handle<ResBuffer>,
        state: ResState,
    ) -> Result<bool, RmError> {
        let barrier = self.transition(handle, state, None)?;
        let buffer = self.buffers.find(handle).ok_or(RmError::InvalidHandle)?;
        Ok(builder.buffer(buffer.desc.buffer, &barrier))
    }

    pub fn image_descriptors(&self, handle: Handle<ResImage>) -> Option<ImageDescriptors> {
        self.images.find(handle).map(|image| ImageDescriptors {
            sampled: image.sampled_descriptor.as_ref().map(|d| d.index()),
            storage: image.storage_descriptor.as_ref().map(|d| d.index()),
        })
    }

    pub fn buffer_descriptor(&self, handle: Handle<ResBuffer>) -> Option<DescriptorIndex> {
        self.buffers
            .find(handle)?
            .storage_descriptor
            .as_ref()
            .map(|d| d.index())
    }

    pub fn sampler_descriptor(&self, handle: Handle<ResSampler>) -> Option<DescriptorIndex> {
        self.samplers
            .find(handle)?
            .descriptor
            .as_ref()
            .map(|d| d.index())
    }

    ///Copies `data` into the ring. The allocation is valid until the current frame finished.
    pub fn upload(&mut self, data: &[u8], alignment: u64) -> Result<RingAllocation, RmError> {
        let allocation = self
            .ring
            .try_allocate(data.len() as u64, alignment, &self.pacer)?;
        self.ring.write(&allocation, data)?;
        Ok(allocation)
    }

    ///Copies `value` into the ring and points the uniform `binding` ([CAMERA](BindingTable::CAMERA) or
    /// [LIGHTS](BindingTable::LIGHTS)) of the current frame at it.
    ///
    /// Only valid between [begin_frame](Self::begin_frame) and [end_frame](Self::end_frame). Outside of a frame the
    /// descriptor copy of the current slot may still be read by an unfinished frame.
    pub fn push_uniform<U: Pod>(&mut self, binding: u32, value: &U) -> Result<RingAllocation, RmError> {
        if BindingTable::category_of(binding) != Some(DescriptorCategory::UniformBuffer) {
            return Err(RmError::NotAUniformBinding(binding));
        }
        let slot = match self.pacer.frame_in_progress() {
            Some(token) => token.slot,
            None => {
                #[cfg(feature = "logging")]
                log::error!("Uniform binding {} pushed outside of a frame", binding);
                return Err(FrameError::NoFrameInProgress.into());
            }
        };

        let allocation = self.ring.push_pod(
            value,
            self.limits.min_uniform_buffer_offset_alignment,
            &self.pacer,
        )?;
        self.bindings.write_uniform(
            &mut self.heap,
            binding,
            slot,
            allocation.device_address,
            allocation.size,
        )?;
        Ok(allocation)
    }

    ///Descriptor buffer offsets of the current frame, see [DescriptorHeap::set_offsets].
    pub fn set_offsets(&self) -> [vk::DeviceSize; DescriptorIndex::CATEGORY_COUNT] {
        self.bindings.set_offsets(&self.heap, self.pacer.frame_slot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marrow::{
        frame::NoPresent,
        sync::Timeline,
    };
    use marrow_descriptor::DescriptorHeapDesc;

    fn init_logger() {
        let _ = simple_logger::SimpleLogger::new()
            .with_level(log::LevelFilter::Warn)
            .init();
    }

    fn small_desc() -> RmDesc {
        RmDesc {
            heap: DescriptorHeapDesc {
                max_uniform_buffers: 4,
                max_storage_buffers: 16,
                max_storage_images: 16,
                max_sampled_images: 1000,
                max_samplers: 4,
                frames_in_flight: 2,
            },
            ring: RingDesc {
                size: 64 * 1024,
                max_in_flight: 64,
            },
            max_images: 1000,
            max_buffers: 16,
            max_samplers: 4,
            ..Default::default()
        }
    }

    fn texture(i: u64) -> ImageDesc {
        ImageDesc::color_2d(
            vk::Image::from_raw(i + 1),
            vk::ImageView::from_raw(i + 1),
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
        )
    }

    fn storage_buffer(i: u64) -> BufferDesc {
        BufferDesc {
            buffer: vk::Buffer::from_raw(i + 1),
            address: 0x10_0000 * (i + 1),
            size: 1024,
            usage: vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
        }
    }

    fn begin(rm: &mut HostRm) -> FrameToken {
        match rm.begin_frame(&mut NoPresent).unwrap() {
            FrameStatus::Ready(token) => token,
            FrameStatus::SurfaceStale => panic!("headless target can't be stale"),
        }
    }

    //Simulates the GPU finishing the frame, then ends it.
    fn finish(rm: &mut HostRm, token: FrameToken) {
        rm.pacer().timeline().signal(token.signal_value).unwrap();
        rm.end_frame(token, &mut NoPresent).unwrap();
    }

    use marrow::ash::vk::Handle as _;

    #[test]
    fn texture_churn_scenario() {
        init_logger();
        let mut rm = HostRm::new_host(&small_desc()).unwrap();

        let handles = (0..1000)
            .map(|i| rm.add_image(texture(i), ResState::Undefined).unwrap())
            .collect::<Vec<_>>();
        assert!(rm.images().is_full());

        let (removed, kept): (Vec<_>, Vec<_>) = handles
            .iter()
            .enumerate()
            .partition(|(i, _)| i % 2 == 0);
        for (_, h) in &removed {
            rm.remove_image(**h).unwrap();
        }

        //no frame was ever submitted, so nothing waits for the GPU
        assert_eq!(rm.pending_release_count(), 0);
        assert_eq!(rm.drain_released().count(), 500);

        let new_handles = (1000..1500)
            .map(|i| rm.add_image(texture(i), ResState::Undefined).unwrap())
            .collect::<Vec<_>>();

        for (_, h) in &removed {
            assert!(rm.images().find(**h).is_none());
            assert!(rm.image_descriptors(**h).is_none());
            assert!(matches!(rm.remove_image(**h), Err(RmError::InvalidHandle)));
        }
        for h in kept.iter().map(|(_, h)| **h).chain(new_handles.iter().copied()) {
            assert!(rm.images().find(h).is_some());
        }

        //every live texture has its own descriptor
        let mut indices = rm
            .images()
            .iter()
            .filter_map(|(h, _)| rm.image_descriptors(h)?.sampled)
            .collect::<Vec<_>>();
        assert_eq!(indices.len(), 1000);
        indices.sort_by_key(|i| i.index());
        indices.dedup();
        assert_eq!(indices.len(), 1000);
    }

    #[test]
    fn removal_waits_for_frame() {
        let mut rm = HostRm::new_host(&small_desc()).unwrap();

        let token = begin(&mut rm);
        let image = rm.add_image(texture(0), ResState::Undefined).unwrap();
        let sampled = rm.image_descriptors(image).unwrap().sampled.unwrap();
        rm.remove_image(image).unwrap();

        //handle is dead right away, the descriptor isn't
        assert!(!rm.contains(image));
        assert_eq!(rm.pending_release_count(), 1);
        assert_eq!(rm.heap().range(DescriptorCategory::SampledImage).in_use(), 1);
        rm.end_frame(token, &mut NoPresent).unwrap();

        //frame 0 still runs on the "GPU"
        let token = begin(&mut rm);
        assert_eq!(rm.pending_release_count(), 1);
        assert_eq!(rm.drain_released().count(), 0);
        rm.pacer().timeline().signal(1).unwrap();
        finish(&mut rm, token);

        let _token = begin(&mut rm);
        assert_eq!(rm.pending_release_count(), 0);
        assert_eq!(
            rm.drain_released().collect::<Vec<_>>(),
            vec![Released::Image {
                image: vk::Image::from_raw(1),
                view: vk::ImageView::from_raw(1)
            }]
        );
        assert_eq!(rm.heap().range(DescriptorCategory::SampledImage).in_use(), 0);

        //freed descriptor is handed out again
        let again = rm.add_image(texture(1), ResState::Undefined).unwrap();
        assert_eq!(rm.image_descriptors(again).unwrap().sampled, Some(sampled));
    }

    #[test]
    fn temporary_buffer_is_released() {
        let mut rm = HostRm::new_host(&small_desc()).unwrap();

        let token = begin(&mut rm);
        let buffer = rm.add_buffer(storage_buffer(0), ResState::Undefined).unwrap();
        assert!(rm.buffer_descriptor(buffer).is_some());
        rm.mark_temporary(buffer).unwrap();
        finish(&mut rm, token);

        let _token = begin(&mut rm);
        assert!(!rm.contains(buffer));
        assert!(!rm.tracker().is_tracked(buffer.into()));
        assert_eq!(
            rm.drain_released().collect::<Vec<_>>(),
            vec![Released::Buffer(vk::Buffer::from_raw(1))]
        );
        assert_eq!(rm.heap().range(DescriptorCategory::StorageBuffer).in_use(), 1);
    }

    #[test]
    fn transitions_build_barriers() {
        let mut rm = HostRm::new_host(&small_desc()).unwrap();
        let image = rm
            .add_image(texture(0).with_mips(4), ResState::Undefined)
            .unwrap();
        let buffer = rm.add_buffer(storage_buffer(0), ResState::Undefined).unwrap();

        let mut builder = BarrierBuilder::new();
        assert!(
            rm.record_image_transition(&mut builder, image, ResState::TransferDst, None)
                .unwrap()
        );
        assert!(
            rm.record_buffer_transition(&mut builder, buffer, ResState::TransferDst)
                .unwrap()
        );
        assert_eq!(builder.images.len(), 1);
        assert_eq!(builder.images[0].old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(builder.images[0].new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(builder.images[0].subresource_range.level_count, 4);
        builder.clear();

        let mip0 = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };
        let barrier = rm.transition(image, ResState::TransferSrc, Some(&mip0)).unwrap();
        assert_eq!(barrier.src, ResState::TransferDst.info());
        assert!(rm.tracker().is_per_subresource(image.into()));

        //read after read on the buffer needs nothing
        rm.transition(buffer, ResState::ShaderReadOnly, None).unwrap();
        assert!(
            !rm.record_buffer_transition(&mut builder, buffer, ResState::ShaderReadOnly)
                .unwrap()
        );

        assert!(matches!(
            rm.transition(image, ResState::VertexRead, None),
            Err(RmError::InvalidState { .. })
        ));
        assert!(matches!(
            rm.transition(buffer, ResState::ColorAttachment, None),
            Err(RmError::InvalidState { .. })
        ));

        rm.remove_buffer(buffer).unwrap();
        assert!(matches!(
            rm.transition(buffer, ResState::TransferSrc, None),
            Err(RmError::InvalidHandle)
        ));
    }

    #[test]
    fn push_uniform_points_binding_at_ring() {
        #[derive(Clone, Copy)]
        #[repr(C)]
        struct Camera {
            view_proj: [f32; 16],
        }
        unsafe impl marrow::bytemuck::Zeroable for Camera {}
        unsafe impl marrow::bytemuck::Pod for Camera {}

        let mut rm = HostRm::new_host(&small_desc()).unwrap();
        let token = begin(&mut rm);

        let camera = Camera {
            view_proj: [1.0; 16],
        };
        let allocation = rm.push_uniform(BindingTable::CAMERA, &camera).unwrap();
        assert_eq!(
            allocation.offset % rm.limits().min_uniform_buffer_offset_alignment,
            0
        );
        assert_eq!(allocation.device_address, HostRm::HOST_RING_ADDRESS + allocation.offset);

        let reserved = rm.bindings().reserved(BindingTable::CAMERA).unwrap();
        let offset = rm.heap().byte_offset_of(reserved, 0, token.slot) as usize;
        let bytes = &rm.heap().memory().mapped()[offset..offset + 16];
        assert_eq!(
            u64::from_le_bytes(bytes[0..8].try_into().unwrap()),
            allocation.device_address
        );
        assert_eq!(
            u64::from_le_bytes(bytes[8..16].try_into().unwrap()),
            core::mem::size_of::<Camera>() as u64
        );

        assert!(matches!(
            rm.push_uniform(BindingTable::TEXTURES, &camera),
            Err(RmError::NotAUniformBinding(BindingTable::TEXTURES))
        ));
    }

    #[test]
    fn push_uniform_outside_frame_keeps_in_flight_copy() {
        let mut rm = HostRm::new_host(&small_desc()).unwrap();
        let reserved = rm.bindings().reserved(BindingTable::CAMERA).unwrap();
        let slot0 = rm.heap().byte_offset_of(reserved, 0, 0) as usize;
        let camera_bytes = |rm: &HostRm| rm.heap().memory().mapped()[slot0..slot0 + 16].to_vec();

        //two frames in flight, the GPU finishes neither of them
        for _ in 0..2 {
            let token = begin(&mut rm);
            rm.push_uniform(BindingTable::CAMERA, &[0.5f32; 16]).unwrap();
            rm.end_frame(token, &mut NoPresent).unwrap();
        }
        assert_eq!(rm.last_finished_frame(), None);
        assert_eq!(rm.current_frame(), 2);

        let before = camera_bytes(&rm);
        assert!(matches!(
            rm.push_uniform(BindingTable::CAMERA, &[1.0f32; 16]),
            Err(RmError::FrameError(FrameError::NoFrameInProgress))
        ));
        assert_eq!(camera_bytes(&rm), before);
    }

    #[test]
    fn sampler_descriptors() {
        let mut rm = HostRm::new_host(&small_desc()).unwrap();
        let samplers = (0..4)
            .map(|i| rm.add_sampler(vk::Sampler::from_raw(i + 1)).unwrap())
            .collect::<Vec<_>>();
        //pool and range are both full
        assert!(rm.add_sampler(vk::Sampler::from_raw(9)).is_err());
        assert_eq!(rm.heap().range(DescriptorCategory::Sampler).in_use(), 4);

        let index = rm.sampler_descriptor(samplers[1]).unwrap();
        assert_eq!(index.category(), DescriptorIndex::CATEGORY_SAMPLER);
        rm.remove_sampler(samplers[1]).unwrap();
        assert!(rm.sampler_descriptor(samplers[1]).is_none());
        assert!(rm.add_sampler(vk::Sampler::from_raw(9)).is_ok());
    }
}
