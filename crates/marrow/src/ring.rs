//! # Transient ring allocator
//!
//! Streams short lived per-frame data (uniform updates, staging data, dynamic vertices) through one fixed size,
//! persistently mapped buffer.
//!
//! Allocations are handed out in order. Each one is tagged with the frame that recorded it and queued in a FIFO. The
//! FIFO's front is the "free until" point: memory from the write cursor up to the oldest live allocation may be reused.
//! An allocation is only retired once its frame is reported finished by [FrameProgress], so the ring never overwrites
//! data the GPU might still read.
//!
//! When the ring is full, the allocator first retires everything that is already finished. If that is not enough it
//! *blocks* on the oldest in-flight frame. That is the intended back pressure of the ring. If the ring is full of data
//! of the frame that is currently recorded, waiting would deadlock, so [RingError::FrameNotSubmitted] is returned instead.

use std::collections::VecDeque;

use ash::vk;

use crate::{
    MemoryError, RingError, SyncError,
    frame::FrameProgress,
    memory::MappedMemory,
    util::align_up,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingDesc {
    ///Size of the ring buffer in bytes.
    pub size: u64,
    ///Upper bound of allocations that are in flight at once.
    pub max_in_flight: usize,
}

impl RingDesc {
    pub const DEFAULT_SIZE: u64 = 4 * 1024 * 1024;
    pub const DEFAULT_MAX_IN_FLIGHT: usize = 1024;
}

impl Default for RingDesc {
    fn default() -> Self {
        RingDesc {
            size: Self::DEFAULT_SIZE,
            max_in_flight: Self::DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

///Region of the ring owned by one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingAllocation {
    pub buffer: vk::Buffer,
    pub offset: u64,
    pub size: u64,
    ///Frame that recorded the allocation.
    pub frame: u64,
    ///Device address of the first byte.
    pub device_address: vk::DeviceAddress,
}

impl RingAllocation {
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

pub struct RingAllocator<M: MappedMemory> {
    memory: M,
    max_in_flight: usize,
    atom_size: u64,
    //first byte after the newest allocation
    cursor: u64,
    in_flight: VecDeque<RingAllocation>,
}

impl<M: MappedMemory> RingAllocator<M> {
    ///Creates a ring over all of `memory`.
    ///
    /// # Panics
    ///
    /// if `max_in_flight` is 0.
    pub fn new(memory: M, max_in_flight: usize) -> Self {
        assert!(max_in_flight > 0, "ring needs at least one in-flight allocation");

        #[cfg(feature = "logging")]
        log::info!(
            "Ring allocator with {} bytes, at most {} allocations in flight",
            memory.size(),
            max_in_flight
        );

        RingAllocator {
            memory,
            max_in_flight,
            atom_size: 1,
            cursor: 0,
            in_flight: VecDeque::with_capacity(max_in_flight),
        }
    }

    ///Flushes writes in multiples of `atom_size`. Set this to the device's `nonCoherentAtomSize` if the memory is not
    /// host coherent.
    pub fn with_atom_size(mut self, atom_size: u64) -> Self {
        self.atom_size = atom_size.max(1);
        self
    }

    pub fn capacity(&self) -> u64 {
        self.memory.size()
    }

    pub fn buffer(&self) -> vk::Buffer {
        self.memory.buffer()
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    ///Number of allocations that are not retired yet.
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    ///Offset of the oldest live allocation. Everything from the write cursor up to this offset can be reused. `None` if
    /// nothing is in flight.
    pub fn free_until(&self) -> Option<u64> {
        self.in_flight.front().map(|a| a.offset)
    }

    fn find_space(&self, size: u64, alignment: u64) -> Option<u64> {
        let capacity = self.memory.size();
        let start = align_up(self.cursor, alignment);

        let Some(front) = self.in_flight.front() else {
            return if start + size <= capacity {
                Some(start)
            } else {
                Some(0)
            };
        };

        if self.cursor <= front.offset {
            //wrapped, the only free region is [cursor, front)
            if start + size <= front.offset {
                Some(start)
            } else {
                None
            }
        } else if start + size <= capacity {
            Some(start)
        } else if size <= front.offset {
            Some(0)
        } else {
            None
        }
    }

    ///Allocates `size` bytes aligned to `alignment` for the current frame of `progress`. Blocks if the ring is full of
    /// data of frames the GPU has not finished yet.
    pub fn try_allocate(
        &mut self,
        size: u64,
        alignment: u64,
        progress: &impl FrameProgress,
    ) -> Result<RingAllocation, RingError> {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        let capacity = self.memory.size();
        if size > capacity {
            #[cfg(feature = "logging")]
            log::error!("Requested {} bytes from ring of {} bytes", size, capacity);
            return Err(RingError::TooLarge {
                requested: size,
                capacity,
            });
        }

        let frame = progress.current_frame();
        if size == 0 {
            return Ok(self.make_allocation(self.cursor.min(capacity), 0, frame));
        }

        loop {
            if self.in_flight.len() < self.max_in_flight {
                if let Some(offset) = self.find_space(size, alignment) {
                    let allocation = self.make_allocation(offset, size, frame);
                    self.cursor = allocation.end();
                    self.in_flight.push_back(allocation);

                    #[cfg(feature = "logging")]
                    log::trace!("Ring alloc {}..{} for frame {}", offset, allocation.end(), frame);
                    return Ok(allocation);
                }
            }

            if self.flush(progress) > 0 {
                continue;
            }

            self.wait_for_oldest(progress)?;
        }
    }

    ///Like [try_allocate](Self::try_allocate).
    ///
    /// # Panics
    ///
    /// if the request is larger than the ring, or the ring can not make progress.
    pub fn allocate(
        &mut self,
        size: u64,
        alignment: u64,
        progress: &impl FrameProgress,
    ) -> RingAllocation {
        match self.try_allocate(size, alignment, progress) {
            Ok(a) => a,
            Err(e) => panic!("Ring allocation failed: {}", e),
        }
    }

    fn make_allocation(&self, offset: u64, size: u64, frame: u64) -> RingAllocation {
        RingAllocation {
            buffer: self.memory.buffer(),
            offset,
            size,
            frame,
            device_address: self.memory.device_address() + offset,
        }
    }

    //Waits for the frame of the oldest allocation and retires it.
    fn wait_for_oldest(&mut self, progress: &impl FrameProgress) -> Result<usize, RingError> {
        let current = progress.current_frame();
        let oldest = self.in_flight.front().map(|a| a.frame).unwrap_or(current);
        if oldest >= current {
            #[cfg(feature = "logging")]
            log::error!(
                "Ring is full of data of frame {}, which is still recorded",
                oldest
            );
            return Err(RingError::FrameNotSubmitted {
                frame: oldest,
                current,
            });
        }

        #[cfg(feature = "logging")]
        log::warn!("Ring full, waiting for frame {} to finish", oldest);

        progress
            .wait_for_frame(oldest)
            .map_err(|source| RingError::FlushStalled {
                frame: oldest,
                source,
            })?;

        match self.flush(progress) {
            0 => Err(RingError::FlushStalled {
                frame: oldest,
                source: SyncError::Stalled {
                    target: oldest + 1,
                    reached: progress.last_finished_frame().map(|f| f + 1).unwrap_or(0),
                },
            }),
            retired => Ok(retired),
        }
    }

    ///Retires every allocation whose frame is finished. Returns the number of retired allocations.
    pub fn flush(&mut self, progress: &impl FrameProgress) -> usize {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        let Some(last_finished) = progress.last_finished_frame() else {
            return 0;
        };

        let mut retired = 0;
        while let Some(front) = self.in_flight.front() {
            if front.frame > last_finished {
                break;
            }
            self.in_flight.pop_front();
            retired += 1;
        }
        retired
    }

    ///Blocks until the oldest in-flight frame finished, then retires its allocations. Returns immediately if nothing
    /// is in flight.
    pub fn flush_blocking(&mut self, progress: &impl FrameProgress) -> Result<usize, RingError> {
        if self.in_flight.is_empty() {
            return Ok(0);
        }
        match self.flush(progress) {
            0 => self.wait_for_oldest(progress),
            retired => Ok(retired),
        }
    }

    ///Mapped bytes of `allocation`. Call [flush_written](Self::flush_written) after writing.
    ///
    /// # Panics
    ///
    /// if the allocation was not made by this ring.
    pub fn slice_mut(&mut self, allocation: &RingAllocation) -> &mut [u8] {
        let start = allocation.offset as usize;
        &mut self.memory.mapped_mut()[start..start + allocation.size as usize]
    }

    ///Copies `data` to the start of `allocation` and flushes it to the device.
    pub fn write(&mut self, allocation: &RingAllocation, data: &[u8]) -> Result<(), MemoryError> {
        if data.len() as u64 > allocation.size {
            return Err(MemoryError::OutOfBounds {
                offset: allocation.offset,
                size: data.len() as u64,
                capacity: allocation.size,
            });
        }
        self.memory.write(allocation.offset, data)?;
        self.flush_written(allocation, data.len() as u64)
    }

    ///Makes the first `size` bytes of `allocation` visible to the device.
    pub fn flush_written(&self, allocation: &RingAllocation, size: u64) -> Result<(), MemoryError> {
        self.memory
            .flush_atoms(allocation.offset, size.min(allocation.size), self.atom_size)
    }

    ///Allocates space for `value` and copies it into the ring. Typically used for per-frame uniform data.
    pub fn push_pod<T: bytemuck::Pod>(
        &mut self,
        value: &T,
        alignment: u64,
        progress: &impl FrameProgress,
    ) -> Result<RingAllocation, RingError> {
        let bytes = bytemuck::bytes_of(value);
        let alignment = alignment.max(core::mem::align_of::<T>() as u64);
        let allocation = self.try_allocate(bytes.len() as u64, alignment, progress)?;
        self.slice_mut(&allocation).copy_from_slice(bytes);
        self.flush_written(&allocation, bytes.len() as u64)?;
        Ok(allocation)
    }
}
