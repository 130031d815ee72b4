//! ## Mapped memory
//!
//! Both the descriptor heap and the ring allocator write directly into persistently mapped GPU memory. They only need
//! a handful of things from that memory, which is captured by the [MappedMemory] trait:
//!
//! - the host visible byte slice,
//! - the Vulkan buffer the bytes belong to (for copy commands and barriers),
//! - the buffer's device address (for descriptor-buffer bindings).
//!
//! [MappedBuffer] is the Vulkan implementation based on [Traverse Research's](https://github.com/Traverse-Research/gpu-allocator)
//! `gpu-allocator`, included through the `default_allocator` feature. [HostMemory] is a plain heap allocation
//! that is used for headless operation and tests.

use ash::vk;

use crate::{
    MemoryError,
    util::{align_down, align_up},
};

#[cfg(feature = "default_allocator")]
mod mapped_buffer;
#[cfg(feature = "default_allocator")]
pub use mapped_buffer::MappedBuffer;

///Persistently mapped, linear memory.
pub trait MappedMemory {
    ///Size of the mapped region in bytes.
    fn size(&self) -> u64;

    fn mapped(&self) -> &[u8];

    fn mapped_mut(&mut self) -> &mut [u8];

    ///Buffer backing the memory. `vk::Buffer::null()` for host only memory.
    fn buffer(&self) -> vk::Buffer;

    ///Device address of byte 0. Zero if the memory has no device address.
    fn device_address(&self) -> vk::DeviceAddress;

    ///Makes host writes in the given range visible to the device. Only needed for non-coherent memory.
    fn flush_range(&self, _offset: u64, _size: u64) -> Result<(), MemoryError> {
        Ok(())
    }

    ///[flush_range](Self::flush_range), widened to multiples of `atom_size` (the device's `nonCoherentAtomSize`) and
    /// clamped to the end of the memory.
    fn flush_atoms(&self, offset: u64, size: u64, atom_size: u64) -> Result<(), MemoryError> {
        if size == 0 {
            return Ok(());
        }
        if offset.checked_add(size).is_none_or(|end| end > self.size()) {
            return Err(MemoryError::OutOfBounds {
                offset,
                size,
                capacity: self.size(),
            });
        }
        let start = align_down(offset, atom_size);
        let end = align_up(offset + size, atom_size).min(self.size());
        self.flush_range(start, end - start)
    }

    ///Copies `data` to `offset`. Fails without writing anything if the range does not fit.
    fn write(&mut self, offset: u64, data: &[u8]) -> Result<(), MemoryError> {
        let size = data.len() as u64;
        let capacity = self.size();
        if offset.checked_add(size).is_none_or(|end| end > capacity) {
            #[cfg(feature = "logging")]
            log::error!(
                "Mapped write out of bounds: offset={}, size={}, capacity={}",
                offset,
                size,
                capacity
            );
            return Err(MemoryError::OutOfBounds {
                offset,
                size,
                capacity,
            });
        }

        let offset = offset as usize;
        self.mapped_mut()[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }
}

///Host allocated stand-in for a mapped GPU buffer. Reports a configurable fake device address, which allows
/// checking address math in headless setups.
pub struct HostMemory {
    bytes: Box<[u8]>,
    address: vk::DeviceAddress,
}

impl HostMemory {
    pub fn new(size: u64) -> Self {
        Self::with_address(size, 0)
    }

    pub fn with_address(size: u64, address: vk::DeviceAddress) -> Self {
        HostMemory {
            bytes: vec![0u8; size as usize].into_boxed_slice(),
            address,
        }
    }
}

impl MappedMemory for HostMemory {
    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn mapped(&self) -> &[u8] {
        &self.bytes
    }

    fn mapped_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    fn buffer(&self) -> vk::Buffer {
        vk::Buffer::null()
    }

    fn device_address(&self) -> vk::DeviceAddress {
        self.address
    }
}

impl<M: MappedMemory + ?Sized> MappedMemory for Box<M> {
    fn size(&self) -> u64 {
        (**self).size()
    }

    fn mapped(&self) -> &[u8] {
        (**self).mapped()
    }

    fn mapped_mut(&mut self) -> &mut [u8] {
        (**self).mapped_mut()
    }

    fn buffer(&self) -> vk::Buffer {
        (**self).buffer()
    }

    fn device_address(&self) -> vk::DeviceAddress {
        (**self).device_address()
    }

    fn flush_range(&self, offset: u64, size: u64) -> Result<(), MemoryError> {
        (**self).flush_range(offset, size)
    }
}

///Host memory that records every flushed range, for checking the flush paths of non-coherent memory.
#[cfg(test)]
pub(crate) struct FlushLog {
    pub memory: HostMemory,
    pub flushed: std::sync::Mutex<Vec<(u64, u64)>>,
}

#[cfg(test)]
impl FlushLog {
    pub fn new(size: u64) -> Self {
        FlushLog {
            memory: HostMemory::new(size),
            flushed: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn take(&self) -> Vec<(u64, u64)> {
        std::mem::take(&mut *self.flushed.lock().unwrap())
    }
}

#[cfg(test)]
impl MappedMemory for FlushLog {
    fn size(&self) -> u64 {
        self.memory.size()
    }

    fn mapped(&self) -> &[u8] {
        self.memory.mapped()
    }

    fn mapped_mut(&mut self) -> &mut [u8] {
        self.memory.mapped_mut()
    }

    fn buffer(&self) -> vk::Buffer {
        self.memory.buffer()
    }

    fn device_address(&self) -> vk::DeviceAddress {
        self.memory.device_address()
    }

    fn flush_range(&self, offset: u64, size: u64) -> Result<(), MemoryError> {
        self.flushed.lock().unwrap().push((offset, size));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flushes_whole_atoms() {
        let mem = FlushLog::new(100);
        mem.flush_atoms(70, 4, 64).unwrap();
        mem.flush_atoms(10, 60, 64).unwrap();
        //tail of the memory is not a whole atom
        mem.flush_atoms(90, 10, 64).unwrap();
        mem.flush_atoms(5, 0, 64).unwrap();
        assert_eq!(mem.take(), vec![(64, 36), (0, 100), (64, 36)]);
        assert!(mem.flush_atoms(100, 4, 64).is_err());
    }

    #[test]
    fn host_memory_write() {
        let mut mem = HostMemory::with_address(16, 0x1000);
        mem.write(4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(&mem.mapped()[4..8], &[1, 2, 3, 4]);
        assert_eq!(mem.device_address(), 0x1000);
        assert_eq!(mem.buffer(), vk::Buffer::null());
    }

    #[test]
    fn out_of_bounds_write_is_rejected() {
        let mut mem = HostMemory::new(8);
        assert!(matches!(
            mem.write(6, &[0; 4]),
            Err(MemoryError::OutOfBounds {
                offset: 6,
                size: 4,
                capacity: 8
            })
        ));
        assert!(mem.mapped().iter().all(|b| *b == 0));
    }
}
