use std::sync::{Arc, Mutex};

use ash::vk;
use gpu_allocator::{
    MemoryLocation,
    vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator},
};

use super::MappedMemory;
use crate::MemoryError;

///Persistently mapped buffer, allocated through gpu-allocator in `CpuToGpu` memory. The buffer is always created with
/// `SHADER_DEVICE_ADDRESS` usage, since descriptor buffers and streamed data are referenced by address.
///
/// `CpuToGpu` memory is host coherent, so [flush_range](MappedMemory::flush_range) is a no-op.
pub struct MappedBuffer {
    pub inner: vk::Buffer,
    pub usage: vk::BufferUsageFlags,
    size: u64,
    address: vk::DeviceAddress,
    device: ash::Device,
    allocator: Arc<Mutex<Allocator>>,
    //Option, so drop can hand the allocation back to the allocator
    allocation: Option<Allocation>,
}

impl MappedBuffer {
    ///Creates and maps a buffer of `size` bytes.
    pub fn new(
        device: &ash::Device,
        allocator: &Arc<Mutex<Allocator>>,
        size: u64,
        usage: vk::BufferUsageFlags,
        name: &str,
    ) -> Result<Self, MemoryError> {
        let usage = usage | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS;
        let create_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&create_info, None)? };
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let allocation = allocator
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: MemoryLocation::CpuToGpu,
                //NOTE: Buffers are always "linear" in memory
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            });

        let allocation = match allocation {
            Ok(a) => a,
            Err(e) => {
                #[cfg(feature = "logging")]
                log::error!("Failed to allocate mapped buffer {}: {}", name, e);
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e.into());
            }
        };

        //gpu-allocator maps CpuToGpu memory persistently. If it didn't, the buffer is useless to us.
        if allocation.mapped_ptr().is_none() {
            let _ = allocator
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .free(allocation);
            unsafe { device.destroy_buffer(buffer, None) };
            return Err(MemoryError::NotMappable);
        }

        let address = unsafe {
            if let Err(e) =
                device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
            {
                let _ = allocator
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .free(allocation);
                device.destroy_buffer(buffer, None);
                return Err(e.into());
            }
            device.get_buffer_device_address(&vk::BufferDeviceAddressInfo::default().buffer(buffer))
        };

        #[cfg(feature = "logging")]
        log::trace!(
            "Created mapped buffer {} [{:?}] size={} @ {:#x}",
            name,
            buffer,
            size,
            address
        );

        Ok(MappedBuffer {
            inner: buffer,
            usage,
            size,
            address,
            device: device.clone(),
            allocator: allocator.clone(),
            allocation: Some(allocation),
        })
    }
}

impl MappedMemory for MappedBuffer {
    fn size(&self) -> u64 {
        self.size
    }

    fn mapped(&self) -> &[u8] {
        match self.allocation.as_ref().and_then(|a| a.mapped_slice()) {
            //The allocation might be bigger than requested
            Some(slice) => &slice[..self.size as usize],
            None => &[],
        }
    }

    fn mapped_mut(&mut self) -> &mut [u8] {
        let size = self.size as usize;
        match self.allocation.as_mut().and_then(|a| a.mapped_slice_mut()) {
            Some(slice) => &mut slice[..size],
            None => &mut [],
        }
    }

    fn buffer(&self) -> vk::Buffer {
        self.inner
    }

    fn device_address(&self) -> vk::DeviceAddress {
        self.address
    }
}

impl Drop for MappedBuffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self
                .allocator
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .free(allocation)
            {
                //NOTE: failed free happens "silently". The allocator knows something is wrong and won't hand out
                //      that memory again.
                #[cfg(feature = "logging")]
                log::error!("Freeing mapped buffer allocation failed with: {}", e);
                #[cfg(not(feature = "logging"))]
                let _ = e;
            }
        }
        unsafe { self.device.destroy_buffer(self.inner, None) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(MappedBuffer: Send, Sync);
    }
}
