use ash::vk;

///Device constants the descriptor heap and the ring allocator depend on. Queried once at startup through [query](Self::query)
/// and never changed afterwards.
///
/// For headless use (tests, tooling) [HOST](Self::HOST) provides plausible values. The descriptor sizes match what
/// current desktop drivers report for `VK_EXT_descriptor_buffer`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceLimits {
    pub uniform_buffer_descriptor_size: u64,
    pub storage_buffer_descriptor_size: u64,
    pub storage_image_descriptor_size: u64,
    pub sampled_image_descriptor_size: u64,
    pub sampler_descriptor_size: u64,
    ///Alignment every descriptor-buffer binding offset has to honour.
    pub descriptor_buffer_offset_alignment: u64,
    pub min_uniform_buffer_offset_alignment: u64,
    pub non_coherent_atom_size: u64,
}

impl DeviceLimits {
    pub const HOST: Self = DeviceLimits {
        uniform_buffer_descriptor_size: 16,
        storage_buffer_descriptor_size: 16,
        storage_image_descriptor_size: 32,
        sampled_image_descriptor_size: 32,
        sampler_descriptor_size: 16,
        descriptor_buffer_offset_alignment: 64,
        min_uniform_buffer_offset_alignment: 256,
        non_coherent_atom_size: 64,
    };

    ///Queries the limits of `physical_device`. Assumes `VK_EXT_descriptor_buffer` is supported.
    pub fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let mut descriptor_buffer = vk::PhysicalDeviceDescriptorBufferPropertiesEXT::default();
        let limits = {
            let mut properties2 =
                vk::PhysicalDeviceProperties2::default().push_next(&mut descriptor_buffer);
            unsafe { instance.get_physical_device_properties2(physical_device, &mut properties2) };
            properties2.properties.limits
        };

        let queried = DeviceLimits {
            uniform_buffer_descriptor_size: descriptor_buffer.uniform_buffer_descriptor_size as u64,
            storage_buffer_descriptor_size: descriptor_buffer.storage_buffer_descriptor_size as u64,
            storage_image_descriptor_size: descriptor_buffer.storage_image_descriptor_size as u64,
            sampled_image_descriptor_size: descriptor_buffer.sampled_image_descriptor_size as u64,
            sampler_descriptor_size: descriptor_buffer.sampler_descriptor_size as u64,
            descriptor_buffer_offset_alignment: descriptor_buffer
                .descriptor_buffer_offset_alignment,
            min_uniform_buffer_offset_alignment: limits.min_uniform_buffer_offset_alignment,
            non_coherent_atom_size: limits.non_coherent_atom_size,
        };

        #[cfg(feature = "logging")]
        log::info!("Device limits: {:#?}", queried);

        queried
    }
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self::HOST
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_limits_are_powers_of_two() {
        let l = DeviceLimits::default();
        for v in [
            l.uniform_buffer_descriptor_size,
            l.storage_buffer_descriptor_size,
            l.storage_image_descriptor_size,
            l.sampled_image_descriptor_size,
            l.sampler_descriptor_size,
            l.descriptor_buffer_offset_alignment,
            l.min_uniform_buffer_offset_alignment,
            l.non_coherent_atom_size,
        ] {
            assert!(v.is_power_of_two());
        }
    }
}
