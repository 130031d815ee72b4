use marrow::{
    ash::{self, vk, vk::Handle},
    limits::DeviceLimits,
};

use crate::{DescriptorBinding, DescriptorCategory};

///Turns a [DescriptorBinding] into the bytes the device expects in a descriptor buffer.
pub trait DescriptorEncoder {
    ///Size of one descriptor of `category` in bytes.
    fn descriptor_size(&self, category: DescriptorCategory) -> u64;

    ///Encodes `binding` into `dst`. `dst` is exactly [descriptor_size](Self::descriptor_size) bytes long.
    fn encode(&self, binding: &DescriptorBinding, dst: &mut [u8]);
}

fn limit_size(limits: &DeviceLimits, category: DescriptorCategory) -> u64 {
    match category {
        DescriptorCategory::UniformBuffer => limits.uniform_buffer_descriptor_size,
        DescriptorCategory::StorageBuffer => limits.storage_buffer_descriptor_size,
        DescriptorCategory::StorageImage => limits.storage_image_descriptor_size,
        DescriptorCategory::SampledImage => limits.sampled_image_descriptor_size,
        DescriptorCategory::Sampler => limits.sampler_descriptor_size,
    }
}

///Encoder based on `vkGetDescriptorEXT`.
pub struct VkDescriptorEncoder {
    loader: ash::ext::descriptor_buffer::Device,
    limits: DeviceLimits,
}

impl VkDescriptorEncoder {
    ///Loads the `VK_EXT_descriptor_buffer` functions. The extension has to be enabled on `device`.
    pub fn new(instance: &ash::Instance, device: &ash::Device, limits: DeviceLimits) -> Self {
        VkDescriptorEncoder {
            loader: ash::ext::descriptor_buffer::Device::new(instance, device),
            limits,
        }
    }

    pub fn loader(&self) -> &ash::ext::descriptor_buffer::Device {
        &self.loader
    }
}

impl DescriptorEncoder for VkDescriptorEncoder {
    fn descriptor_size(&self, category: DescriptorCategory) -> u64 {
        limit_size(&self.limits, category)
    }

    fn encode(&self, binding: &DescriptorBinding, dst: &mut [u8]) {
        let ty = binding.category().descriptor_type();
        match binding {
            DescriptorBinding::UniformBuffer { address, range }
            | DescriptorBinding::StorageBuffer { address, range } => {
                let info = vk::DescriptorAddressInfoEXT::default()
                    .address(*address)
                    .range(*range)
                    .format(vk::Format::UNDEFINED);
                let data = if ty == vk::DescriptorType::UNIFORM_BUFFER {
                    vk::DescriptorDataEXT {
                        p_uniform_buffer: &info,
                    }
                } else {
                    vk::DescriptorDataEXT {
                        p_storage_buffer: &info,
                    }
                };
                let get_info = vk::DescriptorGetInfoEXT::default().ty(ty).data(data);
                unsafe { self.loader.get_descriptor(&get_info, dst) };
            }
            DescriptorBinding::StorageImage { view, layout }
            | DescriptorBinding::SampledImage { view, layout } => {
                let info = vk::DescriptorImageInfo::default()
                    .image_view(*view)
                    .image_layout(*layout);
                let data = if ty == vk::DescriptorType::STORAGE_IMAGE {
                    vk::DescriptorDataEXT {
                        p_storage_image: &info,
                    }
                } else {
                    vk::DescriptorDataEXT {
                        p_sampled_image: &info,
                    }
                };
                let get_info = vk::DescriptorGetInfoEXT::default().ty(ty).data(data);
                unsafe { self.loader.get_descriptor(&get_info, dst) };
            }
            DescriptorBinding::Sampler(sampler) => {
                let data = vk::DescriptorDataEXT { p_sampler: sampler };
                let get_info = vk::DescriptorGetInfoEXT::default().ty(ty).data(data);
                unsafe { self.loader.get_descriptor(&get_info, dst) };
            }
        }
    }
}

///Headless encoder. Uses the descriptor sizes of the given limits, and writes the raw binding data in little endian:
///
/// - buffers: `address: u64`, `range: u64`
/// - images: `view: u64`, `layout: i32`
/// - samplers: `sampler: u64`
///
/// Bytes that don't fit the descriptor size are dropped, unused bytes are zeroed.
#[derive(Clone, Copy, Debug, Default)]
pub struct HostEncoder {
    pub limits: DeviceLimits,
}

impl HostEncoder {
    pub fn new(limits: DeviceLimits) -> Self {
        HostEncoder { limits }
    }
}

impl DescriptorEncoder for HostEncoder {
    fn descriptor_size(&self, category: DescriptorCategory) -> u64 {
        limit_size(&self.limits, category)
    }

    fn encode(&self, binding: &DescriptorBinding, dst: &mut [u8]) {
        let mut bytes = [0u8; 16];
        match binding {
            DescriptorBinding::UniformBuffer { address, range }
            | DescriptorBinding::StorageBuffer { address, range } => {
                bytes[0..8].copy_from_slice(&address.to_le_bytes());
                bytes[8..16].copy_from_slice(&range.to_le_bytes());
            }
            DescriptorBinding::StorageImage { view, layout }
            | DescriptorBinding::SampledImage { view, layout } => {
                bytes[0..8].copy_from_slice(&view.as_raw().to_le_bytes());
                bytes[8..12].copy_from_slice(&layout.as_raw().to_le_bytes());
            }
            DescriptorBinding::Sampler(sampler) => {
                bytes[0..8].copy_from_slice(&sampler.as_raw().to_le_bytes());
            }
        }

        dst.fill(0);
        let len = dst.len().min(bytes.len());
        dst[..len].copy_from_slice(&bytes[..len]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_encoding() {
        let enc = HostEncoder::default();
        let mut dst = [0xffu8; 32];
        enc.encode(
            &DescriptorBinding::SampledImage {
                view: vk::ImageView::from_raw(0xabcd),
                layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            },
            &mut dst,
        );
        assert_eq!(u64::from_le_bytes(dst[0..8].try_into().unwrap()), 0xabcd);
        assert_eq!(
            i32::from_le_bytes(dst[8..12].try_into().unwrap()),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL.as_raw()
        );
        assert!(dst[12..].iter().all(|b| *b == 0));
        assert_eq!(enc.descriptor_size(DescriptorCategory::SampledImage), 32);
    }
}
