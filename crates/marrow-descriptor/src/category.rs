use marrow::ash::vk;
use marrow_shared::DescriptorIndex;

///Closed set of descriptor kinds the heap manages. Each one gets its own [DescriptorRange](crate::DescriptorRange).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum DescriptorCategory {
    UniformBuffer = DescriptorIndex::CATEGORY_UNIFORM_BUFFER,
    StorageBuffer = DescriptorIndex::CATEGORY_STORAGE_BUFFER,
    StorageImage = DescriptorIndex::CATEGORY_STORAGE_IMAGE,
    SampledImage = DescriptorIndex::CATEGORY_SAMPLED_IMAGE,
    Sampler = DescriptorIndex::CATEGORY_SAMPLER,
}

impl DescriptorCategory {
    ///All categories, in heap order.
    pub const ALL: [Self; DescriptorIndex::CATEGORY_COUNT] = [
        Self::UniformBuffer,
        Self::StorageBuffer,
        Self::StorageImage,
        Self::SampledImage,
        Self::Sampler,
    ];

    pub const fn as_index(self) -> usize {
        self as usize
    }

    pub const fn from_raw(category: u8) -> Option<Self> {
        match category {
            DescriptorIndex::CATEGORY_UNIFORM_BUFFER => Some(Self::UniformBuffer),
            DescriptorIndex::CATEGORY_STORAGE_BUFFER => Some(Self::StorageBuffer),
            DescriptorIndex::CATEGORY_STORAGE_IMAGE => Some(Self::StorageImage),
            DescriptorIndex::CATEGORY_SAMPLED_IMAGE => Some(Self::SampledImage),
            DescriptorIndex::CATEGORY_SAMPLER => Some(Self::Sampler),
            _ => None,
        }
    }

    pub fn descriptor_type(self) -> vk::DescriptorType {
        match self {
            Self::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            Self::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
            Self::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
            Self::SampledImage => vk::DescriptorType::SAMPLED_IMAGE,
            Self::Sampler => vk::DescriptorType::SAMPLER,
        }
    }

    ///Descriptor-buffer usage a buffer needs to hold descriptors of this category.
    pub fn buffer_usage(self) -> vk::BufferUsageFlags {
        match self {
            Self::Sampler => vk::BufferUsageFlags::SAMPLER_DESCRIPTOR_BUFFER_EXT,
            _ => vk::BufferUsageFlags::RESOURCE_DESCRIPTOR_BUFFER_EXT,
        }
    }
}

///Everything a single descriptor can point to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DescriptorBinding {
    UniformBuffer {
        address: vk::DeviceAddress,
        range: u64,
    },
    StorageBuffer {
        address: vk::DeviceAddress,
        range: u64,
    },
    StorageImage {
        view: vk::ImageView,
        layout: vk::ImageLayout,
    },
    SampledImage {
        view: vk::ImageView,
        layout: vk::ImageLayout,
    },
    Sampler(vk::Sampler),
}

impl DescriptorBinding {
    pub fn category(&self) -> DescriptorCategory {
        match self {
            Self::UniformBuffer { .. } => DescriptorCategory::UniformBuffer,
            Self::StorageBuffer { .. } => DescriptorCategory::StorageBuffer,
            Self::StorageImage { .. } => DescriptorCategory::StorageImage,
            Self::SampledImage { .. } => DescriptorCategory::SampledImage,
            Self::Sampler(_) => DescriptorCategory::Sampler,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_matches_shared_index() {
        for cat in DescriptorCategory::ALL {
            assert_eq!(DescriptorCategory::from_raw(cat as u8), Some(cat));
            assert_eq!(
                DescriptorIndex::category_of(cat.descriptor_type()),
                Some(cat as u8)
            );
        }
        assert_eq!(DescriptorCategory::from_raw(DescriptorIndex::CATEGORY_INVALID), None);
    }
}
