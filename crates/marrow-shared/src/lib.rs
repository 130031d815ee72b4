#![no_std]
#![allow(unexpected_cfgs)]
//! Types that are shared between the CPU side of marrow and shader crates. Mostly the
//! [DescriptorIndex] a shader uses to dereference "texture N" inside the descriptor tables.
#[cfg(feature = "std")]
use ash::vk;

#[cfg(not(target_arch = "spirv"))]
use bytemuck::{Pod, Zeroable};

///Shader visible index of a descriptor. The lowest byte carries the descriptor category, the upper 24 bits are the
/// index into that category's descriptor table.
///
/// The index is the *same* value the descriptor heap uses to compute the descriptor's byte offset
/// (`range_base + index * stride`), so a shader can index its table directly.
//NOTE: Only derive Hash, Debug etc, on non-shader target.
#[cfg_attr(
    not(target_arch = "spirv"),
    derive(Clone, Copy, Hash, PartialEq, PartialOrd, Eq, Debug, Pod, Zeroable)
)]
#[cfg_attr(target_arch = "spirv", derive(Clone, Copy))]
#[repr(C)]
pub struct DescriptorIndex(u32);

impl DescriptorIndex {
    pub const CATEGORY_UNIFORM_BUFFER: u8 = 0;
    pub const CATEGORY_STORAGE_BUFFER: u8 = 1;
    pub const CATEGORY_STORAGE_IMAGE: u8 = 2;
    pub const CATEGORY_SAMPLED_IMAGE: u8 = 3;
    pub const CATEGORY_SAMPLER: u8 = 4;
    pub const CATEGORY_INVALID: u8 = 0xff;

    ///Number of valid categories.
    pub const CATEGORY_COUNT: usize = 5;

    ///Largest index that fits into the upper 24 bits.
    pub const MAX_INDEX: u32 = (1 << 24) - 1;

    pub const INVALID: Self = Self::new_unchecked(Self::CATEGORY_INVALID, Self::MAX_INDEX);

    ///Category bits of this index.
    pub const fn category(&self) -> u8 {
        self.0 as u8
    }

    ///Index into the category's descriptor table.
    pub const fn index(&self) -> u32 {
        self.0 >> 8
    }

    ///Raw value as it is pushed to shaders.
    pub const fn raw(&self) -> u32 {
        self.0
    }

    pub const fn from_raw(raw: u32) -> Self {
        DescriptorIndex(raw)
    }

    pub const fn is_invalid(&self) -> bool {
        self.category() >= Self::CATEGORY_COUNT as u8
    }

    ///Returns true whenever this index names a known category. **Don't confuse with [is_invalid](Self::is_invalid)**
    pub const fn is_valid(&self) -> bool {
        !self.is_invalid()
    }

    pub const fn new_unchecked(category: u8, index: u32) -> Self {
        DescriptorIndex((index << 8) | category as u32)
    }

    ///Creates a new index, panics if the category is unknown, or the index exceeds 2^24-1.
    pub const fn new(category: u8, index: u32) -> Self {
        assert!((category as usize) < Self::CATEGORY_COUNT);
        assert!(index <= Self::MAX_INDEX);
        Self::new_unchecked(category, index)
    }

    #[cfg(feature = "std")]
    pub fn descriptor_ty(&self) -> vk::DescriptorType {
        match self.category() {
            Self::CATEGORY_UNIFORM_BUFFER => vk::DescriptorType::UNIFORM_BUFFER,
            Self::CATEGORY_STORAGE_BUFFER => vk::DescriptorType::STORAGE_BUFFER,
            Self::CATEGORY_STORAGE_IMAGE => vk::DescriptorType::STORAGE_IMAGE,
            Self::CATEGORY_SAMPLED_IMAGE => vk::DescriptorType::SAMPLED_IMAGE,
            Self::CATEGORY_SAMPLER => vk::DescriptorType::SAMPLER,
            _ => {
                #[cfg(feature = "logging")]
                log::error!("Invalid descriptor index category {}", self.category());

                vk::DescriptorType::from_raw(i32::MAX)
            }
        }
    }

    ///Maps a Vulkan descriptor type to its category, `None` for types that have no table.
    #[cfg(feature = "std")]
    pub fn category_of(ty: vk::DescriptorType) -> Option<u8> {
        match ty {
            vk::DescriptorType::UNIFORM_BUFFER => Some(Self::CATEGORY_UNIFORM_BUFFER),
            vk::DescriptorType::STORAGE_BUFFER => Some(Self::CATEGORY_STORAGE_BUFFER),
            vk::DescriptorType::STORAGE_IMAGE => Some(Self::CATEGORY_STORAGE_IMAGE),
            vk::DescriptorType::SAMPLED_IMAGE => Some(Self::CATEGORY_SAMPLED_IMAGE),
            vk::DescriptorType::SAMPLER => Some(Self::CATEGORY_SAMPLER),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::DescriptorIndex;

    #[test]
    fn pack_unpack() {
        let idx = DescriptorIndex::new(DescriptorIndex::CATEGORY_SAMPLER, 42);
        assert!(idx.index() == 42);
        assert!(idx.category() == DescriptorIndex::CATEGORY_SAMPLER);
        assert!(idx.is_valid());
        assert!(DescriptorIndex::INVALID.is_invalid());
    }

    #[test]
    fn max_index_survives_packing() {
        let idx = DescriptorIndex::new(
            DescriptorIndex::CATEGORY_SAMPLED_IMAGE,
            DescriptorIndex::MAX_INDEX,
        );
        assert_eq!(idx.index(), DescriptorIndex::MAX_INDEX);
        assert_eq!(DescriptorIndex::from_raw(idx.raw()), idx);
    }

    #[cfg(feature = "std")]
    #[test]
    fn descriptor_type_mapping() {
        use super::vk;
        for ty in [
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::DescriptorType::STORAGE_BUFFER,
            vk::DescriptorType::STORAGE_IMAGE,
            vk::DescriptorType::SAMPLED_IMAGE,
            vk::DescriptorType::SAMPLER,
        ] {
            let cat = DescriptorIndex::category_of(ty).unwrap();
            assert_eq!(DescriptorIndex::new(cat, 3).descriptor_ty(), ty);
        }
        assert!(DescriptorIndex::category_of(vk::DescriptorType::INPUT_ATTACHMENT).is_none());
    }
}
