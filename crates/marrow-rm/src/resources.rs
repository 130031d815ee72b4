use std::fmt::Display;

use marrow::{ash::vk, pool::Handle};
use marrow_descriptor::{DescriptorAllocation, DescriptorIndex};
use smallvec::SmallVec;

///Creation info of an image that is handed to the [Rm](crate::Rm). The Vulkan objects are created by the caller, and
/// returned for destruction through [Rm::drain_released](crate::Rm::drain_released).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageDesc {
    pub image: vk::Image,
    ///View over all mips and layers. Used for the image's descriptors.
    pub view: vk::ImageView,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub aspect: vk::ImageAspectFlags,
    pub usage: vk::ImageUsageFlags,
}

impl ImageDesc {
    ///Single mip, single layer color image.
    pub fn color_2d(image: vk::Image, view: vk::ImageView, usage: vk::ImageUsageFlags) -> Self {
        ImageDesc {
            image,
            view,
            mip_levels: 1,
            array_layers: 1,
            aspect: vk::ImageAspectFlags::COLOR,
            usage,
        }
    }

    pub fn with_mips(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    pub fn with_layers(mut self, array_layers: u32) -> Self {
        self.array_layers = array_layers;
        self
    }
}

///A live image of the [Rm](crate::Rm).
#[derive(Debug)]
pub struct ResImage {
    pub desc: ImageDesc,
    ///Descriptor in the sampled image array, if the image has `SAMPLED` usage.
    pub sampled_descriptor: Option<DescriptorAllocation>,
    ///Descriptor in the storage image array, if the image has `STORAGE` usage.
    pub storage_descriptor: Option<DescriptorAllocation>,
}

impl ResImage {
    pub fn is_sampled_image(&self) -> bool {
        self.desc.usage.contains(vk::ImageUsageFlags::SAMPLED)
    }

    pub fn is_storage_image(&self) -> bool {
        self.desc.usage.contains(vk::ImageUsageFlags::STORAGE)
    }

    pub fn full_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.desc.aspect,
            base_mip_level: 0,
            level_count: self.desc.mip_levels,
            base_array_layer: 0,
            layer_count: self.desc.array_layers,
        }
    }

    pub(crate) fn take_descriptors(&mut self) -> SmallVec<[DescriptorAllocation; 2]> {
        self.sampled_descriptor
            .take()
            .into_iter()
            .chain(self.storage_descriptor.take())
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferDesc {
    pub buffer: vk::Buffer,
    pub address: vk::DeviceAddress,
    pub size: u64,
    pub usage: vk::BufferUsageFlags,
}

///A live buffer of the [Rm](crate::Rm).
#[derive(Debug)]
pub struct ResBuffer {
    pub desc: BufferDesc,
    ///Descriptor in the storage buffer array, if the buffer has `STORAGE_BUFFER` usage.
    pub storage_descriptor: Option<DescriptorAllocation>,
}

impl ResBuffer {
    pub fn is_storage_buffer(&self) -> bool {
        self.desc.usage.contains(vk::BufferUsageFlags::STORAGE_BUFFER)
    }
}

///A live sampler of the [Rm](crate::Rm). Samplers have no synchronisation state, so they are never tracked.
#[derive(Debug)]
pub struct ResSampler {
    pub sampler: vk::Sampler,
    pub descriptor: Option<DescriptorAllocation>,
}

///Key of every tracked resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AnyResKey {
    Image(Handle<ResImage>),
    Buffer(Handle<ResBuffer>),
}

impl From<Handle<ResImage>> for AnyResKey {
    fn from(h: Handle<ResImage>) -> Self {
        AnyResKey::Image(h)
    }
}

impl From<Handle<ResBuffer>> for AnyResKey {
    fn from(h: Handle<ResBuffer>) -> Self {
        AnyResKey::Buffer(h)
    }
}

impl Display for AnyResKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnyResKey::Image(h) => write!(f, "Image({}:{})", h.index(), h.generation()),
            AnyResKey::Buffer(h) => write!(f, "Buffer({}:{})", h.index(), h.generation()),
        }
    }
}

///Vulkan objects whose last use finished on the GPU. The [Rm](crate::Rm) does not own the objects, so the caller has
/// to destroy them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Released {
    Image { image: vk::Image, view: vk::ImageView },
    Buffer(vk::Buffer),
    Sampler(vk::Sampler),
}

//A removed resource that might still be in use by the GPU.
pub(crate) struct Retired {
    pub descriptors: SmallVec<[DescriptorAllocation; 2]>,
    pub released: Released,
}

///Shader visible indices of an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageDescriptors {
    pub sampled: Option<DescriptorIndex>,
    pub storage: Option<DescriptorIndex>,
}
