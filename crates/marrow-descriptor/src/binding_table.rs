use marrow::{ash::vk, memory::MappedMemory};
use marrow_shared::DescriptorIndex;

use crate::{
    DescriptorAllocation, DescriptorBinding, DescriptorCategory, DescriptorEncoder,
    DescriptorError, DescriptorHeap,
};

///Maps the renderer's logical bindings to heap categories.
///
/// The first three bindings are single, reserved descriptors that are allocated when the table is created:
///
/// - [CAMERA](Self::CAMERA): per-frame camera uniform
/// - [LIGHTS](Self::LIGHTS): per-frame light uniform
/// - [MATERIALS](Self::MATERIALS): material storage buffer
///
/// The others are the large bindless arrays, whose descriptors are allocated per resource.
#[derive(Debug)]
pub struct BindingTable {
    camera: DescriptorAllocation,
    lights: DescriptorAllocation,
    materials: DescriptorAllocation,
}

impl BindingTable {
    pub const CAMERA: u32 = 0;
    pub const LIGHTS: u32 = 1;
    pub const MATERIALS: u32 = 2;
    pub const TEXTURES: u32 = 3;
    pub const SAMPLERS: u32 = 4;
    pub const STORAGE_IMAGES: u32 = 5;
    pub const STORAGE_BUFFERS: u32 = 6;

    pub const BINDING_COUNT: u32 = 7;

    ///Category the descriptors of `binding` belong to.
    pub fn category_of(binding: u32) -> Option<DescriptorCategory> {
        match binding {
            Self::CAMERA | Self::LIGHTS => Some(DescriptorCategory::UniformBuffer),
            Self::MATERIALS | Self::STORAGE_BUFFERS => Some(DescriptorCategory::StorageBuffer),
            Self::TEXTURES => Some(DescriptorCategory::SampledImage),
            Self::SAMPLERS => Some(DescriptorCategory::Sampler),
            Self::STORAGE_IMAGES => Some(DescriptorCategory::StorageImage),
            _ => None,
        }
    }

    ///True for the bindings that own a single, reserved descriptor.
    pub fn is_reserved(binding: u32) -> bool {
        binding <= Self::MATERIALS
    }

    ///Reserves the descriptors of the reserved bindings.
    pub fn new<M: MappedMemory, E: DescriptorEncoder>(
        heap: &mut DescriptorHeap<M, E>,
    ) -> Result<Self, DescriptorError> {
        let camera = heap.try_allocate(DescriptorCategory::UniformBuffer, 1, 1)?;
        let lights = match heap.try_allocate(DescriptorCategory::UniformBuffer, 1, 1) {
            Ok(l) => l,
            Err(e) => {
                heap.free(camera);
                return Err(e);
            }
        };
        let materials = match heap.try_allocate(DescriptorCategory::StorageBuffer, 1, 1) {
            Ok(m) => m,
            Err(e) => {
                heap.free(camera);
                heap.free(lights);
                return Err(e);
            }
        };

        Ok(BindingTable {
            camera,
            lights,
            materials,
        })
    }

    ///Descriptor of a reserved binding.
    pub fn reserved(&self, binding: u32) -> Option<&DescriptorAllocation> {
        match binding {
            Self::CAMERA => Some(&self.camera),
            Self::LIGHTS => Some(&self.lights),
            Self::MATERIALS => Some(&self.materials),
            _ => None,
        }
    }

    pub fn descriptor_index(&self, binding: u32) -> Option<DescriptorIndex> {
        self.reserved(binding).map(|a| a.index())
    }

    ///Points the camera or lights binding of `frame_slot` at `address`.
    pub fn write_uniform<M: MappedMemory, E: DescriptorEncoder>(
        &self,
        heap: &mut DescriptorHeap<M, E>,
        binding: u32,
        frame_slot: usize,
        address: vk::DeviceAddress,
        range: u64,
    ) -> Result<(), DescriptorError> {
        let Some(allocation) = self.reserved(binding) else {
            return Err(DescriptorError::CategoryMismatch {
                allocation: Self::category_of(binding).unwrap_or(DescriptorCategory::SampledImage),
                binding: DescriptorCategory::UniformBuffer,
            });
        };
        heap.write_descriptor_for_frame(
            allocation,
            &DescriptorBinding::UniformBuffer { address, range },
            0,
            frame_slot,
        )
    }

    ///Offsets of all categories for `frame_slot`, see [DescriptorHeap::set_offsets].
    pub fn set_offsets<M: MappedMemory, E: DescriptorEncoder>(
        &self,
        heap: &DescriptorHeap<M, E>,
        frame_slot: usize,
    ) -> [vk::DeviceSize; DescriptorIndex::CATEGORY_COUNT] {
        heap.set_offsets(frame_slot)
    }

    ///Gives the reserved descriptors back to `heap`.
    pub fn release<M: MappedMemory, E: DescriptorEncoder>(self, heap: &mut DescriptorHeap<M, E>) {
        heap.free(self.camera);
        heap.free(self.lights);
        heap.free(self.materials);
    }
}
