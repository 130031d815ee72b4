//! # Marrow descriptor heap
//!
//! Bindless descriptor management on top of `VK_EXT_descriptor_buffer`. Instead of fixed size descriptor pools, all
//! descriptors live in one persistently mapped buffer, the [DescriptorHeap]. The heap is split into one
//! [DescriptorRange] per [DescriptorCategory]:
//!
//! - uniform buffers
//! - storage buffers
//! - storage images
//! - sampled images (without combined sampler)
//! - samplers
//!
//! Each range is an array of equally sized descriptors. A resource gets a [DescriptorAllocation] (one or more consecutive
//! descriptors) when it is created, writes its descriptor once via [write_descriptor](DescriptorHeap::write_descriptor)
//! and hands the resulting [DescriptorIndex](marrow_shared::DescriptorIndex) to shaders.
//!
//! The byte encoding of a descriptor is device specific. It is produced by a [DescriptorEncoder]. [VkDescriptorEncoder]
//! asks the driver, [HostEncoder] writes a stable, readable encoding for headless use.
//!
//! Uniform buffer descriptors usually point to per-frame data. Their range is therefore duplicated once per frame in
//! flight, the current copy is selected with [set_offsets](DescriptorHeap::set_offsets).

mod error;
pub use error::DescriptorError;

mod category;
pub use category::{DescriptorBinding, DescriptorCategory};

mod encoder;
pub use encoder::{DescriptorEncoder, HostEncoder, VkDescriptorEncoder};

mod range;
pub use range::DescriptorRange;

mod heap;
pub use heap::{BindingRecord, DescriptorAllocation, DescriptorHeap, DescriptorHeapDesc};

mod binding_table;
pub use binding_table::BindingTable;

pub use marrow_shared::DescriptorIndex;
