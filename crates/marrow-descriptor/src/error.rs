use marrow::MemoryError;
use thiserror::Error;

use crate::DescriptorCategory;

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("No {requested} consecutive {category:?} descriptors left (capacity {capacity})")]
    Exhausted {
        category: DescriptorCategory,
        requested: u32,
        capacity: u32,
    },
    #[error("Allocations need at least one descriptor")]
    EmptyAllocation,
    #[error("Can not write a {binding:?} descriptor into a {allocation:?} allocation")]
    CategoryMismatch {
        allocation: DescriptorCategory,
        binding: DescriptorCategory,
    },
    #[error("Sub offset {sub_offset} is outside of the allocation's {count} descriptors")]
    SubOffsetOutOfRange { sub_offset: u32, count: u32 },
    #[error("{capacity} {category:?} descriptors exceed the maximum shader visible index count {max}")]
    CapacityTooLarge {
        category: DescriptorCategory,
        capacity: u32,
        max: u32,
    },
    #[error("Frame slot {slot} is out of range for {frames_in_flight} frames in flight")]
    FrameSlotOutOfRange { slot: usize, frames_in_flight: u32 },
    #[error("Heap needs {required} bytes, but the backing memory has only {size} bytes")]
    MemoryTooSmall { required: u64, size: u64 },
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),
}
