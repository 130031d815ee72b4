use ash::vk;

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    #[error("Handle pool exhausted, all {capacity} slots are in use")]
    Exhausted { capacity: u32 },
}

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Write of {size} bytes at offset {offset} exceeds mapped memory of {capacity} bytes")]
    OutOfBounds { offset: u64, size: u64, capacity: u64 },
    #[error("Memory is not host mappable")]
    NotMappable,
    #[cfg(feature = "default_allocator")]
    #[error("GpuAllocator error: {0}")]
    Allocation(#[from] gpu_allocator::AllocationError),
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Timeline stalled while waiting for value {target}, last reached value was {reached}")]
    Stalled { target: u64, reached: u64 },
    #[error("Timeline value must increase, tried to set {requested} while at {current}")]
    NotMonotonic { requested: u64, current: u64 },
}

#[derive(Error, Debug)]
pub enum RingError {
    #[error("Requested {requested} bytes from a ring of {capacity} bytes")]
    TooLarge { requested: u64, capacity: u64 },
    #[error(
        "Ring is full with data of frame {frame}, which is not submitted yet (current frame {current})"
    )]
    FrameNotSubmitted { frame: u64, current: u64 },
    #[error("Flush stalled while waiting for frame {frame}: {source}")]
    FlushStalled {
        frame: u64,
        #[source]
        source: SyncError,
    },
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame {0} was begun, but not ended")]
    FrameInProgress(u64),
    #[error("No frame is in progress")]
    NoFrameInProgress,
    #[error("Frame token for frame {token} does not match current frame {current}")]
    TokenMismatch { token: u64, current: u64 },
    #[error("Surface error: {0}")]
    Surface(vk::Result),
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
}

#[derive(Error, Debug)]
pub enum MarrowError {
    #[error("Pool error: {0}")]
    PoolError(#[from] PoolError),
    #[error("Memory error: {0}")]
    MemoryError(#[from] MemoryError),
    #[error("Sync error: {0}")]
    SyncError(#[from] SyncError),
    #[error("Ring error: {0}")]
    RingError(#[from] RingError),
    #[error("Frame error: {0}")]
    FrameError(#[from] FrameError),
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Other error: {0}")]
    Other(String),
}
