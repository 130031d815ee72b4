use marrow::{FrameError, MemoryError, PoolError, RingError};
use marrow_descriptor::DescriptorError;
use thiserror::Error;

use crate::track::ResState;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackError {
    #[error("Resource {0} is already tracked")]
    ResourceExists(String),
    #[error("Resource {0} is not tracked")]
    NotTracked(String),
    #[error("Subresource range mips {mips:?} layers {layers:?} exceeds image with {mip_levels} mips and {array_layers} layers")]
    RangeOutOfBounds {
        mips: (u32, u32),
        layers: (u32, u32),
        mip_levels: u32,
        array_layers: u32,
    },
}

#[derive(Error, Debug)]
pub enum RmError {
    #[error("Resource handle is not valid (anymore)")]
    InvalidHandle,
    #[error("State {state:?} can not be used for {resource}")]
    InvalidState {
        state: ResState,
        resource: &'static str,
    },
    #[error("Binding {0} is not a per-frame uniform binding")]
    NotAUniformBinding(u32),
    #[error("Pool error: {0}")]
    PoolError(#[from] PoolError),
    #[error("Descriptor error: {0}")]
    DescriptorError(#[from] DescriptorError),
    #[error("Tracking error: {0}")]
    TrackError(#[from] TrackError),
    #[error("Ring error: {0}")]
    RingError(#[from] RingError),
    #[error("Frame error: {0}")]
    FrameError(#[from] FrameError),
    #[error("Memory error: {0}")]
    MemoryError(#[from] MemoryError),
}

#[cfg(test)]
mod tests {
    use super::{RmError, TrackError};
    use static_assertions::assert_impl_all;

    #[test]
    fn assure_send_sync() {
        assert_impl_all!(TrackError: Send, Sync);
        assert_impl_all!(RmError: Send, Sync);
    }
}
