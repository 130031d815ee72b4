//! # Marrow resource manager
//!
//! Ties the substrate of [marrow] and [marrow_descriptor] together into a single [Rm] context.
//!
//! The interesting part beside the context itself is the [ResourceTracker](track::ResourceTracker). It remembers the
//! last pipeline stage, access mask and (for images) layout of every resource, and derives the barrier any state change
//! needs. [BarrierBuilder](track::BarrierBuilder) batches those barriers into a single `vkCmdPipelineBarrier2` call.
//!
//! ```ignore
//! let mut rm = HostRm::new_host(&RmDesc::default())?;
//! let texture = rm.add_image(desc, ResState::Undefined)?;
//!
//! if let FrameStatus::Ready(token) = rm.begin_frame(&mut swapchain)? {
//!     let mut barriers = BarrierBuilder::new();
//!     rm.record_image_transition(&mut barriers, texture, ResState::TransferDst, None)?;
//!     //record copy, transition to ShaderReadOnly, draw ...
//!     rm.end_frame(token, &mut swapchain)?;
//! }
//! ```

mod error;
pub use error::{RmError, TrackError};

///Resource state tracking and barrier synthesis.
pub mod track;

mod resources;
pub use resources::{
    AnyResKey, BufferDesc, ImageDesc, ImageDescriptors, Released, ResBuffer, ResImage, ResSampler,
};

mod rm;
pub use rm::{HostRm, Rm, RmDesc};

mod chain;
pub use chain::{ChainLink, TextureChain};

pub use marrow;
pub use marrow_descriptor;
