//! # Marrow
//!
//! The bottom layer of the marrow resource substrate. Higher level renderer code builds on the
//! primitives in here to create, bind and retire GPU objects without dangling references.
//!
//! # Usage
//!
//! - [HandlePool](pool::HandlePool) hands out generational [Handle](pool::Handle)s for any renderer owned object. Handles
//!   of deleted objects never validate again.
//! - [MappedMemory](memory::MappedMemory) abstracts a persistently mapped GPU buffer. [MappedBuffer](memory::MappedBuffer)
//!   is the Vulkan backed version, [HostMemory](memory::HostMemory) the headless one.
//! - [Timeline](sync::Timeline) is the fence abstraction everything else waits on.
//! - [FramePacer](frame::FramePacer) bounds the number of frames in flight and reports the last frame the GPU finished.
//! - [RingAllocator](ring::RingAllocator) streams transient per-frame data through a fixed size ring.
//!
//! None of the types in here are internally synchronised. They are meant to be driven by a single
//! recording thread.

pub use ash;
pub use bytemuck;
#[cfg(feature = "default_allocator")]
pub use gpu_allocator;

mod error;
pub use error::{FrameError, MarrowError, MemoryError, PoolError, RingError, SyncError};

///Generational handle pool. Fixed capacity, reuse safe storage for renderer objects.
pub mod pool;

///Persistently mapped memory, either backed by a Vulkan buffer or by host memory.
pub mod memory;

///Timeline (fence) abstraction. Includes a Vulkan timeline semaphore, and a host side simulation.
pub mod sync;

///Device reported limits that are queried once and then treated as immutable configuration.
pub mod limits;

///Frame pacing for a fixed number of frames in flight.
pub mod frame;

///Transient ring allocator for per-frame data.
pub mod ring;

///Small helpers, mostly alignment math.
pub mod util;
