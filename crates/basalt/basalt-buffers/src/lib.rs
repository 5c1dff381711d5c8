//! `basalt-buffers`: bounds-checked atomic views over shared memory.
//!
//! Everything the client shares with the media driver lives in memory-mapped
//! files laid out at fixed offsets. [`AtomicBuffer`] is the single access
//! path to those regions: a `(base, capacity)` view offering primitive
//! accessors with explicit memory-order semantics, each rejecting any access
//! where `offset + width` would exceed the capacity.
//!
//! # Core Components
//!
//! - [`AtomicBuffer`]: the view itself
//! - [`AlignedBuffer`]: owned, 8-byte-aligned heap scratch for encoding
//! - [`OutOfBounds`]: the rejection error carrying offset/width/capacity
//! - [`bit_util`]: alignment helpers shared by the ring and log layouts

pub mod bit_util;

mod aligned;
mod atomic_buffer;

pub use aligned::AlignedBuffer;
pub use atomic_buffer::{AtomicBuffer, OutOfBounds};
