//! `basalt-icc`: lock-free shared-memory channels between client and driver.
//!
//! Two rings carry all control-plane traffic:
//!
//! - [`ManyToOneRingBuffer`]: a byte-oriented MPSC ring. Every client thread
//!   may produce; the media driver is the single consumer. Used for the
//!   client→driver command stream.
//! - [`BroadcastTransmitter`] / [`BroadcastReceiver`]: a single-producer,
//!   lossy multi-consumer ring. The driver transmits; any number of clients
//!   receive independently, and a receiver that falls more than a buffer
//!   behind is lapped and resynchronised. Used for the driver→clients event
//!   stream.
//! - [`CopyReceiver`]: wraps a receiver and copies each record out of shared
//!   memory before the handler runs, so handlers may retain the bytes past
//!   the next poll.
//!
//! Both rings live inside regions of the CnC file; this crate only sees
//! [`basalt_buffers::AtomicBuffer`] views and never maps files itself.

mod broadcast;
mod copy_receiver;
mod error;
mod ring_buffer;

pub mod descriptor;

pub use broadcast::{BroadcastReceiver, BroadcastTransmitter};
pub use copy_receiver::CopyReceiver;
pub use error::IccError;
pub use ring_buffer::ManyToOneRingBuffer;
