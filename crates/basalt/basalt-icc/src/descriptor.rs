//! Binary layout of the ring and broadcast regions.
//!
//! These layouts are shared with the media driver and must not change without
//! a CnC version bump. Each region is a data section of power-of-two capacity
//! followed by a trailer of cache-line-padded counters:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  data section (capacity bytes, power of 2)   │
//! ├──────────────────────────────────────────────┤
//! │  trailer: one 128-byte slot per counter      │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Records inside the data sections are 8-byte aligned and never straddle the
//! wrap: a producer that cannot fit a record before the end of the section
//! first writes a padding record (negative length) covering the remainder.

use std::mem::size_of;
use std::sync::atomic::AtomicI64;

use basalt_buffers::bit_util::CACHE_LINE_LENGTH;

/// Bytes per trailer counter slot. Two cache lines keep each counter from
/// false-sharing with its neighbours on either side.
pub const COUNTER_SLOT_LENGTH: usize = CACHE_LINE_LENGTH * 2;

const COUNTER_PAD: usize = COUNTER_SLOT_LENGTH - size_of::<AtomicI64>();

/// Header and alignment of records in the MPSC command ring.
///
/// Header is `{length: i32, type: i32}`. A zero length marks a claimed but
/// unpublished record; a negative length marks padding of `-length` bytes.
pub mod record_descriptor {
    pub const LENGTH_OFFSET: usize = 0;
    pub const TYPE_OFFSET: usize = 4;
    pub const HEADER_LENGTH: usize = 8;
    pub const ALIGNMENT: usize = 8;
}

/// Header and alignment of records in the broadcast ring.
///
/// On top of `{length, type}` every broadcast record embeds the tail position
/// at which it was published. A lapped receiver re-finds a record boundary by
/// scanning for a header whose embedded position matches its own location.
pub mod broadcast_record_descriptor {
    pub const LENGTH_OFFSET: usize = 0;
    pub const TYPE_OFFSET: usize = 4;
    pub const TAIL_POSITION_OFFSET: usize = 8;
    pub const HEADER_LENGTH: usize = 16;
    pub const ALIGNMENT: usize = 8;
}

/// Trailer of the MPSC command ring.
#[repr(C)]
pub struct RingTrailer {
    /// Producers claim space by CAS on this position.
    pub tail_position: AtomicI64,
    _pad0: [u8; COUNTER_PAD],

    /// Producer-side cache of the consumer position, refreshed on demand.
    pub head_cache_position: AtomicI64,
    _pad1: [u8; COUNTER_PAD],

    /// Consumer position, advanced with a release store after zeroing.
    pub head_position: AtomicI64,
    _pad2: [u8; COUNTER_PAD],

    /// Correlation-id allocator shared by every client of this driver.
    pub correlation_counter: AtomicI64,
    _pad3: [u8; COUNTER_PAD],

    /// Epoch-millisecond timestamp the driver refreshes while alive.
    pub consumer_heartbeat: AtomicI64,
    _pad4: [u8; COUNTER_PAD],
}

pub const RING_TRAILER_LENGTH: usize = COUNTER_SLOT_LENGTH * 5;
const _: () = assert!(size_of::<RingTrailer>() == RING_TRAILER_LENGTH);

impl RingTrailer {
    /// Overlays the trailer at `ptr`.
    ///
    /// # Safety
    /// `ptr` must point at `RING_TRAILER_LENGTH` bytes of 8-byte-aligned
    /// shared memory valid for `'a`.
    #[inline]
    pub unsafe fn overlay<'a>(ptr: *mut u8) -> &'a RingTrailer {
        &*(ptr as *const RingTrailer)
    }
}

/// Trailer of the broadcast ring.
#[repr(C)]
pub struct BroadcastTrailer {
    /// Position the transmitter is about to write through. Set before any
    /// record bytes are touched; receivers re-check it after copying.
    pub tail_intent_counter: AtomicI64,
    _pad0: [u8; COUNTER_PAD],

    /// Position after the last published record (release store).
    pub tail_counter: AtomicI64,
    _pad1: [u8; COUNTER_PAD],

    /// Start position of the most recently published record. Always a valid
    /// record boundary; the lap-recovery fallback.
    pub latest_counter: AtomicI64,
    _pad2: [u8; COUNTER_PAD],
}

pub const BROADCAST_TRAILER_LENGTH: usize = COUNTER_SLOT_LENGTH * 3;
const _: () = assert!(size_of::<BroadcastTrailer>() == BROADCAST_TRAILER_LENGTH);

impl BroadcastTrailer {
    /// Overlays the trailer at `ptr`.
    ///
    /// # Safety
    /// `ptr` must point at `BROADCAST_TRAILER_LENGTH` bytes of 8-byte-aligned
    /// shared memory valid for `'a`.
    #[inline]
    pub unsafe fn overlay<'a>(ptr: *mut u8) -> &'a BroadcastTrailer {
        &*(ptr as *const BroadcastTrailer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailer_sizes_are_stable() {
        assert_eq!(size_of::<RingTrailer>(), 640);
        assert_eq!(size_of::<BroadcastTrailer>(), 384);
    }

    #[test]
    fn counters_land_on_slot_boundaries() {
        assert_eq!(std::mem::offset_of!(RingTrailer, tail_position), 0);
        assert_eq!(std::mem::offset_of!(RingTrailer, head_cache_position), 128);
        assert_eq!(std::mem::offset_of!(RingTrailer, head_position), 256);
        assert_eq!(std::mem::offset_of!(RingTrailer, correlation_counter), 384);
        assert_eq!(std::mem::offset_of!(RingTrailer, consumer_heartbeat), 512);

        assert_eq!(std::mem::offset_of!(BroadcastTrailer, tail_intent_counter), 0);
        assert_eq!(std::mem::offset_of!(BroadcastTrailer, tail_counter), 128);
        assert_eq!(std::mem::offset_of!(BroadcastTrailer, latest_counter), 256);
    }
}
