//! Bounds-checked atomic access to a raw memory region.
//!
//! The buffer is a plain `(base, capacity)` pair; it never owns the memory it
//! points at. Owners (mappings, [`super::AlignedBuffer`]) must outlive every
//! view carved from them.
//!
//! # Memory ordering
//!
//! The accessor families map onto orderings as follows:
//!
//! - plain `get_*`/`put_*`: `Relaxed` atomic ops. Atomic rather than raw
//!   loads/stores so mixed access to shared mappings stays defined behavior.
//! - `get_*_volatile`: load-`Acquire`. Pairs with a releasing store on the
//!   other side of the mapping; used for tails, heads and published lengths.
//! - `put_*_ordered`: store-`Release`. Publishes every write issued before it.
//! - `put_i64_volatile`: store-`SeqCst`, for counters read by both sides.
//! - `compare_and_set_i64` / `get_and_add_i64`: `AcqRel` read-modify-write.

use std::sync::atomic::{AtomicI32, AtomicI64, AtomicU8, Ordering};

/// Rejected access: `offset + width` would pass the end of the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("access of {width} bytes at offset {offset} is out of bounds (capacity {capacity})")]
pub struct OutOfBounds {
    pub offset: usize,
    pub width: usize,
    pub capacity: usize,
}

/// A view over a region of (usually memory-mapped) memory.
///
/// Copyable by design: views are handed around by value and all carry the
/// same base pointer. Concurrent use is safe because every mutation goes
/// through atomic operations on naturally-aligned primitives.
#[derive(Debug, Clone, Copy)]
pub struct AtomicBuffer {
    ptr: *mut u8,
    capacity: usize,
}

// SAFETY: AtomicBuffer points into shared memory that is only mutated through
// the atomic accessors below; bulk copies are confined to regions that the
// surrounding protocols publish with release stores.
unsafe impl Send for AtomicBuffer {}
unsafe impl Sync for AtomicBuffer {}

impl AtomicBuffer {
    /// Wraps a raw region.
    ///
    /// # Safety
    /// `ptr` must point to at least `capacity` readable and writable bytes
    /// that stay valid for as long as any copy of this view is in use, and
    /// must be 8-byte aligned so the 64-bit accessors stay naturally aligned.
    pub unsafe fn wrap(ptr: *mut u8, capacity: usize) -> Self {
        debug_assert_eq!(ptr as usize % 8, 0, "buffer base must be 8-byte aligned");
        Self { ptr, capacity }
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline(always)]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    /// A sub-view of `[offset, offset + length)`.
    ///
    /// The caller keeps the alignment contract: `offset` must be a multiple
    /// of 8 if 64-bit accessors will be used on the result.
    pub fn view(&self, offset: usize, length: usize) -> Result<AtomicBuffer, OutOfBounds> {
        self.check(offset, length)?;
        Ok(Self {
            // SAFETY: offset + length <= capacity was just checked.
            ptr: unsafe { self.ptr.add(offset) },
            capacity: length,
        })
    }

    #[inline(always)]
    fn check(&self, offset: usize, width: usize) -> Result<(), OutOfBounds> {
        if width > self.capacity || offset > self.capacity - width {
            return Err(OutOfBounds {
                offset,
                width,
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    #[inline(always)]
    fn atomic_i32(&self, offset: usize) -> Result<&AtomicI32, OutOfBounds> {
        self.check(offset, 4)?;
        debug_assert_eq!((self.ptr as usize + offset) % 4, 0, "misaligned i32 access");
        // SAFETY: in bounds, aligned, and the region outlives the view.
        Ok(unsafe { &*(self.ptr.add(offset) as *const AtomicI32) })
    }

    #[inline(always)]
    fn atomic_i64(&self, offset: usize) -> Result<&AtomicI64, OutOfBounds> {
        self.check(offset, 8)?;
        debug_assert_eq!((self.ptr as usize + offset) % 8, 0, "misaligned i64 access");
        // SAFETY: in bounds, aligned, and the region outlives the view.
        Ok(unsafe { &*(self.ptr.add(offset) as *const AtomicI64) })
    }

    // ── bytes ───────────────────────────────────────────────────────────

    #[inline]
    pub fn get_u8(&self, offset: usize) -> Result<u8, OutOfBounds> {
        self.check(offset, 1)?;
        // SAFETY: bounds checked; byte atomics are always aligned.
        let a = unsafe { &*(self.ptr.add(offset) as *const AtomicU8) };
        Ok(a.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn put_u8(&self, offset: usize, value: u8) -> Result<(), OutOfBounds> {
        self.check(offset, 1)?;
        // SAFETY: bounds checked.
        let a = unsafe { &*(self.ptr.add(offset) as *const AtomicU8) };
        a.store(value, Ordering::Relaxed);
        Ok(())
    }

    // ── 32-bit ──────────────────────────────────────────────────────────

    #[inline]
    pub fn get_i32(&self, offset: usize) -> Result<i32, OutOfBounds> {
        Ok(self.atomic_i32(offset)?.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn put_i32(&self, offset: usize, value: i32) -> Result<(), OutOfBounds> {
        self.atomic_i32(offset)?.store(value, Ordering::Relaxed);
        Ok(())
    }

    /// Load-acquire: observes everything published before the matching
    /// release store.
    #[inline]
    pub fn get_i32_volatile(&self, offset: usize) -> Result<i32, OutOfBounds> {
        Ok(self.atomic_i32(offset)?.load(Ordering::Acquire))
    }

    /// Store-release: publishes all prior writes along with the value.
    #[inline]
    pub fn put_i32_ordered(&self, offset: usize, value: i32) -> Result<(), OutOfBounds> {
        self.atomic_i32(offset)?.store(value, Ordering::Release);
        Ok(())
    }

    // ── 64-bit ──────────────────────────────────────────────────────────

    #[inline]
    pub fn get_i64(&self, offset: usize) -> Result<i64, OutOfBounds> {
        Ok(self.atomic_i64(offset)?.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn put_i64(&self, offset: usize, value: i64) -> Result<(), OutOfBounds> {
        self.atomic_i64(offset)?.store(value, Ordering::Relaxed);
        Ok(())
    }

    /// Load-acquire; see [`AtomicBuffer::get_i32_volatile`].
    #[inline]
    pub fn get_i64_volatile(&self, offset: usize) -> Result<i64, OutOfBounds> {
        Ok(self.atomic_i64(offset)?.load(Ordering::Acquire))
    }

    /// Store-release; see [`AtomicBuffer::put_i32_ordered`].
    #[inline]
    pub fn put_i64_ordered(&self, offset: usize, value: i64) -> Result<(), OutOfBounds> {
        self.atomic_i64(offset)?.store(value, Ordering::Release);
        Ok(())
    }

    /// Sequentially-consistent store, for counters polled from both sides.
    #[inline]
    pub fn put_i64_volatile(&self, offset: usize, value: i64) -> Result<(), OutOfBounds> {
        self.atomic_i64(offset)?.store(value, Ordering::SeqCst);
        Ok(())
    }

    /// Single-shot compare-and-swap. Returns whether the swap happened.
    #[inline]
    pub fn compare_and_set_i64(
        &self,
        offset: usize,
        expected: i64,
        update: i64,
    ) -> Result<bool, OutOfBounds> {
        Ok(self
            .atomic_i64(offset)?
            .compare_exchange(expected, update, Ordering::AcqRel, Ordering::Acquire)
            .is_ok())
    }

    /// Atomic fetch-add returning the previous value.
    #[inline]
    pub fn get_and_add_i64(&self, offset: usize, delta: i64) -> Result<i64, OutOfBounds> {
        Ok(self.atomic_i64(offset)?.fetch_add(delta, Ordering::AcqRel))
    }

    // ── ranges ──────────────────────────────────────────────────────────

    /// Copies `dest.len()` bytes out of the buffer. Plain memcpy: ordering
    /// comes from the volatile load that made the range visible.
    pub fn get_bytes(&self, offset: usize, dest: &mut [u8]) -> Result<(), OutOfBounds> {
        self.check(offset, dest.len())?;
        // SAFETY: source range is in bounds; dest is a live exclusive slice.
        unsafe {
            std::ptr::copy_nonoverlapping(self.ptr.add(offset), dest.as_mut_ptr(), dest.len());
        }
        Ok(())
    }

    /// Copies `src` into the buffer. Plain memcpy: the caller publishes the
    /// range afterwards with an ordered store.
    pub fn put_bytes(&self, offset: usize, src: &[u8]) -> Result<(), OutOfBounds> {
        self.check(offset, src.len())?;
        // SAFETY: destination range is in bounds.
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), self.ptr.add(offset), src.len());
        }
        Ok(())
    }

    /// Buffer-to-buffer range copy.
    pub fn put_bytes_from(
        &self,
        offset: usize,
        src: &AtomicBuffer,
        src_offset: usize,
        length: usize,
    ) -> Result<(), OutOfBounds> {
        self.check(offset, length)?;
        src.check(src_offset, length)?;
        // SAFETY: both ranges bounds-checked; regions never overlap in
        // practice (distinct mappings or scratch), and copy direction is
        // unspecified for same-buffer use.
        unsafe {
            std::ptr::copy(src.ptr.add(src_offset), self.ptr.add(offset), length);
        }
        Ok(())
    }

    /// Fills `[offset, offset + length)` with `value`.
    pub fn set_memory(&self, offset: usize, length: usize, value: u8) -> Result<(), OutOfBounds> {
        self.check(offset, length)?;
        // SAFETY: range is in bounds.
        unsafe {
            std::ptr::write_bytes(self.ptr.add(offset), value, length);
        }
        Ok(())
    }

    // ── strings ─────────────────────────────────────────────────────────

    /// Reads an i32-length-prefixed UTF-8 string.
    pub fn get_string(&self, offset: usize) -> Result<String, OutOfBounds> {
        let length = self.get_i32(offset)?;
        let length = usize::try_from(length).map_err(|_| OutOfBounds {
            offset,
            width: 4,
            capacity: self.capacity,
        })?;
        let mut bytes = vec![0u8; length];
        self.get_bytes(offset + 4, &mut bytes)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Writes an i32-length-prefixed UTF-8 string; returns bytes consumed.
    pub fn put_string(&self, offset: usize, value: &str) -> Result<usize, OutOfBounds> {
        self.put_i32(offset, value.len() as i32)?;
        self.put_bytes(offset + 4, value.as_bytes())?;
        Ok(4 + value.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AlignedBuffer;

    #[test]
    fn rejects_access_past_capacity() {
        let mut mem = AlignedBuffer::with_capacity(64);
        let buf = mem.buffer();

        assert!(buf.put_i64(56, 1).is_ok());
        let err = buf.put_i64(57, 1).expect_err("should be out of bounds");
        assert_eq!(
            err,
            OutOfBounds {
                offset: 57,
                width: 8,
                capacity: 64
            }
        );
        assert!(buf.get_i32(61).is_err());
        assert!(buf.get_u8(64).is_err());
        assert!(buf.set_memory(32, 33, 0).is_err());
    }

    #[test]
    fn primitive_round_trips() {
        let mut mem = AlignedBuffer::with_capacity(64);
        let buf = mem.buffer();

        buf.put_i32(0, -7).unwrap();
        assert_eq!(buf.get_i32(0).unwrap(), -7);

        buf.put_i64_ordered(8, i64::MAX).unwrap();
        assert_eq!(buf.get_i64_volatile(8).unwrap(), i64::MAX);

        buf.put_i64_volatile(16, 42).unwrap();
        assert_eq!(buf.get_i64(16).unwrap(), 42);

        buf.put_u8(63, 0xFE).unwrap();
        assert_eq!(buf.get_u8(63).unwrap(), 0xFE);
    }

    #[test]
    fn compare_and_set_swaps_only_on_match() {
        let mut mem = AlignedBuffer::with_capacity(16);
        let buf = mem.buffer();

        buf.put_i64(0, 10).unwrap();
        assert!(!buf.compare_and_set_i64(0, 11, 20).unwrap());
        assert_eq!(buf.get_i64(0).unwrap(), 10);
        assert!(buf.compare_and_set_i64(0, 10, 20).unwrap());
        assert_eq!(buf.get_i64(0).unwrap(), 20);
    }

    #[test]
    fn get_and_add_returns_previous() {
        let mut mem = AlignedBuffer::with_capacity(16);
        let buf = mem.buffer();

        assert_eq!(buf.get_and_add_i64(0, 5).unwrap(), 0);
        assert_eq!(buf.get_and_add_i64(0, 5).unwrap(), 5);
        assert_eq!(buf.get_i64(0).unwrap(), 10);
    }

    #[test]
    fn byte_range_copies() {
        let mut mem = AlignedBuffer::with_capacity(32);
        let buf = mem.buffer();

        buf.put_bytes(4, b"hello").unwrap();
        let mut out = [0u8; 5];
        buf.get_bytes(4, &mut out).unwrap();
        assert_eq!(&out, b"hello");

        buf.set_memory(0, 32, 0xAA).unwrap();
        assert_eq!(buf.get_u8(31).unwrap(), 0xAA);
    }

    #[test]
    fn string_codec_round_trip() {
        let mut mem = AlignedBuffer::with_capacity(64);
        let buf = mem.buffer();

        let written = buf.put_string(8, "basalt:udp?endpoint=x").unwrap();
        assert_eq!(written, 4 + 21);
        assert_eq!(buf.get_string(8).unwrap(), "basalt:udp?endpoint=x");
    }

    #[test]
    fn views_are_windows_onto_the_parent() {
        let mut mem = AlignedBuffer::with_capacity(64);
        let buf = mem.buffer();

        let view = buf.view(16, 16).unwrap();
        view.put_i64(0, 99).unwrap();
        assert_eq!(buf.get_i64(16).unwrap(), 99);
        assert!(view.get_i64(16).is_err());
        assert!(buf.view(60, 8).is_err());
    }
}
