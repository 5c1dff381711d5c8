//! Many-producer, single-consumer byte ring for the client→driver command
//! stream.
//!
//! Producers claim space with a CAS on the tail counter and publish by
//! ordered-storing the record's header length; the single consumer (the
//! media driver) drains from the head, zeroes what it consumed, and advances
//! the head with an ordered store. Claiming may spin on CAS contention but
//! never blocks: when the consumer has not freed enough space the write
//! fails immediately with `BackPressured`.
//!
//! A record that would straddle the end of the data section is preceded by a
//! padding record (negative header length) covering the remainder, so records
//! are always contiguous in memory.

use std::sync::atomic::Ordering;

use basalt_buffers::bit_util::{align, is_power_of_two};
use basalt_buffers::AtomicBuffer;

use crate::descriptor::{record_descriptor, RingTrailer, RING_TRAILER_LENGTH};
use crate::IccError;

#[derive(Debug)]
pub struct ManyToOneRingBuffer {
    buffer: AtomicBuffer,
    capacity: usize,
    max_message_length: usize,
}

impl ManyToOneRingBuffer {
    /// Wraps a region consisting of a power-of-two data section followed by
    /// the ring trailer.
    pub fn wrap(buffer: AtomicBuffer) -> Result<Self, IccError> {
        let total = buffer.capacity();
        if total <= RING_TRAILER_LENGTH {
            return Err(IccError::InvalidCapacity(total));
        }
        let capacity = total - RING_TRAILER_LENGTH;
        if !is_power_of_two(capacity) {
            return Err(IccError::InvalidCapacity(total));
        }

        Ok(Self {
            buffer,
            capacity,
            max_message_length: capacity / 2,
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Largest payload a single record may carry.
    #[inline]
    pub fn max_message_length(&self) -> usize {
        self.max_message_length
    }

    #[inline]
    fn mask(&self) -> i64 {
        self.capacity as i64 - 1
    }

    #[inline]
    fn trailer(&self) -> &RingTrailer {
        // SAFETY: wrap() reserved RING_TRAILER_LENGTH bytes past the data
        // section; the base is 8-byte aligned and the region outlives self.
        unsafe { RingTrailer::overlay(self.buffer.as_ptr().add(self.capacity)) }
    }

    #[inline]
    pub fn tail_position(&self) -> i64 {
        self.trailer().tail_position.load(Ordering::Acquire)
    }

    #[inline]
    pub fn head_position(&self) -> i64 {
        self.trailer().head_position.load(Ordering::Acquire)
    }

    /// Allocates the next correlation id from the counter shared with every
    /// other client of this driver. Strictly increasing per ring.
    #[inline]
    pub fn next_correlation_id(&self) -> i64 {
        self.trailer().correlation_counter.fetch_add(1, Ordering::AcqRel)
    }

    /// Epoch-millisecond timestamp of the last driver heartbeat.
    #[inline]
    pub fn consumer_heartbeat_time(&self) -> i64 {
        self.trailer().consumer_heartbeat.load(Ordering::Acquire)
    }

    /// Written by the consumer side; exposed for tooling and tests.
    #[inline]
    pub fn set_consumer_heartbeat_time(&self, now_ms: i64) {
        self.trailer().consumer_heartbeat.store(now_ms, Ordering::SeqCst);
    }

    /// Writes one record of `length` bytes taken from `src` at `src_offset`.
    ///
    /// On success returns the record's position in the ring: the pre-increment
    /// tail (plus any padding inserted to wrap), always 8-byte aligned.
    pub fn write(
        &self,
        msg_type: i32,
        src: &AtomicBuffer,
        src_offset: usize,
        length: usize,
    ) -> Result<i64, IccError> {
        if length > self.max_message_length {
            return Err(IccError::MessageTooBig {
                length,
                max: self.max_message_length,
            });
        }

        let record_length = record_descriptor::HEADER_LENGTH + length;
        let required = align(record_length, record_descriptor::ALIGNMENT);
        let record_position = self.claim(required)?;
        let index = (record_position & self.mask()) as usize;

        self.buffer
            .put_i32(index + record_descriptor::TYPE_OFFSET, msg_type)?;
        self.buffer
            .put_bytes_from(index + record_descriptor::HEADER_LENGTH, src, src_offset, length)?;
        // Publish: consumers stop at a zero length, so the record becomes
        // visible only with this store.
        self.buffer
            .put_i32_ordered(index + record_descriptor::LENGTH_OFFSET, record_length as i32)?;

        Ok(record_position)
    }

    /// Claims `required` bytes, inserting a padding record when the claim
    /// would straddle the wrap. Returns the position of the claimed record.
    fn claim(&self, required: usize) -> Result<i64, IccError> {
        let trailer = self.trailer();
        let capacity = self.capacity as i64;
        let mask = self.mask();
        let required = required as i64;

        let mut head = trailer.head_cache_position.load(Ordering::Relaxed);

        loop {
            let tail = trailer.tail_position.load(Ordering::Acquire);

            if required > capacity - (tail - head) {
                head = trailer.head_position.load(Ordering::Acquire);
                if required > capacity - (tail - head) {
                    return Err(IccError::BackPressured);
                }
                trailer.head_cache_position.store(head, Ordering::Release);
            }

            let mut padding: i64 = 0;
            let tail_index = tail & mask;
            let to_end = capacity - tail_index;

            if required > to_end {
                // The record must start back at index 0, which is only free
                // once the consumer has moved past it in the current lap.
                let mut head_index = head & mask;
                if required > head_index {
                    head = trailer.head_position.load(Ordering::Acquire);
                    head_index = head & mask;
                    if required > head_index {
                        return Err(IccError::BackPressured);
                    }
                    trailer.head_cache_position.store(head, Ordering::Release);
                }
                padding = to_end;
            }

            if trailer
                .tail_position
                .compare_exchange(tail, tail + required + padding, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                if padding > 0 {
                    // Publish the padding record so the consumer can skip to
                    // the wrap without waiting on us.
                    self.buffer
                        .put_i32_ordered((tail_index as usize) + record_descriptor::LENGTH_OFFSET, -(padding as i32))?;
                    return Ok(tail + padding);
                }
                return Ok(tail);
            }
        }
    }

    /// Drains up to `max_records` published records, invoking
    /// `handler(msg_type, buffer, payload_offset, payload_length)` for each.
    ///
    /// Single-consumer only. Consumed bytes are zeroed before the head
    /// advances, which is what lets producers treat a zero length as
    /// "not yet published".
    pub fn read<F>(&self, mut handler: F, max_records: usize) -> Result<usize, IccError>
    where
        F: FnMut(i32, &AtomicBuffer, usize, usize),
    {
        let trailer = self.trailer();
        let head = trailer.head_position.load(Ordering::Relaxed);
        let head_index = (head & self.mask()) as usize;
        let max_block = self.capacity - head_index;

        let mut bytes_read = 0usize;
        let mut records = 0usize;

        while bytes_read < max_block && records < max_records {
            let record_index = head_index + bytes_read;
            let length = self
                .buffer
                .get_i32_volatile(record_index + record_descriptor::LENGTH_OFFSET)?;
            if length == 0 {
                break;
            }

            bytes_read += align(length.unsigned_abs() as usize, record_descriptor::ALIGNMENT);

            if length > 0 {
                let msg_type = self.buffer.get_i32(record_index + record_descriptor::TYPE_OFFSET)?;
                handler(
                    msg_type,
                    &self.buffer,
                    record_index + record_descriptor::HEADER_LENGTH,
                    length as usize - record_descriptor::HEADER_LENGTH,
                );
                records += 1;
            }
        }

        if bytes_read > 0 {
            self.buffer.set_memory(head_index, bytes_read, 0)?;
            trailer
                .head_position
                .store(head + bytes_read as i64, Ordering::Release);
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_buffers::AlignedBuffer;

    const CAPACITY: usize = 1024;

    fn ring_memory() -> AlignedBuffer {
        AlignedBuffer::with_capacity(CAPACITY + RING_TRAILER_LENGTH)
    }

    fn src_of(len: usize, fill: u8) -> (AlignedBuffer, usize) {
        let mut mem = AlignedBuffer::with_capacity(len.max(8));
        mem.buffer().set_memory(0, len, fill).unwrap();
        (mem, len)
    }

    #[test]
    fn rejects_non_power_of_two_region() {
        let mut mem = AlignedBuffer::with_capacity(1000 + RING_TRAILER_LENGTH);
        let err = ManyToOneRingBuffer::wrap(mem.buffer()).expect_err("must reject");
        assert!(matches!(err, IccError::InvalidCapacity(_)));
    }

    #[test]
    fn rejects_oversized_message() {
        let mut mem = ring_memory();
        let ring = ManyToOneRingBuffer::wrap(mem.buffer()).unwrap();
        let (mut src, _) = src_of(CAPACITY, 0);
        let err = ring
            .write(1, &src.buffer(), 0, CAPACITY / 2 + 1)
            .expect_err("too big");
        assert!(matches!(err, IccError::MessageTooBig { .. }));
    }

    #[test]
    fn write_returns_aligned_pre_increment_tail() {
        let mut mem = ring_memory();
        let ring = ManyToOneRingBuffer::wrap(mem.buffer()).unwrap();
        let (mut src, len) = src_of(392, 1);

        assert_eq!(ring.write(7, &src.buffer(), 0, len).unwrap(), 0);
        assert_eq!(ring.write(7, &src.buffer(), 0, len).unwrap(), 400);
        assert_eq!(ring.tail_position(), 800);
        assert!(ring.head_position() <= ring.tail_position());
    }

    #[test]
    fn wrap_inserts_padding_and_places_record_at_start() {
        // Capacity 1024: two 400-byte records, drain, then a 300-byte record.
        // The third write pads the remaining 224 bytes and lands at index 0.
        let mut mem = ring_memory();
        let ring = ManyToOneRingBuffer::wrap(mem.buffer()).unwrap();

        let (mut a, a_len) = src_of(392, 0xA1);
        let (mut b, b_len) = src_of(292, 0xB2);

        ring.write(1, &a.buffer(), 0, a_len).unwrap();
        ring.write(2, &a.buffer(), 0, a_len).unwrap();

        let mut seen = Vec::new();
        let drained = ring
            .read(|t, buf, offset, length| seen.push((t, length, buf.get_u8(offset).unwrap())), 16)
            .unwrap();
        assert_eq!(drained, 2);
        assert_eq!(seen, vec![(1, 392, 0xA1), (2, 392, 0xA1)]);
        assert_eq!(ring.head_position(), 800);

        let position = ring.write(3, &b.buffer(), 0, b_len).unwrap();
        assert_eq!(position, 1024, "record skips the 224-byte pad to index 0");
        assert_eq!(ring.tail_position(), 1024 + 304);

        seen.clear();
        let drained = ring
            .read(|t, buf, offset, length| seen.push((t, length, buf.get_u8(offset).unwrap())), 16)
            .unwrap();
        assert_eq!(drained, 1);
        assert_eq!(seen, vec![(3, 292, 0xB2)]);
        assert_eq!(ring.head_position(), ring.tail_position());
    }

    #[test]
    fn back_pressure_when_consumer_stalls() {
        let mut mem = ring_memory();
        let ring = ManyToOneRingBuffer::wrap(mem.buffer()).unwrap();
        let (mut src, len) = src_of(248, 0);

        // 256-byte records: four fit exactly, the fifth must fail.
        for _ in 0..4 {
            ring.write(1, &src.buffer(), 0, len).unwrap();
        }
        let err = ring.write(1, &src.buffer(), 0, len).expect_err("ring is full");
        assert!(matches!(err, IccError::BackPressured));

        // Head never passes tail, tail never runs more than a lap ahead.
        assert!(ring.head_position() <= ring.tail_position());
        assert!(ring.tail_position() <= ring.head_position() + CAPACITY as i64);
    }

    #[test]
    fn consumed_bytes_are_zeroed() {
        let mut mem = ring_memory();
        let buffer = mem.buffer();
        let ring = ManyToOneRingBuffer::wrap(buffer).unwrap();
        let (mut src, len) = src_of(56, 0xFF);

        ring.write(9, &src.buffer(), 0, len).unwrap();
        ring.read(|_, _, _, _| {}, 16).unwrap();

        for offset in (0..64).step_by(8) {
            assert_eq!(buffer.get_i64(offset).unwrap(), 0);
        }
    }

    #[test]
    fn correlation_ids_strictly_increase() {
        let mut mem = ring_memory();
        let ring = ManyToOneRingBuffer::wrap(mem.buffer()).unwrap();

        let mut last = ring.next_correlation_id();
        for _ in 0..100 {
            let next = ring.next_correlation_id();
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn heartbeat_round_trips() {
        let mut mem = ring_memory();
        let ring = ManyToOneRingBuffer::wrap(mem.buffer()).unwrap();
        ring.set_consumer_heartbeat_time(1_234_567);
        assert_eq!(ring.consumer_heartbeat_time(), 1_234_567);
    }
}
