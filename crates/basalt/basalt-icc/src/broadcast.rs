//! Single-producer, lossy multi-consumer broadcast ring for the
//! driver→clients event stream.
//!
//! The transmitter writes records sequentially and never waits for readers:
//! a receiver that falls more than one buffer-length behind is lapped and
//! must resynchronise, losing the overwritten records. Each receiver tracks
//! its own cursor plus a count of laps suffered.
//!
//! # Protocol
//!
//! The transmitter publishes a record in four steps:
//! 1. release-store `tail_intent = tail + record` (readers treat anything at
//!    or beyond a position within `tail_intent - capacity` as suspect),
//! 2. write the record header and payload,
//! 3. store `latest = tail` (start of this record, the recovery fallback),
//! 4. release-store `tail = tail + record`.
//!
//! A receiver acquires `tail`, reads records up to it, and after copying a
//! record re-checks `tail_intent` to detect a concurrent overwrite.

use std::sync::atomic::Ordering;

use basalt_buffers::bit_util::{align, is_power_of_two};
use basalt_buffers::AtomicBuffer;

use crate::descriptor::{broadcast_record_descriptor as record, BroadcastTrailer, BROADCAST_TRAILER_LENGTH};
use crate::IccError;

pub struct BroadcastTransmitter {
    buffer: AtomicBuffer,
    capacity: usize,
    max_message_length: usize,
}

impl BroadcastTransmitter {
    /// Wraps a region consisting of a power-of-two data section followed by
    /// the broadcast trailer.
    pub fn wrap(buffer: AtomicBuffer) -> Result<Self, IccError> {
        let capacity = data_capacity(&buffer)?;
        Ok(Self {
            buffer,
            capacity,
            // Aligned record length is capped at half the buffer so at least
            // two records are live at any time.
            max_message_length: capacity / 2 - record::HEADER_LENGTH,
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn max_message_length(&self) -> usize {
        self.max_message_length
    }

    #[inline]
    fn trailer(&self) -> &BroadcastTrailer {
        // SAFETY: wrap() reserved the trailer past the data section.
        unsafe { BroadcastTrailer::overlay(self.buffer.as_ptr().add(self.capacity)) }
    }

    /// Publishes one record. Never blocks and never fails for slow readers;
    /// they get lapped instead.
    pub fn transmit(
        &mut self,
        msg_type: i32,
        src: &AtomicBuffer,
        src_offset: usize,
        length: usize,
    ) -> Result<(), IccError> {
        if length > self.max_message_length {
            return Err(IccError::MessageTooBig {
                length,
                max: self.max_message_length,
            });
        }

        let trailer = self.trailer();
        let mask = self.capacity as i64 - 1;
        let record_length = length + record::HEADER_LENGTH;
        let aligned = align(record_length, record::ALIGNMENT) as i64;

        let mut tail = trailer.tail_counter.load(Ordering::Relaxed);
        let mut record_index = (tail & mask) as usize;
        let to_end = self.capacity - record_index;

        if aligned as usize > to_end {
            // Pad out the wrap. Intent covers the padding and the record so
            // readers in either region see the overwrite coming.
            trailer
                .tail_intent_counter
                .store(tail + to_end as i64 + aligned, Ordering::Release);

            self.buffer.put_i32(record_index + record::TYPE_OFFSET, 0)?;
            if to_end >= record::HEADER_LENGTH {
                self.buffer
                    .put_i64(record_index + record::TAIL_POSITION_OFFSET, tail)?;
            }
            self.buffer
                .put_i32(record_index + record::LENGTH_OFFSET, -(to_end as i32))?;

            tail += to_end as i64;
            record_index = 0;
        } else {
            trailer
                .tail_intent_counter
                .store(tail + aligned, Ordering::Release);
        }

        self.buffer.put_i32(record_index + record::TYPE_OFFSET, msg_type)?;
        self.buffer
            .put_i64(record_index + record::TAIL_POSITION_OFFSET, tail)?;
        self.buffer
            .put_bytes_from(record_index + record::HEADER_LENGTH, src, src_offset, length)?;
        self.buffer
            .put_i32(record_index + record::LENGTH_OFFSET, record_length as i32)?;

        trailer.latest_counter.store(tail, Ordering::Relaxed);
        trailer.tail_counter.store(tail + aligned, Ordering::Release);

        Ok(())
    }
}

pub struct BroadcastReceiver {
    buffer: AtomicBuffer,
    capacity: usize,
    /// Position of the next unread record.
    next_record: i64,
    /// Position of the record currently presented by `receive_next`.
    record_position: i64,
    /// Byte offset of that record within the data section.
    record_offset: usize,
    lapped_count: u64,
}

impl BroadcastReceiver {
    /// Wraps an existing broadcast region. Joins at the current tail, so only
    /// records published after this call are observed.
    pub fn wrap(buffer: AtomicBuffer) -> Result<Self, IccError> {
        let capacity = data_capacity(&buffer)?;
        // SAFETY: data_capacity() verified the trailer fits past the section.
        let trailer = unsafe { BroadcastTrailer::overlay(buffer.as_ptr().add(capacity)) };
        let cursor = trailer.tail_counter.load(Ordering::Acquire);

        Ok(Self {
            buffer,
            capacity,
            next_record: cursor,
            record_position: cursor,
            record_offset: 0,
            lapped_count: 0,
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of times the transmitter has lapped this receiver.
    #[inline]
    pub fn lapped_count(&self) -> u64 {
        self.lapped_count
    }

    #[inline]
    fn mask(&self) -> i64 {
        self.capacity as i64 - 1
    }

    #[inline]
    fn trailer(&self) -> &BroadcastTrailer {
        // SAFETY: wrap() verified the trailer region.
        unsafe { BroadcastTrailer::overlay(self.buffer.as_ptr().add(self.capacity)) }
    }

    /// Advances to the next published record.
    ///
    /// Returns `Ok(true)` with the record exposed through `type_id`/`offset`/
    /// `length`, `Ok(false)` when caught up, or `Err(Lapped)` after the
    /// transmitter overwrote unread records; the cursor has then already
    /// been moved to the oldest record still available, and the next call
    /// resumes from there.
    pub fn receive_next(&mut self) -> Result<bool, IccError> {
        let tail = self.trailer().tail_counter.load(Ordering::Acquire);
        let mut cursor = self.next_record;

        if tail <= cursor {
            return Ok(false);
        }

        if tail - cursor > self.capacity as i64 {
            self.lapped_count += 1;
            self.next_record = self.rejoin(tail)?;
            return Err(IccError::Lapped {
                lapped_count: self.lapped_count,
            });
        }

        loop {
            if cursor >= tail {
                self.next_record = cursor;
                return Ok(false);
            }

            let record_index = (cursor & self.mask()) as usize;
            let length = self.buffer.get_i32(record_index + record::LENGTH_OFFSET)?;

            if length < 0 {
                // Padding to the wrap; skip it silently.
                cursor += i64::from(-length);
                continue;
            }
            if length == 0 {
                // Transmitter is mid-publish; nothing consumable yet.
                self.next_record = cursor;
                return Ok(false);
            }

            self.record_position = cursor;
            self.record_offset = record_index;
            self.next_record = cursor + align(length as usize, record::ALIGNMENT) as i64;
            return Ok(true);
        }
    }

    /// Message type of the current record.
    pub fn type_id(&self) -> Result<i32, IccError> {
        Ok(self.buffer.get_i32(self.record_offset + record::TYPE_OFFSET)?)
    }

    /// Payload offset of the current record within `buffer()`.
    #[inline]
    pub fn offset(&self) -> usize {
        self.record_offset + record::HEADER_LENGTH
    }

    /// Payload length of the current record.
    pub fn length(&self) -> Result<usize, IccError> {
        let record_length = self.buffer.get_i32(self.record_offset + record::LENGTH_OFFSET)?;
        Ok((record_length.max(record::HEADER_LENGTH as i32) as usize) - record::HEADER_LENGTH)
    }

    #[inline]
    pub fn buffer(&self) -> &AtomicBuffer {
        &self.buffer
    }

    /// True when the current record was still intact after it was read.
    /// Callers copy first, then validate.
    pub fn validate(&self) -> bool {
        let tail_intent = self.trailer().tail_intent_counter.load(Ordering::Acquire);
        tail_intent - self.record_position <= self.capacity as i64
    }

    /// Finds the oldest record boundary at or after `tail - capacity`.
    ///
    /// Scans in alignment steps for a header whose embedded tail position
    /// matches its own location; `latest_counter` (always a true boundary) is
    /// the fallback when the scan exhausts the window.
    fn rejoin(&self, tail: i64) -> Result<i64, IccError> {
        let latest = self.trailer().latest_counter.load(Ordering::Acquire);
        let capacity = self.capacity as i64;
        let mask = self.mask();

        let mut candidate = align((tail - capacity) as usize, record::ALIGNMENT) as i64;
        while candidate < latest {
            let index = (candidate & mask) as usize;
            if index + record::HEADER_LENGTH <= self.capacity {
                let embedded = self.buffer.get_i64(index + record::TAIL_POSITION_OFFSET)?;
                if embedded == candidate {
                    return Ok(candidate);
                }
            }
            candidate += record::ALIGNMENT as i64;
        }

        Ok(latest)
    }
}

fn data_capacity(buffer: &AtomicBuffer) -> Result<usize, IccError> {
    let total = buffer.capacity();
    if total <= BROADCAST_TRAILER_LENGTH {
        return Err(IccError::InvalidCapacity(total));
    }
    let capacity = total - BROADCAST_TRAILER_LENGTH;
    // The section must hold at least two full record headers.
    if !is_power_of_two(capacity) || capacity < record::HEADER_LENGTH * 4 {
        return Err(IccError::InvalidCapacity(total));
    }
    Ok(capacity)
}
