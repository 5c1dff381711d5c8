//! Typed overlay of the log metadata region at the tail of a log file.
//!
//! Layout, at fixed offsets from the start of the region:
//!
//! ```text
//! 0   tail counter, partition 0 (i64)
//! 8   tail counter, partition 1 (i64)
//! 16  tail counter, partition 2 (i64)
//! 24  active partition index (i32)
//! 28  initial term id (i32)
//! 32  default frame header length (i32)
//! 36  MTU length (i32)
//! 40  term length (i32)
//! 44  page size (i32)
//! 48  default frame header (128 bytes)
//! ```

use basalt_buffers::{AtomicBuffer, OutOfBounds};

use crate::logbuffers::PARTITION_COUNT;

pub const TERM_TAIL_COUNTERS_OFFSET: usize = 0;
pub const ACTIVE_PARTITION_INDEX_OFFSET: usize = 24;
pub const INITIAL_TERM_ID_OFFSET: usize = 28;
pub const DEFAULT_FRAME_HEADER_LENGTH_OFFSET: usize = 32;
pub const MTU_LENGTH_OFFSET: usize = 36;
pub const TERM_LENGTH_OFFSET: usize = 40;
pub const PAGE_SIZE_OFFSET: usize = 44;
pub const DEFAULT_FRAME_HEADER_OFFSET: usize = 48;
pub const DEFAULT_FRAME_HEADER_MAX_LENGTH: usize = 128;

#[derive(Clone, Copy)]
pub struct LogBufferMetaData {
    buffer: AtomicBuffer,
}

impl LogBufferMetaData {
    pub fn wrap(buffer: AtomicBuffer) -> Self {
        Self { buffer }
    }

    /// Tail counter of a partition: producers publish with a release store,
    /// consumers acquire.
    pub fn tail_counter(&self, partition: usize) -> Result<i64, OutOfBounds> {
        debug_assert!(partition < PARTITION_COUNT);
        self.buffer
            .get_i64_volatile(TERM_TAIL_COUNTERS_OFFSET + partition * 8)
    }

    pub fn set_tail_counter(&self, partition: usize, value: i64) -> Result<(), OutOfBounds> {
        debug_assert!(partition < PARTITION_COUNT);
        self.buffer
            .put_i64_ordered(TERM_TAIL_COUNTERS_OFFSET + partition * 8, value)
    }

    pub fn active_partition_index(&self) -> Result<i32, OutOfBounds> {
        self.buffer.get_i32_volatile(ACTIVE_PARTITION_INDEX_OFFSET)
    }

    pub fn set_active_partition_index(&self, value: i32) -> Result<(), OutOfBounds> {
        self.buffer.put_i32_ordered(ACTIVE_PARTITION_INDEX_OFFSET, value)
    }

    pub fn initial_term_id(&self) -> Result<i32, OutOfBounds> {
        self.buffer.get_i32(INITIAL_TERM_ID_OFFSET)
    }

    pub fn set_initial_term_id(&self, value: i32) -> Result<(), OutOfBounds> {
        self.buffer.put_i32(INITIAL_TERM_ID_OFFSET, value)
    }

    pub fn default_frame_header_length(&self) -> Result<i32, OutOfBounds> {
        self.buffer.get_i32(DEFAULT_FRAME_HEADER_LENGTH_OFFSET)
    }

    pub fn set_default_frame_header_length(&self, value: i32) -> Result<(), OutOfBounds> {
        self.buffer.put_i32(DEFAULT_FRAME_HEADER_LENGTH_OFFSET, value)
    }

    pub fn mtu_length(&self) -> Result<i32, OutOfBounds> {
        self.buffer.get_i32(MTU_LENGTH_OFFSET)
    }

    pub fn set_mtu_length(&self, value: i32) -> Result<(), OutOfBounds> {
        self.buffer.put_i32(MTU_LENGTH_OFFSET, value)
    }

    pub fn term_length(&self) -> Result<i32, OutOfBounds> {
        self.buffer.get_i32(TERM_LENGTH_OFFSET)
    }

    pub fn set_term_length(&self, value: i32) -> Result<(), OutOfBounds> {
        self.buffer.put_i32(TERM_LENGTH_OFFSET, value)
    }

    pub fn page_size(&self) -> Result<i32, OutOfBounds> {
        self.buffer.get_i32(PAGE_SIZE_OFFSET)
    }

    pub fn set_page_size(&self, value: i32) -> Result<(), OutOfBounds> {
        self.buffer.put_i32(PAGE_SIZE_OFFSET, value)
    }

    pub fn default_frame_header(&self) -> Result<Vec<u8>, OutOfBounds> {
        let length = self
            .default_frame_header_length()?
            .clamp(0, DEFAULT_FRAME_HEADER_MAX_LENGTH as i32) as usize;
        let mut bytes = vec![0u8; length];
        self.buffer.get_bytes(DEFAULT_FRAME_HEADER_OFFSET, &mut bytes)?;
        Ok(bytes)
    }

    pub fn set_default_frame_header(&self, header: &[u8]) -> Result<(), OutOfBounds> {
        debug_assert!(header.len() <= DEFAULT_FRAME_HEADER_MAX_LENGTH);
        self.buffer.put_bytes(DEFAULT_FRAME_HEADER_OFFSET, header)?;
        self.set_default_frame_header_length(header.len() as i32)
    }
}
