//! Typed overlay of the counters/command-and-control (CnC) file.
//!
//! The CnC file is created by the media driver and carries everything a
//! client needs to reach it. A 32-byte header at offset 0 declares the
//! version and the length of each region; the five regions follow back to
//! back in declared order:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ version │ to-driver len │ to-clients len │ counter-metadata   │
//! │ (i32)   │ (i32)         │ (i32)          │ len (i32)          │
//! ├───────────────────────────────────────────────────────────────┤
//! │ counter-values len (i32) │ error-log len (i32) │ liveness (i64)│
//! ├───────────────────────────────────────────────────────────────┤
//! │ to-driver ring (data + trailer)                                │
//! ├───────────────────────────────────────────────────────────────┤
//! │ to-clients broadcast (data + trailer)                          │
//! ├───────────────────────────────────────────────────────────────┤
//! │ counter metadata │ counter values │ error log                  │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! A version mismatch is fatal: nothing else in the file can be trusted.

use basalt_buffers::{AtomicBuffer, OutOfBounds};
use basalt_icc::descriptor::{BROADCAST_TRAILER_LENGTH, RING_TRAILER_LENGTH};
use basalt_mmap::MmapFileMut;
use std::path::Path;

/// Current CnC layout version. Bump on any incompatible change.
pub const CNC_VERSION: i32 = 1;

const VERSION_OFFSET: usize = 0;
const TO_DRIVER_LENGTH_OFFSET: usize = 4;
const TO_CLIENTS_LENGTH_OFFSET: usize = 8;
const COUNTER_METADATA_LENGTH_OFFSET: usize = 12;
const COUNTER_VALUES_LENGTH_OFFSET: usize = 16;
const ERROR_LOG_LENGTH_OFFSET: usize = 20;
const CLIENT_LIVENESS_TIMEOUT_OFFSET: usize = 24;

/// Header length; regions start here.
pub const CNC_METADATA_LENGTH: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum CncError {
    #[error("failed to map CnC file")]
    Io(#[from] std::io::Error),

    #[error("unsupported CnC version: expected {expected}, found {found}")]
    UnsupportedVersion { expected: i32, found: i32 },

    #[error("CnC file of {actual} bytes cannot hold its declared regions ({required} bytes)")]
    Truncated { required: usize, actual: usize },

    #[error(transparent)]
    OutOfBounds(#[from] OutOfBounds),
}

/// Region lengths declared in the header. Each ring length includes its
/// trailer; the data section in front of the trailer must be a power of two.
#[derive(Debug, Clone, Copy)]
pub struct CncLengths {
    pub to_driver: usize,
    pub to_clients: usize,
    pub counter_metadata: usize,
    pub counter_values: usize,
    pub error_log: usize,
}

impl Default for CncLengths {
    fn default() -> Self {
        Self {
            to_driver: (1 << 20) + RING_TRAILER_LENGTH,
            to_clients: (1 << 20) + BROADCAST_TRAILER_LENGTH,
            counter_metadata: 64 * 1024,
            counter_values: 128 * 1024,
            error_log: 64 * 1024,
        }
    }
}

impl CncLengths {
    fn total(&self) -> usize {
        CNC_METADATA_LENGTH
            + self.to_driver
            + self.to_clients
            + self.counter_metadata
            + self.counter_values
            + self.error_log
    }
}

/// A mapped CnC file with validated header.
#[derive(Debug)]
pub struct CncFile {
    _mmap: MmapFileMut,
    buffer: AtomicBuffer,
}

impl CncFile {
    /// Maps an existing CnC file and validates version and region lengths.
    pub fn map_existing<P: AsRef<Path>>(path: P) -> Result<Self, CncError> {
        let mut mmap = MmapFileMut::open_rw(path)?;
        // SAFETY: mmap bases are page aligned and the mapping lives in _mmap
        // for as long as this CncFile (and every view carved from it).
        let buffer = unsafe { AtomicBuffer::wrap(mmap.as_mut_ptr(), mmap.len()) };

        let cnc = Self { _mmap: mmap, buffer };
        cnc.validate()?;
        Ok(cnc)
    }

    /// Creates and initialises a well-formed CnC file. The driver side of
    /// this layout; here it serves tooling and the fake driver in tests.
    pub fn create<P: AsRef<Path>>(
        path: P,
        lengths: CncLengths,
        client_liveness_timeout_ns: i64,
    ) -> Result<Self, CncError> {
        let mut mmap = MmapFileMut::create_rw(path, lengths.total() as u64)?;
        // SAFETY: as in map_existing.
        let buffer = unsafe { AtomicBuffer::wrap(mmap.as_mut_ptr(), mmap.len()) };

        buffer.put_i32(TO_DRIVER_LENGTH_OFFSET, lengths.to_driver as i32)?;
        buffer.put_i32(TO_CLIENTS_LENGTH_OFFSET, lengths.to_clients as i32)?;
        buffer.put_i32(COUNTER_METADATA_LENGTH_OFFSET, lengths.counter_metadata as i32)?;
        buffer.put_i32(COUNTER_VALUES_LENGTH_OFFSET, lengths.counter_values as i32)?;
        buffer.put_i32(ERROR_LOG_LENGTH_OFFSET, lengths.error_log as i32)?;
        buffer.put_i64(CLIENT_LIVENESS_TIMEOUT_OFFSET, client_liveness_timeout_ns)?;
        // Version last: readers treat a non-zero version as "fully seeded".
        buffer.put_i32_ordered(VERSION_OFFSET, CNC_VERSION)?;

        Ok(Self { _mmap: mmap, buffer })
    }

    fn validate(&self) -> Result<(), CncError> {
        let found = self.buffer.get_i32_volatile(VERSION_OFFSET)?;
        if found != CNC_VERSION {
            return Err(CncError::UnsupportedVersion {
                expected: CNC_VERSION,
                found,
            });
        }

        let required = self.lengths()?.total();
        let actual = self.buffer.capacity();
        if required > actual {
            return Err(CncError::Truncated { required, actual });
        }
        Ok(())
    }

    fn lengths(&self) -> Result<CncLengths, CncError> {
        Ok(CncLengths {
            to_driver: self.buffer.get_i32(TO_DRIVER_LENGTH_OFFSET)? as usize,
            to_clients: self.buffer.get_i32(TO_CLIENTS_LENGTH_OFFSET)? as usize,
            counter_metadata: self.buffer.get_i32(COUNTER_METADATA_LENGTH_OFFSET)? as usize,
            counter_values: self.buffer.get_i32(COUNTER_VALUES_LENGTH_OFFSET)? as usize,
            error_log: self.buffer.get_i32(ERROR_LOG_LENGTH_OFFSET)? as usize,
        })
    }

    /// Driver-declared liveness timeout in nanoseconds.
    pub fn client_liveness_timeout_ns(&self) -> Result<i64, CncError> {
        Ok(self.buffer.get_i64(CLIENT_LIVENESS_TIMEOUT_OFFSET)?)
    }

    /// The client→driver command ring region (data + trailer).
    pub fn to_driver_buffer(&self) -> Result<AtomicBuffer, CncError> {
        let lengths = self.lengths()?;
        Ok(self.buffer.view(CNC_METADATA_LENGTH, lengths.to_driver)?)
    }

    /// The driver→clients broadcast region (data + trailer).
    pub fn to_clients_buffer(&self) -> Result<AtomicBuffer, CncError> {
        let lengths = self.lengths()?;
        let offset = CNC_METADATA_LENGTH + lengths.to_driver;
        Ok(self.buffer.view(offset, lengths.to_clients)?)
    }

    pub fn counter_metadata_buffer(&self) -> Result<AtomicBuffer, CncError> {
        let lengths = self.lengths()?;
        let offset = CNC_METADATA_LENGTH + lengths.to_driver + lengths.to_clients;
        Ok(self.buffer.view(offset, lengths.counter_metadata)?)
    }

    pub fn counter_values_buffer(&self) -> Result<AtomicBuffer, CncError> {
        let lengths = self.lengths()?;
        let offset = CNC_METADATA_LENGTH
            + lengths.to_driver
            + lengths.to_clients
            + lengths.counter_metadata;
        Ok(self.buffer.view(offset, lengths.counter_values)?)
    }

    pub fn error_log_buffer(&self) -> Result<AtomicBuffer, CncError> {
        let lengths = self.lengths()?;
        let offset = CNC_METADATA_LENGTH
            + lengths.to_driver
            + lengths.to_clients
            + lengths.counter_metadata
            + lengths.counter_values;
        Ok(self.buffer.view(offset, lengths.error_log)?)
    }

    /// Flush and release the mapping.
    pub fn close(self) -> Result<(), CncError> {
        self._mmap.close()?;
        Ok(())
    }
}
