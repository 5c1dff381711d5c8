//! Mapping of a per-stream log file: three equal term buffers followed by a
//! metadata region.
//!
//! A log file of `L` bytes holds `PARTITION_COUNT` terms of
//! `(L - LOG_META_DATA_LENGTH) / PARTITION_COUNT` bytes each, with the
//! metadata region at the tail. Small logs are mapped once and carved into
//! views; logs past [`MAX_SINGLE_MAPPING_SIZE`] get one mapping per term plus
//! one for the metadata, at the same file offsets.
//!
//! All views over a single mapping share its lifetime: the `LogBuffers`
//! value owns every mapping and is itself shared by `Arc` between the
//! conductor registry and the publications, subscriptions and images that
//! use it. The last reference dropped releases any mappings still live; an
//! explicit [`LogBuffers::close`] releases them all immediately, after which
//! `buffer`/`meta` refuse to hand out views into the gone regions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use basalt_buffers::bit_util::is_power_of_two;
use basalt_buffers::AtomicBuffer;
use basalt_mmap::MmapFileMut;
use tracing::debug;

use crate::{ClientError, LogBufferMetaData};

/// Number of term buffers per log.
pub const PARTITION_COUNT: usize = 3;

/// Length of the metadata region at the tail of every log file.
pub const LOG_META_DATA_LENGTH: usize = 4096;

pub const TERM_MIN_LENGTH: usize = 64 * 1024;
pub const TERM_MAX_LENGTH: usize = 1 << 30;

/// Logs below this size are mapped in one piece.
pub const MAX_SINGLE_MAPPING_SIZE: u64 = 1 << 30;

#[derive(Debug)]
pub struct LogBuffers {
    /// Slots go to `None` as `close` releases them, so every mapping is
    /// droppable from `&self` exactly once.
    mmaps: Mutex<Vec<Option<MmapFileMut>>>,
    buffers: [AtomicBuffer; PARTITION_COUNT + 1],
    term_length: usize,
    closed: AtomicBool,
}

impl LogBuffers {
    /// Maps an existing log file, validating its geometry.
    pub fn map(file_name: &str) -> Result<Self, ClientError> {
        let log_length = MmapFileMut::file_size(file_name)?;
        let term_length = compute_term_length(log_length)?;

        let mut mmaps = Vec::new();
        // Placeholder views, overwritten below before the value escapes.
        let placeholder =
            unsafe { AtomicBuffer::wrap(std::ptr::NonNull::<u64>::dangling().as_ptr() as *mut u8, 0) };
        let mut buffers = [placeholder; PARTITION_COUNT + 1];

        if log_length < MAX_SINGLE_MAPPING_SIZE {
            let mut mmap = MmapFileMut::map_existing(file_name, 0, 0)?;
            let base = mmap.as_mut_ptr();

            for (i, slot) in buffers.iter_mut().take(PARTITION_COUNT).enumerate() {
                // SAFETY: i * term_length + term_length <= log_length and the
                // mapping is owned by self for the life of every view.
                *slot = unsafe { AtomicBuffer::wrap(base.add(i * term_length), term_length) };
            }
            // SAFETY: the metadata region is the file tail, inside the mapping.
            buffers[PARTITION_COUNT] = unsafe {
                AtomicBuffer::wrap(base.add(PARTITION_COUNT * term_length), LOG_META_DATA_LENGTH)
            };

            mmaps.push(mmap);
        } else {
            for (i, slot) in buffers.iter_mut().take(PARTITION_COUNT).enumerate() {
                let mut mmap =
                    MmapFileMut::map_existing(file_name, (i * term_length) as u64, term_length)?;
                // SAFETY: the mapping covers exactly term_length bytes and is
                // owned by self.
                *slot = unsafe { AtomicBuffer::wrap(mmap.as_mut_ptr(), term_length) };
                mmaps.push(mmap);
            }

            let mut mmap = MmapFileMut::map_existing(
                file_name,
                (PARTITION_COUNT * term_length) as u64,
                LOG_META_DATA_LENGTH,
            )?;
            // SAFETY: as above.
            buffers[PARTITION_COUNT] =
                unsafe { AtomicBuffer::wrap(mmap.as_mut_ptr(), LOG_META_DATA_LENGTH) };
            mmaps.push(mmap);
        }

        let mapping_count = mmaps.len();
        let log = Self {
            mmaps: Mutex::new(mmaps.into_iter().map(Some).collect()),
            buffers,
            term_length,
            closed: AtomicBool::new(false),
        };

        let declared = log.meta()?.term_length()?;
        if declared != term_length as i32 {
            return Err(ClientError::InvalidTermLength {
                term_length: declared as u64,
                log_length,
            });
        }

        debug!(file_name, term_length, mappings = mapping_count, "mapped log buffers");
        Ok(log)
    }

    fn ensure_open(&self) -> Result<(), ClientError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::Closed);
        }
        Ok(())
    }

    /// The `index`-th term buffer; `PARTITION_COUNT` addresses the metadata
    /// section. Fails once the log is closed: the views would dangle.
    pub fn buffer(&self, index: usize) -> Result<AtomicBuffer, ClientError> {
        assert!(index <= PARTITION_COUNT, "log buffer index out of range");
        self.ensure_open()?;
        Ok(self.buffers[index])
    }

    /// Typed overlay of the metadata section. Fails once the log is closed.
    pub fn meta(&self) -> Result<LogBufferMetaData, ClientError> {
        self.ensure_open()?;
        Ok(LogBufferMetaData::wrap(self.buffers[PARTITION_COUNT]))
    }

    #[inline]
    pub fn term_length(&self) -> usize {
        self.term_length
    }

    /// Number of live mappings backing this log. Zero after `close`.
    pub fn mapping_count(&self) -> usize {
        self.mmaps
            .lock()
            .expect("log buffer mappings lock")
            .iter()
            .filter(|mmap| mmap.is_some())
            .count()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Flushes and unmaps every region, reporting the first failure but
    /// continuing to release the rest. Repeated calls are no-ops; views
    /// handed out earlier are refused afterwards via `buffer`/`meta`.
    pub fn close(&self) -> Result<(), ClientError> {
        self.closed.store(true, Ordering::Release);

        let mut first_error = None;
        let mut mmaps = self.mmaps.lock().expect("log buffer mappings lock");
        for slot in mmaps.iter_mut() {
            if let Some(mmap) = slot.take() {
                if let Err(e) = mmap.close() {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

fn compute_term_length(log_length: u64) -> Result<usize, ClientError> {
    let minimum = (PARTITION_COUNT * TERM_MIN_LENGTH + LOG_META_DATA_LENGTH) as u64;
    if log_length < minimum || (log_length - LOG_META_DATA_LENGTH as u64) % PARTITION_COUNT as u64 != 0
    {
        return Err(ClientError::InvalidTermLength {
            term_length: 0,
            log_length,
        });
    }

    let term_length = ((log_length - LOG_META_DATA_LENGTH as u64) / PARTITION_COUNT as u64) as usize;
    check_term_length(term_length, log_length)?;
    Ok(term_length)
}

fn check_term_length(term_length: usize, log_length: u64) -> Result<(), ClientError> {
    if !is_power_of_two(term_length)
        || term_length < TERM_MIN_LENGTH
        || term_length > TERM_MAX_LENGTH
    {
        return Err(ClientError::InvalidTermLength {
            term_length: term_length as u64,
            log_length,
        });
    }
    Ok(())
}
