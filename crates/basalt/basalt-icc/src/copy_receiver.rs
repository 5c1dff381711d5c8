//! Copying adaptor over a [`BroadcastReceiver`].
//!
//! The raw receiver exposes records in place, where the transmitter may
//! overwrite them at any time. The copy receiver moves each record into a
//! private scratch buffer before the handler runs and only delivers it when
//! the post-copy validation shows the bytes were still intact, so handlers
//! may keep the payload around past the next poll.

use basalt_buffers::{AlignedBuffer, AtomicBuffer};
use tracing::warn;

use crate::{BroadcastReceiver, IccError};

pub struct CopyReceiver {
    receiver: BroadcastReceiver,
    scratch: AlignedBuffer,
}

impl CopyReceiver {
    pub fn new(receiver: BroadcastReceiver) -> Self {
        // Large enough for any record the transmitter can legally publish.
        let scratch = AlignedBuffer::with_capacity(receiver.capacity() / 2);
        Self { receiver, scratch }
    }

    /// Number of times the underlying receiver has been lapped.
    pub fn lapped_count(&self) -> u64 {
        self.receiver.lapped_count()
    }

    /// Drains every available record, invoking
    /// `handler(msg_type, buffer, offset, length)` with the copied bytes.
    /// Returns the number of records delivered.
    ///
    /// Loss (a lap, or a record overwritten mid-copy) surfaces as
    /// `Err(Lapped)`; records delivered before the loss stay delivered and
    /// the next call resumes from the resynchronised cursor.
    pub fn receive<F>(&mut self, mut handler: F) -> Result<usize, IccError>
    where
        F: FnMut(i32, &AtomicBuffer, usize, usize),
    {
        let mut count = 0usize;

        loop {
            if !self.receiver.receive_next()? {
                return Ok(count);
            }

            let length = self.receiver.length()?;
            let msg_type = self.receiver.type_id()?;
            let scratch = self.scratch.buffer();
            scratch.put_bytes_from(0, self.receiver.buffer(), self.receiver.offset(), length)?;

            if !self.receiver.validate() {
                // Torn copy: the transmitter reached this record while we
                // were reading it. Drop the copy and report the loss.
                warn!(lapped_count = self.receiver.lapped_count(), "record overwritten mid-copy");
                return Err(IccError::Lapped {
                    lapped_count: self.receiver.lapped_count(),
                });
            }

            handler(msg_type, &scratch, 0, length);
            count += 1;
        }
    }
}
