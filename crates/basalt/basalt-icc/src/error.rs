use basalt_buffers::OutOfBounds;

/// Failures raised by the shared-memory channels.
#[derive(Debug, thiserror::Error)]
pub enum IccError {
    /// The message does not fit the ring's per-record limit.
    #[error("message of {length} bytes exceeds the maximum of {max}")]
    MessageTooBig { length: usize, max: usize },

    /// The consumer has not freed enough space for the record. Callers decide
    /// whether to retry; the ring never blocks or retries internally.
    #[error("insufficient capacity in ring buffer")]
    BackPressured,

    /// The broadcast transmitter overwrote records this receiver had not yet
    /// consumed. The receiver has already resynchronised to the oldest record
    /// still available; the error reports the loss.
    #[error("broadcast receiver lapped by transmitter (lap #{lapped_count})")]
    Lapped { lapped_count: u64 },

    /// The buffer handed to `wrap` cannot hold a valid ring: too small for
    /// its trailer, or a data capacity that is not a power of two.
    #[error("ring region of {0} bytes does not describe a power-of-two ring")]
    InvalidCapacity(usize),

    #[error(transparent)]
    OutOfBounds(#[from] OutOfBounds),
}
