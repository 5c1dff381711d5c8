use basalt_buffers::OutOfBounds;
use basalt_driver::CncError;
use basalt_icc::IccError;

/// Top-level client failure taxonomy.
///
/// Startup failures (`Io`, `Cnc`, term-length validation) are fatal to
/// `connect`. `Icc` write failures surface from the user call that produced
/// them. `DriverTimeout` is sticky: once the conductor declares the driver
/// dead, every subsequent operation fails with it.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("i/o failure")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Cnc(#[from] CncError),

    #[error(transparent)]
    Icc(#[from] IccError),

    #[error(transparent)]
    OutOfBounds(#[from] OutOfBounds),

    #[error("log file of {log_length} bytes implies invalid term length {term_length}")]
    InvalidTermLength { term_length: u64, log_length: u64 },

    #[error("media driver is unresponsive")]
    DriverTimeout,

    #[error("driver rejected registration (code {code}): {message}")]
    Registration { code: i32, message: String },

    #[error("client is closed")]
    Closed,
}
