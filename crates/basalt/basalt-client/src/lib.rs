//! `basalt-client`: the client core of the basalt messaging transport.
//!
//! A client process maps the media driver's CnC file, sends commands over the
//! MPSC ring, consumes driver events from the broadcast ring, and maps the
//! per-stream log-buffer files the driver hands back. One background
//! conductor thread drives everything: registration state machines for
//! publications and subscriptions, image lifecycle, liveness timeouts, and
//! deferred release of mapped resources.
//!
//! ```ignore
//! let client = BasaltClient::connect(Context::default())?;
//! let correlation_id = client.add_publication("basalt:udp?endpoint=host:40123", 1001)?;
//! let publication = client.wait_for_publication(correlation_id)?;
//! ```
//!
//! `add_*` and `find_*` never block; `wait_for_*` spins on `find_*` with the
//! configured idle strategy until the media-driver timeout.

pub mod log_meta;

mod client;
mod conductor;
mod context;
mod error;
mod idle;
mod image;
mod logbuffers;
mod publication;
mod subscription;

pub use client::BasaltClient;
pub use conductor::ClientConductor;
pub use context::{
    AvailableImageHandler, ConfigError, Context, ContextConfig, ErrorHandler,
    UnavailableImageHandler,
};
pub use error::ClientError;
pub use idle::{BusySpinIdleStrategy, IdleStrategy, SleepingIdleStrategy, YieldingIdleStrategy};
pub use image::Image;
pub use log_meta::LogBufferMetaData;
pub use logbuffers::{
    LogBuffers, LOG_META_DATA_LENGTH, MAX_SINGLE_MAPPING_SIZE, PARTITION_COUNT, TERM_MAX_LENGTH,
    TERM_MIN_LENGTH,
};
pub use publication::Publication;
pub use subscription::Subscription;
