use std::sync::Arc;

use crate::LogBuffers;

/// A registered outbound stream: `(channel, stream_id, session_id)` bound to
/// its mapped log.
///
/// The value is inert metadata plus a shared reference to the log; the send
/// path lives with the embedding application. The last holder of the log
/// reference (publication or conductor registry) releases the mappings.
#[derive(Debug)]
pub struct Publication {
    channel: String,
    stream_id: i32,
    session_id: i32,
    registration_id: i64,
    correlation_id: i64,
    position_counter_id: i32,
    log_buffers: Arc<LogBuffers>,
}

impl Publication {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        channel: String,
        stream_id: i32,
        session_id: i32,
        registration_id: i64,
        correlation_id: i64,
        position_counter_id: i32,
        log_buffers: Arc<LogBuffers>,
    ) -> Self {
        Self {
            channel,
            stream_id,
            session_id,
            registration_id,
            correlation_id,
            position_counter_id,
            log_buffers,
        }
    }

    #[inline]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    #[inline]
    pub fn stream_id(&self) -> i32 {
        self.stream_id
    }

    #[inline]
    pub fn session_id(&self) -> i32 {
        self.session_id
    }

    /// Driver-assigned id; the handle for `remove_publication`.
    #[inline]
    pub fn registration_id(&self) -> i64 {
        self.registration_id
    }

    /// Correlation id of the originating `add_publication`.
    #[inline]
    pub fn correlation_id(&self) -> i64 {
        self.correlation_id
    }

    /// Counter id carrying the publisher limit for this stream.
    #[inline]
    pub fn position_counter_id(&self) -> i32 {
        self.position_counter_id
    }

    #[inline]
    pub fn log_buffers(&self) -> &Arc<LogBuffers> {
        &self.log_buffers
    }

    #[inline]
    pub fn term_length(&self) -> usize {
        self.log_buffers.term_length()
    }
}
