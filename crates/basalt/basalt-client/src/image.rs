use std::sync::Arc;

use crate::LogBuffers;

/// One remote source's stream of fragments within a subscription.
///
/// Holds a shared reference to the mapped log; the back-reference to the
/// owning subscription is its registration id only, never a pointer, so
/// ownership stays acyclic.
pub struct Image {
    correlation_id: i64,
    session_id: i32,
    subscription_registration_id: i64,
    subscriber_position_id: i32,
    source_identity: String,
    log_buffers: Arc<LogBuffers>,
}

impl Image {
    pub(crate) fn new(
        correlation_id: i64,
        session_id: i32,
        subscription_registration_id: i64,
        subscriber_position_id: i32,
        source_identity: String,
        log_buffers: Arc<LogBuffers>,
    ) -> Self {
        Self {
            correlation_id,
            session_id,
            subscription_registration_id,
            subscriber_position_id,
            source_identity,
            log_buffers,
        }
    }

    #[inline]
    pub fn correlation_id(&self) -> i64 {
        self.correlation_id
    }

    #[inline]
    pub fn session_id(&self) -> i32 {
        self.session_id
    }

    /// Registration id of the subscription this image belongs to.
    #[inline]
    pub fn subscription_registration_id(&self) -> i64 {
        self.subscription_registration_id
    }

    /// Counter id through which the subscriber reports its position.
    #[inline]
    pub fn subscriber_position_id(&self) -> i32 {
        self.subscriber_position_id
    }

    #[inline]
    pub fn source_identity(&self) -> &str {
        &self.source_identity
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
