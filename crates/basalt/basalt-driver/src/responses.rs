//! Driver→clients response messages, broadcast to every connected client.
//!
//! Same flyweight convention as [`crate::commands`]; the correlation id is
//! always first so a conductor can route a response before decoding the rest.

use basalt_buffers::{AtomicBuffer, OutOfBounds};

/// Stable response type codes.
pub mod response_type {
    pub const ON_ERROR: i32 = 0x0F01;
    pub const ON_AVAILABLE_IMAGE: i32 = 0x0F02;
    pub const ON_NEW_PUBLICATION: i32 = 0x0F03;
    pub const ON_OPERATION_SUCCESS: i32 = 0x0F04;
    pub const ON_NEW_SUBSCRIPTION: i32 = 0x0F06;
    pub const ON_UNAVAILABLE_IMAGE: i32 = 0x0F07;
    pub const ON_EXCLUSIVE_NEW_PUBLICATION: i32 = 0x0F08;
}

/// `{offending_correlation_id: i64, error_code: i32, message: string}`.
#[derive(Clone, Copy)]
pub struct ErrorResponse {
    buffer: AtomicBuffer,
    offset: usize,
}

impl ErrorResponse {
    const ERROR_CODE_OFFSET: usize = 8;
    const MESSAGE_OFFSET: usize = 12;

    pub fn wrap(buffer: AtomicBuffer, offset: usize) -> Self {
        Self { buffer, offset }
    }

    pub fn length_for(message: &str) -> usize {
        Self::MESSAGE_OFFSET + 4 + message.len()
    }

    pub fn offending_correlation_id(&self) -> Result<i64, OutOfBounds> {
        self.buffer.get_i64(self.offset)
    }

    pub fn set_offending_correlation_id(&self, value: i64) -> Result<(), OutOfBounds> {
        self.buffer.put_i64(self.offset, value)
    }

    pub fn error_code(&self) -> Result<i32, OutOfBounds> {
        self.buffer.get_i32(self.offset + Self::ERROR_CODE_OFFSET)
    }

    pub fn set_error_code(&self, value: i32) -> Result<(), OutOfBounds> {
        self.buffer.put_i32(self.offset + Self::ERROR_CODE_OFFSET, value)
    }

    pub fn error_message(&self) -> Result<String, OutOfBounds> {
        self.buffer.get_string(self.offset + Self::MESSAGE_OFFSET)
    }

    pub fn set_error_message(&self, value: &str) -> Result<usize, OutOfBounds> {
        let written = self.buffer.put_string(self.offset + Self::MESSAGE_OFFSET, value)?;
        Ok(Self::MESSAGE_OFFSET + written)
    }
}

/// `{correlation_id: i64, registration_id: i64, session_id: i32,
/// stream_id: i32, position_counter_id: i32, log_file: string}`.
#[derive(Clone, Copy)]
pub struct PublicationReady {
    buffer: AtomicBuffer,
    offset: usize,
}

impl PublicationReady {
    const SESSION_ID_OFFSET: usize = 16;
    const STREAM_ID_OFFSET: usize = 20;
    const POSITION_COUNTER_ID_OFFSET: usize = 24;
    const LOG_FILE_OFFSET: usize = 28;

    pub fn wrap(buffer: AtomicBuffer, offset: usize) -> Self {
        Self { buffer, offset }
    }

    pub fn length_for(log_file: &str) -> usize {
        Self::LOG_FILE_OFFSET + 4 + log_file.len()
    }

    pub fn correlation_id(&self) -> Result<i64, OutOfBounds> {
        self.buffer.get_i64(self.offset)
    }

    pub fn set_correlation_id(&self, value: i64) -> Result<(), OutOfBounds> {
        self.buffer.put_i64(self.offset, value)
    }

    pub fn registration_id(&self) -> Result<i64, OutOfBounds> {
        self.buffer.get_i64(self.offset + 8)
    }

    pub fn set_registration_id(&self, value: i64) -> Result<(), OutOfBounds> {
        self.buffer.put_i64(self.offset + 8, value)
    }

    pub fn session_id(&self) -> Result<i32, OutOfBounds> {
        self.buffer.get_i32(self.offset + Self::SESSION_ID_OFFSET)
    }

    pub fn set_session_id(&self, value: i32) -> Result<(), OutOfBounds> {
        self.buffer.put_i32(self.offset + Self::SESSION_ID_OFFSET, value)
    }

    pub fn stream_id(&self) -> Result<i32, OutOfBounds> {
        self.buffer.get_i32(self.offset + Self::STREAM_ID_OFFSET)
    }

    pub fn set_stream_id(&self, value: i32) -> Result<(), OutOfBounds> {
        self.buffer.put_i32(self.offset + Self::STREAM_ID_OFFSET, value)
    }

    pub fn position_counter_id(&self) -> Result<i32, OutOfBounds> {
        self.buffer.get_i32(self.offset + Self::POSITION_COUNTER_ID_OFFSET)
    }

    pub fn set_position_counter_id(&self, value: i32) -> Result<(), OutOfBounds> {
        self.buffer.put_i32(self.offset + Self::POSITION_COUNTER_ID_OFFSET, value)
    }

    pub fn log_file_name(&self) -> Result<String, OutOfBounds> {
        self.buffer.get_string(self.offset + Self::LOG_FILE_OFFSET)
    }

    pub fn set_log_file_name(&self, value: &str) -> Result<usize, OutOfBounds> {
        let written = self.buffer.put_string(self.offset + Self::LOG_FILE_OFFSET, value)?;
        Ok(Self::LOG_FILE_OFFSET + written)
    }
}

/// `{correlation_id: i64}`: OnOperationSuccess and OnNewSubscription.
#[derive(Clone, Copy)]
pub struct CorrelatedResponse {
    buffer: AtomicBuffer,
    offset: usize,
}

impl CorrelatedResponse {
    pub const LENGTH: usize = 8;

    pub fn wrap(buffer: AtomicBuffer, offset: usize) -> Self {
        Self { buffer, offset }
    }

    pub fn correlation_id(&self) -> Result<i64, OutOfBounds> {
        self.buffer.get_i64(self.offset)
    }

    pub fn set_correlation_id(&self, value: i64) -> Result<(), OutOfBounds> {
        self.buffer.put_i64(self.offset, value)
    }
}

/// `{correlation_id: i64, subscription_registration_id: i64, session_id: i32,
/// subscriber_position_id: i32, log_file: string, source_identity: string}`.
#[derive(Clone, Copy)]
pub struct ImageReady {
    buffer: AtomicBuffer,
    offset: usize,
}

impl ImageReady {
    const SESSION_ID_OFFSET: usize = 16;
    const SUBSCRIBER_POSITION_ID_OFFSET: usize = 20;
    const LOG_FILE_OFFSET: usize = 24;

    pub fn wrap(buffer: AtomicBuffer, offset: usize) -> Self {
        Self { buffer, offset }
    }

    pub fn length_for(log_file: &str, source_identity: &str) -> usize {
        Self::LOG_FILE_OFFSET + 4 + log_file.len() + 4 + source_identity.len()
    }

    pub fn correlation_id(&self) -> Result<i64, OutOfBounds> {
        self.buffer.get_i64(self.offset)
    }

    pub fn set_correlation_id(&self, value: i64) -> Result<(), OutOfBounds> {
        self.buffer.put_i64(self.offset, value)
    }

    pub fn subscription_registration_id(&self) -> Result<i64, OutOfBounds> {
        self.buffer.get_i64(self.offset + 8)
    }

    pub fn set_subscription_registration_id(&self, value: i64) -> Result<(), OutOfBounds> {
        self.buffer.put_i64(self.offset + 8, value)
    }

    pub fn session_id(&self) -> Result<i32, OutOfBounds> {
        self.buffer.get_i32(self.offset + Self::SESSION_ID_OFFSET)
    }

    pub fn set_session_id(&self, value: i32) -> Result<(), OutOfBounds> {
        self.buffer.put_i32(self.offset + Self::SESSION_ID_OFFSET, value)
    }

    pub fn subscriber_position_id(&self) -> Result<i32, OutOfBounds> {
        self.buffer.get_i32(self.offset + Self::SUBSCRIBER_POSITION_ID_OFFSET)
    }

    pub fn set_subscriber_position_id(&self, value: i32) -> Result<(), OutOfBounds> {
        self.buffer.put_i32(self.offset + Self::SUBSCRIBER_POSITION_ID_OFFSET, value)
    }

    pub fn log_file_name(&self) -> Result<String, OutOfBounds> {
        self.buffer.get_string(self.offset + Self::LOG_FILE_OFFSET)
    }

    /// The source identity sits immediately after the variable-length log
    /// file name.
    pub fn source_identity(&self) -> Result<String, OutOfBounds> {
        let log_file_length = self.buffer.get_i32(self.offset + Self::LOG_FILE_OFFSET)? as usize;
        self.buffer
            .get_string(self.offset + Self::LOG_FILE_OFFSET + 4 + log_file_length)
    }

    /// Writes both strings and returns the total encoded message length.
    pub fn set_log_file_and_source(
        &self,
        log_file: &str,
        source_identity: &str,
    ) -> Result<usize, OutOfBounds> {
        let mut position = self.offset + Self::LOG_FILE_OFFSET;
        position += self.buffer.put_string(position, log_file)?;
        position += self.buffer.put_string(position, source_identity)?;
        Ok(position - self.offset)
    }
}

/// `{correlation_id: i64, subscription_registration_id: i64}`:
/// OnUnavailableImage.
#[derive(Clone, Copy)]
pub struct ImageMessage {
    buffer: AtomicBuffer,
    offset: usize,
}

impl ImageMessage {
    pub const LENGTH: usize = 16;

    pub fn wrap(buffer: AtomicBuffer, offset: usize) -> Self {
        Self { buffer, offset }
    }

    pub fn correlation_id(&self) -> Result<i64, OutOfBounds> {
        self.buffer.get_i64(self.offset)
    }

    pub fn set_correlation_id(&self, value: i64) -> Result<(), OutOfBounds> {
        self.buffer.put_i64(self.offset, value)
    }

    pub fn subscription_registration_id(&self) -> Result<i64, OutOfBounds> {
        self.buffer.get_i64(self.offset + 8)
    }

    pub fn set_subscription_registration_id(&self, value: i64) -> Result<(), OutOfBounds> {
        self.buffer.put_i64(self.offset + 8, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_buffers::AlignedBuffer;

    #[test]
    fn error_response_round_trip() {
        let mut mem = AlignedBuffer::with_capacity(128);
        let msg = ErrorResponse::wrap(mem.buffer(), 0);

        msg.set_offending_correlation_id(42).unwrap();
        msg.set_error_code(11).unwrap();
        let length = msg.set_error_message("channel unknown").unwrap();

        assert_eq!(length, ErrorResponse::length_for("channel unknown"));
        assert_eq!(msg.offending_correlation_id().unwrap(), 42);
        assert_eq!(msg.error_code().unwrap(), 11);
        assert_eq!(msg.error_message().unwrap(), "channel unknown");
    }

    #[test]
    fn publication_ready_round_trip() {
        let mut mem = AlignedBuffer::with_capacity(256);
        let msg = PublicationReady::wrap(mem.buffer(), 0);

        msg.set_correlation_id(5).unwrap();
        msg.set_registration_id(7).unwrap();
        msg.set_session_id(55).unwrap();
        msg.set_stream_id(1001).unwrap();
        msg.set_position_counter_id(3).unwrap();
        let length = msg.set_log_file_name("/dev/shm/basalt/pub-7.logbuffer").unwrap();

        assert_eq!(length, PublicationReady::length_for("/dev/shm/basalt/pub-7.logbuffer"));
        assert_eq!(msg.correlation_id().unwrap(), 5);
        assert_eq!(msg.registration_id().unwrap(), 7);
        assert_eq!(msg.session_id().unwrap(), 55);
        assert_eq!(msg.stream_id().unwrap(), 1001);
        assert_eq!(msg.position_counter_id().unwrap(), 3);
        assert_eq!(msg.log_file_name().unwrap(), "/dev/shm/basalt/pub-7.logbuffer");
    }

    #[test]
    fn image_ready_round_trip_with_both_strings() {
        let mut mem = AlignedBuffer::with_capacity(256);
        let msg = ImageReady::wrap(mem.buffer(), 0);

        msg.set_correlation_id(100).unwrap();
        msg.set_subscription_registration_id(12).unwrap();
        msg.set_session_id(-5).unwrap();
        msg.set_subscriber_position_id(9).unwrap();
        let length = msg
            .set_log_file_and_source("/dev/shm/basalt/img-100.logbuffer", "192.168.0.7:40123")
            .unwrap();

        assert_eq!(
            length,
            ImageReady::length_for("/dev/shm/basalt/img-100.logbuffer", "192.168.0.7:40123")
        );
        assert_eq!(msg.correlation_id().unwrap(), 100);
        assert_eq!(msg.subscription_registration_id().unwrap(), 12);
        assert_eq!(msg.session_id().unwrap(), -5);
        assert_eq!(msg.subscriber_position_id().unwrap(), 9);
        assert_eq!(msg.log_file_name().unwrap(), "/dev/shm/basalt/img-100.logbuffer");
        assert_eq!(msg.source_identity().unwrap(), "192.168.0.7:40123");
    }

    #[test]
    fn image_message_round_trip() {
        let mut mem = AlignedBuffer::with_capacity(32);
        let msg = ImageMessage::wrap(mem.buffer(), 0);

        msg.set_correlation_id(77).unwrap();
        msg.set_subscription_registration_id(12).unwrap();

        assert_eq!(msg.correlation_id().unwrap(), 77);
        assert_eq!(msg.subscription_registration_id().unwrap(), 12);
    }

    #[test]
    fn correlated_response_round_trip() {
        let mut mem = AlignedBuffer::with_capacity(16);
        let msg = CorrelatedResponse::wrap(mem.buffer(), 0);
        msg.set_correlation_id(31).unwrap();
        assert_eq!(msg.correlation_id().unwrap(), 31);
    }
}
