//! Client→driver command messages.
//!
//! Flyweight codecs over [`AtomicBuffer`]: a codec borrows a buffer and an
//! offset and reads/writes fields at fixed positions. 64-bit fields come
//! first so natural alignment holds whenever the base offset is 8-byte
//! aligned, which both the rings and the encoding scratch guarantee.
//!
//! Type codes are a wire contract with the driver and never change.

use basalt_buffers::{AtomicBuffer, OutOfBounds};

/// Stable command type codes.
pub mod command_type {
    pub const ADD_PUBLICATION: i32 = 0x01;
    pub const REMOVE_PUBLICATION: i32 = 0x02;
    pub const ADD_SUBSCRIPTION: i32 = 0x03;
    pub const REMOVE_SUBSCRIPTION: i32 = 0x04;
    pub const CLIENT_KEEPALIVE: i32 = 0x05;
    pub const ADD_DESTINATION: i32 = 0x06;
    pub const REMOVE_DESTINATION: i32 = 0x07;
}

/// `{client_id: i64, correlation_id: i64}`: the prefix every command
/// shares, and the whole of a keepalive.
#[derive(Clone, Copy)]
pub struct CorrelatedMessage {
    buffer: AtomicBuffer,
    offset: usize,
}

impl CorrelatedMessage {
    pub const LENGTH: usize = 16;

    pub fn wrap(buffer: AtomicBuffer, offset: usize) -> Self {
        Self { buffer, offset }
    }

    pub fn client_id(&self) -> Result<i64, OutOfBounds> {
        self.buffer.get_i64(self.offset)
    }

    pub fn set_client_id(&self, value: i64) -> Result<(), OutOfBounds> {
        self.buffer.put_i64(self.offset, value)
    }

    pub fn correlation_id(&self) -> Result<i64, OutOfBounds> {
        self.buffer.get_i64(self.offset + 8)
    }

    pub fn set_correlation_id(&self, value: i64) -> Result<(), OutOfBounds> {
        self.buffer.put_i64(self.offset + 8, value)
    }
}

/// `{client_id, correlation_id, stream_id: i32, channel: string}`:
/// AddPublication and AddSubscription.
#[derive(Clone, Copy)]
pub struct PublicationMessage {
    buffer: AtomicBuffer,
    offset: usize,
}

impl PublicationMessage {
    const STREAM_ID_OFFSET: usize = 16;
    const CHANNEL_OFFSET: usize = 20;

    pub fn wrap(buffer: AtomicBuffer, offset: usize) -> Self {
        Self { buffer, offset }
    }

    /// Encoded length for a given channel.
    pub fn length_for(channel: &str) -> usize {
        Self::CHANNEL_OFFSET + 4 + channel.len()
    }

    pub fn client_id(&self) -> Result<i64, OutOfBounds> {
        self.buffer.get_i64(self.offset)
    }

    pub fn set_client_id(&self, value: i64) -> Result<(), OutOfBounds> {
        self.buffer.put_i64(self.offset, value)
    }

    pub fn correlation_id(&self) -> Result<i64, OutOfBounds> {
        self.buffer.get_i64(self.offset + 8)
    }

    pub fn set_correlation_id(&self, value: i64) -> Result<(), OutOfBounds> {
        self.buffer.put_i64(self.offset + 8, value)
    }

    pub fn stream_id(&self) -> Result<i32, OutOfBounds> {
        self.buffer.get_i32(self.offset + Self::STREAM_ID_OFFSET)
    }

    pub fn set_stream_id(&self, value: i32) -> Result<(), OutOfBounds> {
        self.buffer.put_i32(self.offset + Self::STREAM_ID_OFFSET, value)
    }

    pub fn channel(&self) -> Result<String, OutOfBounds> {
        self.buffer.get_string(self.offset + Self::CHANNEL_OFFSET)
    }

    /// Writes the channel and returns the total encoded message length.
    pub fn set_channel(&self, value: &str) -> Result<usize, OutOfBounds> {
        let written = self.buffer.put_string(self.offset + Self::CHANNEL_OFFSET, value)?;
        Ok(Self::CHANNEL_OFFSET + written)
    }
}

/// `{client_id, correlation_id, registration_id: i64}`: RemovePublication
/// and RemoveSubscription.
#[derive(Clone, Copy)]
pub struct RemoveMessage {
    buffer: AtomicBuffer,
    offset: usize,
}

impl RemoveMessage {
    pub const LENGTH: usize = 24;

    pub fn wrap(buffer: AtomicBuffer, offset: usize) -> Self {
        Self { buffer, offset }
    }

    pub fn client_id(&self) -> Result<i64, OutOfBounds> {
        self.buffer.get_i64(self.offset)
    }

    pub fn set_client_id(&self, value: i64) -> Result<(), OutOfBounds> {
        self.buffer.put_i64(self.offset, value)
    }

    pub fn correlation_id(&self) -> Result<i64, OutOfBounds> {
        self.buffer.get_i64(self.offset + 8)
    }

    pub fn set_correlation_id(&self, value: i64) -> Result<(), OutOfBounds> {
        self.buffer.put_i64(self.offset + 8, value)
    }

    pub fn registration_id(&self) -> Result<i64, OutOfBounds> {
        self.buffer.get_i64(self.offset + 16)
    }

    pub fn set_registration_id(&self, value: i64) -> Result<(), OutOfBounds> {
        self.buffer.put_i64(self.offset + 16, value)
    }
}

/// `{client_id, correlation_id, registration_correlation_id: i64,
/// channel: string}`: AddDestination and RemoveDestination.
#[derive(Clone, Copy)]
pub struct DestinationMessage {
    buffer: AtomicBuffer,
    offset: usize,
}

impl DestinationMessage {
    const REGISTRATION_OFFSET: usize = 16;
    const CHANNEL_OFFSET: usize = 24;

    pub fn wrap(buffer: AtomicBuffer, offset: usize) -> Self {
        Self { buffer, offset }
    }

    pub fn length_for(channel: &str) -> usize {
        Self::CHANNEL_OFFSET + 4 + channel.len()
    }

    pub fn client_id(&self) -> Result<i64, OutOfBounds> {
        self.buffer.get_i64(self.offset)
    }

    pub fn set_client_id(&self, value: i64) -> Result<(), OutOfBounds> {
        self.buffer.put_i64(self.offset, value)
    }

    pub fn correlation_id(&self) -> Result<i64, OutOfBounds> {
        self.buffer.get_i64(self.offset + 8)
    }

    pub fn set_correlation_id(&self, value: i64) -> Result<(), OutOfBounds> {
        self.buffer.put_i64(self.offset + 8, value)
    }

    /// Registration id of the publication the destination belongs to.
    pub fn registration_correlation_id(&self) -> Result<i64, OutOfBounds> {
        self.buffer.get_i64(self.offset + Self::REGISTRATION_OFFSET)
    }

    pub fn set_registration_correlation_id(&self, value: i64) -> Result<(), OutOfBounds> {
        self.buffer.put_i64(self.offset + Self::REGISTRATION_OFFSET, value)
    }

    pub fn channel(&self) -> Result<String, OutOfBounds> {
        self.buffer.get_string(self.offset + Self::CHANNEL_OFFSET)
    }

    pub fn set_channel(&self, value: &str) -> Result<usize, OutOfBounds> {
        let written = self.buffer.put_string(self.offset + Self::CHANNEL_OFFSET, value)?;
        Ok(Self::CHANNEL_OFFSET + written)
    }
}
