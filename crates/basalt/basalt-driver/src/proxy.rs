//! Command encoder in front of the to-driver ring.
//!
//! Every command gets a fresh correlation id from the counter the driver
//! shares with all its clients, so ids are strictly increasing across the
//! whole CnC file, and a command written before another by the same thread
//! reaches the driver first (ring FIFO per producer).

use std::sync::Arc;

use basalt_buffers::AlignedBuffer;
use basalt_icc::{IccError, ManyToOneRingBuffer};
use tracing::debug;

use crate::commands::{
    command_type, CorrelatedMessage, DestinationMessage, PublicationMessage, RemoveMessage,
};

pub struct DriverProxy {
    to_driver: Arc<ManyToOneRingBuffer>,
    client_id: i64,
}

impl DriverProxy {
    /// Binds to the ring and claims a client id from the correlation counter.
    pub fn new(to_driver: Arc<ManyToOneRingBuffer>) -> Self {
        let client_id = to_driver.next_correlation_id();
        debug!(client_id, "driver proxy initialised");
        Self {
            to_driver,
            client_id,
        }
    }

    #[inline]
    pub fn client_id(&self) -> i64 {
        self.client_id
    }

    /// Epoch-millisecond timestamp of the driver's last heartbeat.
    #[inline]
    pub fn time_of_last_driver_keepalive(&self) -> i64 {
        self.to_driver.consumer_heartbeat_time()
    }

    /// Largest channel string a command can carry.
    pub fn max_channel_length(&self) -> usize {
        self.to_driver.max_message_length() - PublicationMessage::length_for("")
    }

    pub fn add_publication(&self, channel: &str, stream_id: i32) -> Result<i64, IccError> {
        let correlation_id = self.to_driver.next_correlation_id();
        self.send_publication_message(
            command_type::ADD_PUBLICATION,
            correlation_id,
            channel,
            stream_id,
        )?;
        Ok(correlation_id)
    }

    pub fn remove_publication(&self, registration_id: i64) -> Result<i64, IccError> {
        self.send_remove_message(command_type::REMOVE_PUBLICATION, registration_id)
    }

    pub fn add_subscription(&self, channel: &str, stream_id: i32) -> Result<i64, IccError> {
        let correlation_id = self.to_driver.next_correlation_id();
        self.send_publication_message(
            command_type::ADD_SUBSCRIPTION,
            correlation_id,
            channel,
            stream_id,
        )?;
        Ok(correlation_id)
    }

    pub fn remove_subscription(&self, registration_id: i64) -> Result<i64, IccError> {
        self.send_remove_message(command_type::REMOVE_SUBSCRIPTION, registration_id)
    }

    /// Tells the driver this client is still alive. No correlation id: the
    /// driver never responds to keepalives.
    pub fn client_keepalive(&self) -> Result<(), IccError> {
        let mut scratch = AlignedBuffer::with_capacity(CorrelatedMessage::LENGTH);
        let buffer = scratch.buffer();
        let msg = CorrelatedMessage::wrap(buffer, 0);
        msg.set_client_id(self.client_id)?;
        msg.set_correlation_id(0)?;

        self.to_driver
            .write(command_type::CLIENT_KEEPALIVE, &buffer, 0, CorrelatedMessage::LENGTH)?;
        Ok(())
    }

    pub fn add_destination(&self, registration_id: i64, channel: &str) -> Result<i64, IccError> {
        self.send_destination_message(command_type::ADD_DESTINATION, registration_id, channel)
    }

    pub fn remove_destination(&self, registration_id: i64, channel: &str) -> Result<i64, IccError> {
        self.send_destination_message(command_type::REMOVE_DESTINATION, registration_id, channel)
    }

    fn send_publication_message(
        &self,
        msg_type: i32,
        correlation_id: i64,
        channel: &str,
        stream_id: i32,
    ) -> Result<(), IccError> {
        let mut scratch = AlignedBuffer::with_capacity(PublicationMessage::length_for(channel));
        let buffer = scratch.buffer();
        let msg = PublicationMessage::wrap(buffer, 0);
        msg.set_client_id(self.client_id)?;
        msg.set_correlation_id(correlation_id)?;
        msg.set_stream_id(stream_id)?;
        let length = msg.set_channel(channel)?;

        self.to_driver.write(msg_type, &buffer, 0, length)?;
        Ok(())
    }

    fn send_remove_message(&self, msg_type: i32, registration_id: i64) -> Result<i64, IccError> {
        let correlation_id = self.to_driver.next_correlation_id();
        let mut scratch = AlignedBuffer::with_capacity(RemoveMessage::LENGTH);
        let buffer = scratch.buffer();
        let msg = RemoveMessage::wrap(buffer, 0);
        msg.set_client_id(self.client_id)?;
        msg.set_correlation_id(correlation_id)?;
        msg.set_registration_id(registration_id)?;

        self.to_driver.write(msg_type, &buffer, 0, RemoveMessage::LENGTH)?;
        Ok(correlation_id)
    }

    fn send_destination_message(
        &self,
        msg_type: i32,
        registration_id: i64,
        channel: &str,
    ) -> Result<i64, IccError> {
        let correlation_id = self.to_driver.next_correlation_id();
        let mut scratch = AlignedBuffer::with_capacity(DestinationMessage::length_for(channel));
        let buffer = scratch.buffer();
        let msg = DestinationMessage::wrap(buffer, 0);
        msg.set_client_id(self.client_id)?;
        msg.set_correlation_id(correlation_id)?;
        msg.set_registration_correlation_id(registration_id)?;
        let length = msg.set_channel(channel)?;

        self.to_driver.write(msg_type, &buffer, 0, length)?;
        Ok(correlation_id)
    }
}
