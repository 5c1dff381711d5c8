//! Client lifecycle: connect, operate, close.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use basalt_driver::{CncFile, DriverProxy};
use basalt_icc::{BroadcastReceiver, CopyReceiver, ManyToOneRingBuffer};
use tracing::{debug, info};

use crate::{
    ClientConductor, ClientError, Context, IdleStrategy, Publication, Subscription,
};

/// A connected client: the mapped CnC file, the conductor, and its thread.
///
/// All operations are safe to call from any thread. `add_*` and `find_*`
/// never block; `wait_for_*` spins with the context's idle strategy up to the
/// media-driver timeout. Dropping the client closes it.
pub struct BasaltClient {
    cnc: Option<CncFile>,
    conductor: Arc<ClientConductor>,
    conductor_thread: Option<JoinHandle<()>>,
    idle_strategy: Arc<dyn IdleStrategy>,
    media_driver_timeout: Duration,
    closed: bool,
}

impl BasaltClient {
    /// Maps the CnC file, wires up the rings and the driver proxy, and starts
    /// the conductor thread. Mapping and layout failures are fatal.
    pub fn connect(context: Context) -> Result<Self, ClientError> {
        let cnc = CncFile::map_existing(&context.cnc_file_name)?;

        let to_driver = Arc::new(ManyToOneRingBuffer::wrap(cnc.to_driver_buffer()?)?);
        let to_clients = CopyReceiver::new(BroadcastReceiver::wrap(cnc.to_clients_buffer()?)?);
        let driver_proxy = DriverProxy::new(Arc::clone(&to_driver));
        let client_liveness_timeout =
            Duration::from_nanos(cnc.client_liveness_timeout_ns()?.max(0) as u64);

        info!(
            cnc_file = %context.cnc_file_name,
            client_id = driver_proxy.client_id(),
            "connected to media driver"
        );

        let conductor = Arc::new(ClientConductor::new(
            driver_proxy,
            to_clients,
            client_liveness_timeout,
            &context,
        ));

        let conductor_thread = {
            let conductor = Arc::clone(&conductor);
            let idle = Arc::clone(&context.idle_strategy);
            std::thread::Builder::new()
                .name("basalt-conductor".to_string())
                .spawn(move || conductor.run(idle))?
        };

        Ok(Self {
            cnc: Some(cnc),
            conductor,
            conductor_thread: Some(conductor_thread),
            idle_strategy: Arc::clone(&context.idle_strategy),
            media_driver_timeout: context.media_driver_timeout,
            closed: false,
        })
    }

    /// Registers a publication; returns the correlation id to poll with
    /// [`Self::find_publication`].
    pub fn add_publication(&self, channel: &str, stream_id: i32) -> Result<i64, ClientError> {
        self.conductor.add_publication(channel, stream_id)
    }

    /// Non-blocking: the publication once registered, `None` while pending,
    /// or the terminal error.
    pub fn find_publication(
        &self,
        correlation_id: i64,
    ) -> Result<Option<Arc<Publication>>, ClientError> {
        self.conductor.find_publication(correlation_id)
    }

    /// Spins on `find_publication` with the idle strategy until resolution or
    /// the media-driver timeout.
    pub fn wait_for_publication(
        &self,
        correlation_id: i64,
    ) -> Result<Arc<Publication>, ClientError> {
        let deadline = Instant::now() + self.media_driver_timeout;
        loop {
            if let Some(publication) = self.find_publication(correlation_id)? {
                return Ok(publication);
            }
            if Instant::now() > deadline {
                return Err(ClientError::DriverTimeout);
            }
            self.idle_strategy.idle(0);
        }
    }

    pub fn add_subscription(&self, channel: &str, stream_id: i32) -> Result<i64, ClientError> {
        self.conductor.add_subscription(channel, stream_id)
    }

    pub fn find_subscription(
        &self,
        correlation_id: i64,
    ) -> Result<Option<Arc<Subscription>>, ClientError> {
        self.conductor.find_subscription(correlation_id)
    }

    pub fn wait_for_subscription(
        &self,
        correlation_id: i64,
    ) -> Result<Arc<Subscription>, ClientError> {
        let deadline = Instant::now() + self.media_driver_timeout;
        loop {
            if let Some(subscription) = self.find_subscription(correlation_id)? {
                return Ok(subscription);
            }
            if Instant::now() > deadline {
                return Err(ClientError::DriverTimeout);
            }
            self.idle_strategy.idle(0);
        }
    }

    /// Removes a publication locally and tells the driver. Idempotent.
    pub fn remove_publication(&self, registration_id: i64) -> Result<(), ClientError> {
        self.conductor.remove_publication(registration_id)
    }

    /// Removes a subscription and its images locally and tells the driver.
    pub fn remove_subscription(&self, registration_id: i64) -> Result<(), ClientError> {
        self.conductor.remove_subscription(registration_id)
    }

    /// Stops the conductor, releases every mapping, and closes the CnC file.
    /// Returns the first failure while continuing to release the rest.
    /// Repeated calls are no-ops.
    pub fn close(&mut self) -> Result<(), ClientError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        debug!("closing client");

        self.conductor.shutdown();
        if let Some(thread) = self.conductor_thread.take() {
            let _ = thread.join();
        }

        let mut first_error = self.conductor.release_all().err();

        if let Some(cnc) = self.cnc.take() {
            if let Err(e) = cnc.close() {
                if first_error.is_none() {
                    first_error = Some(e.into());
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for BasaltClient {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
