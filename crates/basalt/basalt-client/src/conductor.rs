//! The client conductor: the single background agent that owns every
//! registration table and drives all resource lifecycle.
//!
//! One conductor thread calls [`ClientConductor::do_work`] in a loop. Each
//! pass drains the driver's broadcast events, sweeps registration deadlines,
//! checks driver liveness, releases lingered resources whose grace period
//! passed, and sends the periodic keepalive. User threads call the
//! non-blocking `add_*`/`find_*`/`remove_*` entry points, which only touch
//! the tables under the state lock.
//!
//! Registration state machine, driven entirely by this module:
//!
//! ```text
//! AwaitingMediaDriver ──driver ready──▶ Registered
//!         │ │
//!         │ └────driver error─────────▶ Errored
//!         └──────deadline passed──────▶ TimedOut
//! ```
//!
//! Terminal states are absorbing; the pending entry is removed once the user
//! observes the outcome through `find_*`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use basalt_driver::responses::{
    response_type, CorrelatedResponse, ErrorResponse, ImageMessage, ImageReady, PublicationReady,
};
use basalt_driver::DriverProxy;
use basalt_icc::{CopyReceiver, IccError};
use tracing::{debug, error, warn};

use crate::context::{AvailableImageHandler, ErrorHandler, UnavailableImageHandler};
use crate::{ClientError, Context, IdleStrategy, Image, LogBuffers, Publication, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegistrationStatus {
    AwaitingMediaDriver,
    Registered,
    Errored,
    TimedOut,
}

struct PublicationRegistration {
    channel: String,
    stream_id: i32,
    deadline: Instant,
    status: RegistrationStatus,
    error: Option<(i32, String)>,
    publication: Option<Arc<Publication>>,
}

struct SubscriptionRegistration {
    channel: String,
    stream_id: i32,
    deadline: Instant,
    status: RegistrationStatus,
    error: Option<(i32, String)>,
    subscription: Option<Arc<Subscription>>,
}

struct LingeringResource {
    deadline: Instant,
    /// Held, never read: keeps the mapping alive until the deadline.
    _log_buffers: Arc<LogBuffers>,
}

struct ConductorState {
    pending_publications: HashMap<i64, PublicationRegistration>,
    /// correlation id → driver registration id, for finds after retrieval.
    publication_by_correlation: HashMap<i64, i64>,
    active_publications: HashMap<i64, Arc<Publication>>,
    pending_subscriptions: HashMap<i64, SubscriptionRegistration>,
    active_subscriptions: HashMap<i64, Arc<Subscription>>,
    /// Mapped logs owned by the conductor, keyed by the owning resource's id
    /// (publication registration id or image correlation id).
    log_buffers: HashMap<i64, Arc<LogBuffers>>,
    lingering: Vec<LingeringResource>,
    last_keepalive: Instant,
}

/// Owned form of a decoded driver event, so dispatch can run after the
/// broadcast scratch buffer has been reused.
enum DriverEvent {
    NewPublication {
        correlation_id: i64,
        registration_id: i64,
        session_id: i32,
        stream_id: i32,
        position_counter_id: i32,
        log_file: String,
    },
    SubscriptionReady {
        correlation_id: i64,
    },
    ErrorResponse {
        offending_correlation_id: i64,
        error_code: i32,
        message: String,
    },
    AvailableImage {
        correlation_id: i64,
        session_id: i32,
        subscription_registration_id: i64,
        subscriber_position_id: i32,
        log_file: String,
        source_identity: String,
    },
    UnavailableImage {
        correlation_id: i64,
        subscription_registration_id: i64,
    },
}

pub struct ClientConductor {
    driver_proxy: DriverProxy,
    to_clients: Mutex<CopyReceiver>,
    state: Mutex<ConductorState>,
    running: AtomicBool,
    terminated: AtomicBool,
    media_driver_timeout: Duration,
    client_liveness_timeout: Duration,
    resource_linger_timeout: Duration,
    keepalive_interval: Duration,
    error_handler: ErrorHandler,
    available_image_handler: AvailableImageHandler,
    unavailable_image_handler: UnavailableImageHandler,
}

impl ClientConductor {
    pub fn new(
        driver_proxy: DriverProxy,
        to_clients: CopyReceiver,
        client_liveness_timeout: Duration,
        context: &Context,
    ) -> Self {
        Self {
            driver_proxy,
            to_clients: Mutex::new(to_clients),
            state: Mutex::new(ConductorState {
                pending_publications: HashMap::new(),
                publication_by_correlation: HashMap::new(),
                active_publications: HashMap::new(),
                pending_subscriptions: HashMap::new(),
                active_subscriptions: HashMap::new(),
                log_buffers: HashMap::new(),
                lingering: Vec::new(),
                last_keepalive: Instant::now(),
            }),
            running: AtomicBool::new(true),
            terminated: AtomicBool::new(false),
            media_driver_timeout: context.media_driver_timeout,
            client_liveness_timeout,
            resource_linger_timeout: context.resource_linger_timeout,
            keepalive_interval: context.keepalive_interval,
            error_handler: Arc::clone(&context.error_handler),
            available_image_handler: Arc::clone(&context.available_image_handler),
            unavailable_image_handler: Arc::clone(&context.unavailable_image_handler),
        }
    }

    fn state(&self) -> MutexGuard<'_, ConductorState> {
        self.state.lock().expect("conductor state lock")
    }

    fn ensure_open(&self) -> Result<(), ClientError> {
        if self.terminated.load(Ordering::Acquire) {
            return Err(ClientError::DriverTimeout);
        }
        if !self.running.load(Ordering::Acquire) {
            return Err(ClientError::Closed);
        }
        Ok(())
    }

    // ── user-facing operations ──────────────────────────────────────────

    /// Sends an AddPublication command and records the pending registration.
    /// Returns the correlation id to poll with [`Self::find_publication`].
    pub fn add_publication(&self, channel: &str, stream_id: i32) -> Result<i64, ClientError> {
        self.ensure_open()?;
        // The pending entry must be visible before the driver can answer, so
        // hold the state lock across the command write.
        let mut state = self.state();
        let correlation_id = self.driver_proxy.add_publication(channel, stream_id)?;
        state.pending_publications.insert(
            correlation_id,
            PublicationRegistration {
                channel: channel.to_string(),
                stream_id,
                deadline: Instant::now() + self.media_driver_timeout,
                status: RegistrationStatus::AwaitingMediaDriver,
                error: None,
                publication: None,
            },
        );
        Ok(correlation_id)
    }

    /// Single non-blocking lookup: the resolved publication, `None` while the
    /// driver has not answered, or the terminal failure.
    pub fn find_publication(
        &self,
        correlation_id: i64,
    ) -> Result<Option<Arc<Publication>>, ClientError> {
        if self.terminated.load(Ordering::Acquire) {
            return Err(ClientError::DriverTimeout);
        }
        let mut state = self.state();

        let status = state
            .pending_publications
            .get(&correlation_id)
            .map(|entry| entry.status);

        match status {
            None => {
                let found = state
                    .publication_by_correlation
                    .get(&correlation_id)
                    .and_then(|registration_id| state.active_publications.get(registration_id))
                    .cloned();
                Ok(found)
            }
            Some(RegistrationStatus::AwaitingMediaDriver) => Ok(None),
            Some(RegistrationStatus::Registered) => {
                let entry = state.pending_publications.remove(&correlation_id);
                Ok(entry.and_then(|e| e.publication))
            }
            Some(RegistrationStatus::Errored) => {
                let entry = state.pending_publications.remove(&correlation_id);
                let (code, message) = entry
                    .and_then(|e| e.error)
                    .unwrap_or((0, String::new()));
                Err(ClientError::Registration { code, message })
            }
            Some(RegistrationStatus::TimedOut) => {
                state.pending_publications.remove(&correlation_id);
                Err(ClientError::DriverTimeout)
            }
        }
    }

    pub fn add_subscription(&self, channel: &str, stream_id: i32) -> Result<i64, ClientError> {
        self.ensure_open()?;
        let mut state = self.state();
        let correlation_id = self.driver_proxy.add_subscription(channel, stream_id)?;
        state.pending_subscriptions.insert(
            correlation_id,
            SubscriptionRegistration {
                channel: channel.to_string(),
                stream_id,
                deadline: Instant::now() + self.media_driver_timeout,
                status: RegistrationStatus::AwaitingMediaDriver,
                error: None,
                subscription: None,
            },
        );
        Ok(correlation_id)
    }

    pub fn find_subscription(
        &self,
        correlation_id: i64,
    ) -> Result<Option<Arc<Subscription>>, ClientError> {
        if self.terminated.load(Ordering::Acquire) {
            return Err(ClientError::DriverTimeout);
        }
        let mut state = self.state();

        let status = state
            .pending_subscriptions
            .get(&correlation_id)
            .map(|entry| entry.status);

        match status {
            None => Ok(state.active_subscriptions.get(&correlation_id).cloned()),
            Some(RegistrationStatus::AwaitingMediaDriver) => Ok(None),
            Some(RegistrationStatus::Registered) => {
                let entry = state.pending_subscriptions.remove(&correlation_id);
                Ok(entry.and_then(|e| e.subscription))
            }
            Some(RegistrationStatus::Errored) => {
                let entry = state.pending_subscriptions.remove(&correlation_id);
                let (code, message) = entry
                    .and_then(|e| e.error)
                    .unwrap_or((0, String::new()));
                Err(ClientError::Registration { code, message })
            }
            Some(RegistrationStatus::TimedOut) => {
                state.pending_subscriptions.remove(&correlation_id);
                Err(ClientError::DriverTimeout)
            }
        }
    }

    /// Removes a publication by registration id (or abandons a still-pending
    /// correlation id). The local entry goes away regardless of what the
    /// driver later replies; repeated removal is not an error.
    pub fn remove_publication(&self, registration_id: i64) -> Result<(), ClientError> {
        self.ensure_open()?;
        {
            let mut state = self.state();
            state.pending_publications.remove(&registration_id);
            if state.active_publications.remove(&registration_id).is_some() {
                state
                    .publication_by_correlation
                    .retain(|_, reg| *reg != registration_id);
                if let Some(log) = state.log_buffers.remove(&registration_id) {
                    self.linger(&mut state, log);
                }
            }
        }
        self.driver_proxy.remove_publication(registration_id)?;
        Ok(())
    }

    /// Removes a subscription and retires its images.
    pub fn remove_subscription(&self, registration_id: i64) -> Result<(), ClientError> {
        self.ensure_open()?;
        let removed_images = {
            let mut state = self.state();
            state.pending_subscriptions.remove(&registration_id);
            let mut removed = Vec::new();
            if let Some(subscription) = state.active_subscriptions.remove(&registration_id) {
                for image in subscription.drain_images() {
                    if let Some(log) = state.log_buffers.remove(&image.correlation_id()) {
                        self.linger(&mut state, log);
                    }
                    removed.push(image);
                }
            }
            removed
        };
        for image in &removed_images {
            (self.unavailable_image_handler)(image);
        }
        self.driver_proxy.remove_subscription(registration_id)?;
        Ok(())
    }

    // ── agent loop ──────────────────────────────────────────────────────

    /// One pass of the conductor duty cycle. Returns the number of driver
    /// events processed.
    pub fn do_work(&self) -> usize {
        if !self.running.load(Ordering::Acquire) {
            return 0;
        }

        let work = self.poll_driver_events();
        self.check_registration_deadlines();
        self.check_driver_liveness();
        self.process_lingering();
        self.send_keepalive();
        work
    }

    /// Runs the duty cycle until close or driver timeout, backing off through
    /// `idle` when nothing happened.
    pub fn run(&self, idle: Arc<dyn IdleStrategy>) {
        debug!(client_id = self.driver_proxy.client_id(), "client conductor started");
        while self.running.load(Ordering::Acquire) {
            let work = self.do_work();
            idle.idle(work);
        }
        // Grace periods are moot once the loop stops for good.
        self.state().lingering.clear();
        debug!("client conductor stopped");
    }

    /// Stops the duty cycle. Safe to call repeatedly.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Drops every table and mapping, reporting the first close failure while
    /// continuing through the rest. Called after the conductor thread has
    /// stopped.
    pub fn release_all(&self) -> Result<(), ClientError> {
        let mut state = self.state();
        let mut first_error: Option<ClientError> = None;

        for log in state.log_buffers.values() {
            if let Err(e) = log.close() {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        state.pending_publications.clear();
        state.publication_by_correlation.clear();
        state.active_publications.clear();
        state.pending_subscriptions.clear();
        state.active_subscriptions.clear();
        state.log_buffers.clear();
        state.lingering.clear();

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn poll_driver_events(&self) -> usize {
        let mut events = Vec::new();
        let receive_result = {
            let mut receiver = self.to_clients.lock().expect("broadcast receiver lock");
            receiver.receive(|msg_type, buffer, offset, _length| {
                match decode_event(msg_type, *buffer, offset) {
                    Ok(Some(event)) => events.push(event),
                    Ok(None) => warn!(msg_type, "unknown driver event type"),
                    Err(e) => warn!(msg_type, "undecodable driver event: {e}"),
                }
            })
        };

        if let Err(e) = receive_result {
            match e {
                IccError::Lapped { lapped_count } => {
                    // Loss is survivable: later events resynchronise the
                    // tables; the user decides how loudly to react.
                    warn!(lapped_count, "driver event stream lapped");
                    (self.error_handler)(&ClientError::Icc(e));
                }
                other => (self.error_handler)(&ClientError::Icc(other)),
            }
        }

        let count = events.len();
        for event in events {
            self.dispatch(event);
        }
        count
    }

    fn dispatch(&self, event: DriverEvent) {
        match event {
            DriverEvent::NewPublication {
                correlation_id,
                registration_id,
                session_id,
                stream_id,
                position_counter_id,
                log_file,
            } => self.on_new_publication(
                correlation_id,
                registration_id,
                session_id,
                stream_id,
                position_counter_id,
                &log_file,
            ),
            DriverEvent::SubscriptionReady { correlation_id } => {
                self.on_subscription_ready(correlation_id)
            }
            DriverEvent::ErrorResponse {
                offending_correlation_id,
                error_code,
                message,
            } => self.on_error_response(offending_correlation_id, error_code, message),
            DriverEvent::AvailableImage {
                correlation_id,
                session_id,
                subscription_registration_id,
                subscriber_position_id,
                log_file,
                source_identity,
            } => self.on_available_image(
                correlation_id,
                session_id,
                subscription_registration_id,
                subscriber_position_id,
                &log_file,
                source_identity,
            ),
            DriverEvent::UnavailableImage {
                correlation_id,
                subscription_registration_id,
            } => self.on_unavailable_image(correlation_id, subscription_registration_id),
        }
    }

    fn on_new_publication(
        &self,
        correlation_id: i64,
        registration_id: i64,
        session_id: i32,
        stream_id: i32,
        position_counter_id: i32,
        log_file: &str,
    ) {
        let mut state = self.state();
        let Some(entry) = state.pending_publications.get_mut(&correlation_id) else {
            debug!(correlation_id, "publication ready for unknown correlation");
            return;
        };
        if entry.status != RegistrationStatus::AwaitingMediaDriver {
            return;
        }

        match LogBuffers::map(log_file) {
            Ok(log) => {
                let log = Arc::new(log);
                let publication = Arc::new(Publication::new(
                    entry.channel.clone(),
                    stream_id,
                    session_id,
                    registration_id,
                    correlation_id,
                    position_counter_id,
                    Arc::clone(&log),
                ));
                entry.status = RegistrationStatus::Registered;
                entry.publication = Some(Arc::clone(&publication));
                state.log_buffers.insert(registration_id, log);
                state
                    .publication_by_correlation
                    .insert(correlation_id, registration_id);
                state.active_publications.insert(registration_id, publication);
                debug!(correlation_id, registration_id, session_id, "publication registered");
            }
            Err(e) => {
                entry.status = RegistrationStatus::Errored;
                entry.error = Some((0, format!("failed to map log file '{log_file}': {e}")));
            }
        }
    }

    fn on_subscription_ready(&self, correlation_id: i64) {
        let mut state = self.state();
        let Some(entry) = state.pending_subscriptions.get_mut(&correlation_id) else {
            return;
        };
        if entry.status != RegistrationStatus::AwaitingMediaDriver {
            return;
        }

        let subscription = Arc::new(Subscription::new(
            entry.channel.clone(),
            entry.stream_id,
            correlation_id,
        ));
        entry.status = RegistrationStatus::Registered;
        entry.subscription = Some(Arc::clone(&subscription));
        state.active_subscriptions.insert(correlation_id, subscription);
        debug!(correlation_id, "subscription registered");
    }

    fn on_error_response(&self, correlation_id: i64, error_code: i32, message: String) {
        let mut state = self.state();
        if let Some(entry) = state.pending_publications.get_mut(&correlation_id) {
            if entry.status == RegistrationStatus::AwaitingMediaDriver {
                entry.status = RegistrationStatus::Errored;
                entry.error = Some((error_code, message));
            }
            return;
        }
        if let Some(entry) = state.pending_subscriptions.get_mut(&correlation_id) {
            if entry.status == RegistrationStatus::AwaitingMediaDriver {
                entry.status = RegistrationStatus::Errored;
                entry.error = Some((error_code, message));
            }
            return;
        }
        warn!(correlation_id, error_code, "driver error for unknown correlation: {message}");
    }

    fn on_available_image(
        &self,
        correlation_id: i64,
        session_id: i32,
        subscription_registration_id: i64,
        subscriber_position_id: i32,
        log_file: &str,
        source_identity: String,
    ) {
        let image = {
            let mut state = self.state();
            let Some(subscription) =
                state.active_subscriptions.get(&subscription_registration_id).cloned()
            else {
                debug!(subscription_registration_id, "image for unknown subscription");
                return;
            };

            match LogBuffers::map(log_file) {
                Ok(log) => {
                    let log = Arc::new(log);
                    let image = Arc::new(Image::new(
                        correlation_id,
                        session_id,
                        subscription_registration_id,
                        subscriber_position_id,
                        source_identity,
                        Arc::clone(&log),
                    ));
                    state.log_buffers.insert(correlation_id, log);
                    subscription.add_image(Arc::clone(&image));
                    Some(image)
                }
                Err(e) => {
                    warn!(correlation_id, "failed to map image log '{log_file}': {e}");
                    None
                }
            }
        };

        if let Some(image) = image {
            (self.available_image_handler)(&image);
        }
    }

    fn on_unavailable_image(&self, correlation_id: i64, subscription_registration_id: i64) {
        let removed = {
            let mut state = self.state();
            let Some(subscription) =
                state.active_subscriptions.get(&subscription_registration_id).cloned()
            else {
                return;
            };
            let removed = subscription.remove_image(correlation_id);
            if removed.is_some() {
                if let Some(log) = state.log_buffers.remove(&correlation_id) {
                    self.linger(&mut state, log);
                }
            }
            removed
        };

        if let Some(image) = removed {
            (self.unavailable_image_handler)(&image);
        }
    }

    // ── sweeps ──────────────────────────────────────────────────────────

    fn check_registration_deadlines(&self) {
        let now = Instant::now();
        let mut timed_out = 0usize;
        {
            let mut state = self.state();
            for (correlation_id, entry) in state.pending_publications.iter_mut() {
                if entry.status == RegistrationStatus::AwaitingMediaDriver && now > entry.deadline {
                    entry.status = RegistrationStatus::TimedOut;
                    warn!(correlation_id, "publication registration timed out");
                    timed_out += 1;
                }
            }
            for (correlation_id, entry) in state.pending_subscriptions.iter_mut() {
                if entry.status == RegistrationStatus::AwaitingMediaDriver && now > entry.deadline {
                    entry.status = RegistrationStatus::TimedOut;
                    warn!(correlation_id, "subscription registration timed out");
                    timed_out += 1;
                }
            }
        }
        for _ in 0..timed_out {
            (self.error_handler)(&ClientError::DriverTimeout);
        }
    }

    fn check_driver_liveness(&self) {
        let heartbeat_ms = self.driver_proxy.time_of_last_driver_keepalive();
        if heartbeat_ms <= 0 {
            // Driver has not stamped the counter yet; nothing to judge.
            return;
        }
        let age_ms = epoch_ms().saturating_sub(heartbeat_ms);
        if age_ms as u128 > self.client_liveness_timeout.as_millis() {
            self.on_driver_timeout(age_ms);
        }
    }

    /// Terminal transition: the driver is gone. Every registration becomes
    /// Errored, active resources go to linger, handlers fire, and the duty
    /// cycle stops. All later user operations fail with `DriverTimeout`.
    fn on_driver_timeout(&self, age_ms: i64) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        error!(age_ms, "media driver heartbeat stale; terminating conductor");

        let retired_images = {
            let mut state = self.state();

            for entry in state.pending_publications.values_mut() {
                if entry.status == RegistrationStatus::AwaitingMediaDriver {
                    entry.status = RegistrationStatus::Errored;
                    entry.error = Some((0, "media driver is unresponsive".to_string()));
                }
            }
            for entry in state.pending_subscriptions.values_mut() {
                if entry.status == RegistrationStatus::AwaitingMediaDriver {
                    entry.status = RegistrationStatus::Errored;
                    entry.error = Some((0, "media driver is unresponsive".to_string()));
                }
            }

            let registrations: Vec<i64> = state.active_publications.keys().copied().collect();
            for registration_id in registrations {
                state.active_publications.remove(&registration_id);
                if let Some(log) = state.log_buffers.remove(&registration_id) {
                    self.linger(&mut state, log);
                }
            }
            state.publication_by_correlation.clear();

            let mut retired = Vec::new();
            let subscriptions: Vec<Arc<Subscription>> =
                state.active_subscriptions.drain().map(|(_, s)| s).collect();
            for subscription in subscriptions {
                for image in subscription.drain_images() {
                    if let Some(log) = state.log_buffers.remove(&image.correlation_id()) {
                        self.linger(&mut state, log);
                    }
                    retired.push(image);
                }
            }
            retired
        };

        for image in &retired_images {
            (self.unavailable_image_handler)(image);
        }
        (self.error_handler)(&ClientError::DriverTimeout);
        self.running.store(false, Ordering::Release);
    }

    fn process_lingering(&self) {
        let now = Instant::now();
        let mut state = self.state();
        state.lingering.retain(|resource| resource.deadline > now);
    }

    fn send_keepalive(&self) {
        let now = Instant::now();
        let due = {
            let mut state = self.state();
            if now.duration_since(state.last_keepalive) >= self.keepalive_interval {
                state.last_keepalive = now;
                true
            } else {
                false
            }
        };
        if due {
            if let Err(e) = self.driver_proxy.client_keepalive() {
                warn!("failed to send client keepalive: {e}");
            }
        }
    }

    fn linger(&self, state: &mut ConductorState, log_buffers: Arc<LogBuffers>) {
        state.lingering.push(LingeringResource {
            deadline: Instant::now() + self.resource_linger_timeout,
            _log_buffers: log_buffers,
        });
    }

    /// Count of resources awaiting their linger deadline; for tooling/tests.
    pub fn lingering_count(&self) -> usize {
        self.state().lingering.len()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }
}

fn decode_event(
    msg_type: i32,
    buffer: basalt_buffers::AtomicBuffer,
    offset: usize,
) -> Result<Option<DriverEvent>, ClientError> {
    let event = match msg_type {
        response_type::ON_NEW_PUBLICATION | response_type::ON_EXCLUSIVE_NEW_PUBLICATION => {
            let msg = PublicationReady::wrap(buffer, offset);
            DriverEvent::NewPublication {
                correlation_id: msg.correlation_id()?,
                registration_id: msg.registration_id()?,
                session_id: msg.session_id()?,
                stream_id: msg.stream_id()?,
                position_counter_id: msg.position_counter_id()?,
                log_file: msg.log_file_name()?,
            }
        }
        response_type::ON_NEW_SUBSCRIPTION | response_type::ON_OPERATION_SUCCESS => {
            let msg = CorrelatedResponse::wrap(buffer, offset);
            DriverEvent::SubscriptionReady {
                correlation_id: msg.correlation_id()?,
            }
        }
        response_type::ON_ERROR => {
            let msg = ErrorResponse::wrap(buffer, offset);
            DriverEvent::ErrorResponse {
                offending_correlation_id: msg.offending_correlation_id()?,
                error_code: msg.error_code()?,
                message: msg.error_message()?,
            }
        }
        response_type::ON_AVAILABLE_IMAGE => {
            let msg = ImageReady::wrap(buffer, offset);
            DriverEvent::AvailableImage {
                correlation_id: msg.correlation_id()?,
                session_id: msg.session_id()?,
                subscription_registration_id: msg.subscription_registration_id()?,
                subscriber_position_id: msg.subscriber_position_id()?,
                log_file: msg.log_file_name()?,
                source_identity: msg.source_identity()?,
            }
        }
        response_type::ON_UNAVAILABLE_IMAGE => {
            let msg = ImageMessage::wrap(buffer, offset);
            DriverEvent::UnavailableImage {
                correlation_id: msg.correlation_id()?,
                subscription_registration_id: msg.subscription_registration_id()?,
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(event))
}

fn epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
