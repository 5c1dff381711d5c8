//! Conductor tests against a fake media driver.
//!
//! The fake driver is the other side of the CnC file: it seeds a well-formed
//! file, consumes commands from the to-driver ring, and answers over the
//! to-clients broadcast. Tests either connect a full `BasaltClient` (with its
//! background conductor thread) or drive a `ClientConductor` by hand for
//! deterministic timing.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use basalt_buffers::{AlignedBuffer, AtomicBuffer};
use basalt_client::{
    BasaltClient, BusySpinIdleStrategy, ClientConductor, ClientError, Context, LogBuffers,
    LOG_META_DATA_LENGTH, PARTITION_COUNT,
};
use basalt_driver::commands::{command_type, CorrelatedMessage, PublicationMessage, RemoveMessage};
use basalt_driver::responses::{
    response_type, CorrelatedResponse, ErrorResponse, ImageMessage, ImageReady, PublicationReady,
};
use basalt_driver::{CncFile, CncLengths, DriverProxy};
use basalt_icc::descriptor::{BROADCAST_TRAILER_LENGTH, RING_TRAILER_LENGTH};
use basalt_icc::{BroadcastReceiver, BroadcastTransmitter, CopyReceiver, ManyToOneRingBuffer};
use basalt_client::log_meta::TERM_LENGTH_OFFSET;
use basalt_mmap::MmapFileMut;

fn unique_path(tag: &str, n: u32) -> String {
    format!("/tmp/basalt_conductor_{}_{}_{}", tag, std::process::id(), n)
}

fn epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

/// Creates a log file whose metadata declares `term_length`.
fn seed_log(path: &str, term_length: usize) {
    let log_length = (PARTITION_COUNT * term_length + LOG_META_DATA_LENGTH) as u64;
    let mut mmap = MmapFileMut::create_rw(path, log_length).expect("create log");
    let buffer = unsafe { AtomicBuffer::wrap(mmap.as_mut_ptr(), mmap.len()) };
    buffer
        .put_i32(
            PARTITION_COUNT * term_length + TERM_LENGTH_OFFSET,
            term_length as i32,
        )
        .unwrap();
    mmap.close().expect("close log");
}

#[derive(Debug, PartialEq)]
enum Command {
    AddPublication { correlation_id: i64, stream_id: i32, channel: String },
    RemovePublication { registration_id: i64 },
    AddSubscription { correlation_id: i64, stream_id: i32, channel: String },
    RemoveSubscription { registration_id: i64 },
    Keepalive { client_id: i64 },
}

/// The driver half of a seeded CnC file.
struct FakeDriver {
    _cnc: CncFile,
    to_driver: ManyToOneRingBuffer,
    to_clients: BroadcastTransmitter,
    scratch: AlignedBuffer,
}

impl FakeDriver {
    fn create(cnc_path: &str, liveness_timeout: Duration) -> Self {
        let lengths = CncLengths {
            to_driver: 4096 + RING_TRAILER_LENGTH,
            to_clients: 4096 + BROADCAST_TRAILER_LENGTH,
            counter_metadata: 1024,
            counter_values: 1024,
            error_log: 1024,
        };
        let cnc = CncFile::create(cnc_path, lengths, liveness_timeout.as_nanos() as i64)
            .expect("create cnc");

        let to_driver =
            ManyToOneRingBuffer::wrap(cnc.to_driver_buffer().unwrap()).expect("driver ring");
        let to_clients =
            BroadcastTransmitter::wrap(cnc.to_clients_buffer().unwrap()).expect("broadcast");

        Self {
            _cnc: cnc,
            to_driver,
            to_clients,
            scratch: AlignedBuffer::with_capacity(1024),
        }
    }

    fn heartbeat(&self, at_ms: i64) {
        self.to_driver.set_consumer_heartbeat_time(at_ms);
    }

    fn drain_commands(&self) -> Vec<Command> {
        let mut commands = Vec::new();
        self.to_driver
            .read(
                |msg_type, buffer, offset, _| match msg_type {
                    command_type::ADD_PUBLICATION => {
                        let msg = PublicationMessage::wrap(*buffer, offset);
                        commands.push(Command::AddPublication {
                            correlation_id: msg.correlation_id().unwrap(),
                            stream_id: msg.stream_id().unwrap(),
                            channel: msg.channel().unwrap(),
                        });
                    }
                    command_type::REMOVE_PUBLICATION => {
                        let msg = RemoveMessage::wrap(*buffer, offset);
                        commands.push(Command::RemovePublication {
                            registration_id: msg.registration_id().unwrap(),
                        });
                    }
                    command_type::ADD_SUBSCRIPTION => {
                        let msg = PublicationMessage::wrap(*buffer, offset);
                        commands.push(Command::AddSubscription {
                            correlation_id: msg.correlation_id().unwrap(),
                            stream_id: msg.stream_id().unwrap(),
                            channel: msg.channel().unwrap(),
                        });
                    }
                    command_type::REMOVE_SUBSCRIPTION => {
                        let msg = RemoveMessage::wrap(*buffer, offset);
                        commands.push(Command::RemoveSubscription {
                            registration_id: msg.registration_id().unwrap(),
                        });
                    }
                    command_type::CLIENT_KEEPALIVE => {
                        let msg = CorrelatedMessage::wrap(*buffer, offset);
                        commands.push(Command::Keepalive {
                            client_id: msg.client_id().unwrap(),
                        });
                    }
                    other => panic!("unexpected command type {other}"),
                },
                64,
            )
            .expect("drain commands");
        commands
    }

    fn publication_ready(
        &mut self,
        correlation_id: i64,
        registration_id: i64,
        session_id: i32,
        stream_id: i32,
        log_file: &str,
    ) {
        let buffer = self.scratch.buffer();
        let msg = PublicationReady::wrap(buffer, 0);
        msg.set_correlation_id(correlation_id).unwrap();
        msg.set_registration_id(registration_id).unwrap();
        msg.set_session_id(session_id).unwrap();
        msg.set_stream_id(stream_id).unwrap();
        msg.set_position_counter_id(3).unwrap();
        let length = msg.set_log_file_name(log_file).unwrap();
        self.to_clients
            .transmit(response_type::ON_NEW_PUBLICATION, &buffer, 0, length)
            .expect("transmit publication ready");
    }

    fn subscription_ready(&mut self, correlation_id: i64) {
        let buffer = self.scratch.buffer();
        let msg = CorrelatedResponse::wrap(buffer, 0);
        msg.set_correlation_id(correlation_id).unwrap();
        self.to_clients
            .transmit(
                response_type::ON_NEW_SUBSCRIPTION,
                &buffer,
                0,
                CorrelatedResponse::LENGTH,
            )
            .expect("transmit subscription ready");
    }

    fn error_response(&mut self, correlation_id: i64, code: i32, message: &str) {
        let buffer = self.scratch.buffer();
        let msg = ErrorResponse::wrap(buffer, 0);
        msg.set_offending_correlation_id(correlation_id).unwrap();
        msg.set_error_code(code).unwrap();
        let length = msg.set_error_message(message).unwrap();
        self.to_clients
            .transmit(response_type::ON_ERROR, &buffer, 0, length)
            .expect("transmit error");
    }

    fn image_ready(
        &mut self,
        correlation_id: i64,
        session_id: i32,
        subscription_registration_id: i64,
        log_file: &str,
        source_identity: &str,
    ) {
        let buffer = self.scratch.buffer();
        let msg = ImageReady::wrap(buffer, 0);
        msg.set_correlation_id(correlation_id).unwrap();
        msg.set_session_id(session_id).unwrap();
        msg.set_subscription_registration_id(subscription_registration_id)
            .unwrap();
        msg.set_subscriber_position_id(9).unwrap();
        let length = msg.set_log_file_and_source(log_file, source_identity).unwrap();
        self.to_clients
            .transmit(response_type::ON_AVAILABLE_IMAGE, &buffer, 0, length)
            .expect("transmit image ready");
    }

    fn image_unavailable(&mut self, correlation_id: i64, subscription_registration_id: i64) {
        let buffer = self.scratch.buffer();
        let msg = ImageMessage::wrap(buffer, 0);
        msg.set_correlation_id(correlation_id).unwrap();
        msg.set_subscription_registration_id(subscription_registration_id)
            .unwrap();
        self.to_clients
            .transmit(
                response_type::ON_UNAVAILABLE_IMAGE,
                &buffer,
                0,
                ImageMessage::LENGTH,
            )
            .expect("transmit image unavailable");
    }
}

/// A conductor driven by hand (no background thread), for deterministic
/// timing tests.
fn manual_conductor(cnc_path: &str, context: &Context) -> ClientConductor {
    let cnc = CncFile::map_existing(cnc_path).expect("map cnc");
    let to_driver = Arc::new(ManyToOneRingBuffer::wrap(cnc.to_driver_buffer().unwrap()).unwrap());
    let receiver = CopyReceiver::new(BroadcastReceiver::wrap(cnc.to_clients_buffer().unwrap()).unwrap());
    let proxy = DriverProxy::new(to_driver);
    let liveness =
        Duration::from_nanos(cnc.client_liveness_timeout_ns().unwrap().max(0) as u64);
    // The mapping must outlive the conductor; leak it for test scope.
    std::mem::forget(cnc);
    ClientConductor::new(proxy, receiver, liveness, context)
}

#[test]
fn publication_registration_end_to_end() {
    let cnc_path = unique_path("pub", 0);
    let log_path = unique_path("pub_log", 1);
    let mut driver = FakeDriver::create(&cnc_path, Duration::from_secs(3600));
    seed_log(&log_path, 65536);

    let context = Context {
        cnc_file_name: cnc_path.clone(),
        media_driver_timeout: Duration::from_secs(5),
        idle_strategy: Arc::new(BusySpinIdleStrategy),
        ..Context::default()
    };
    let mut client = BasaltClient::connect(context).expect("connect");

    let correlation_id = client
        .add_publication("basalt:udp?endpoint=localhost:40123", 1001)
        .expect("add publication");

    // Driver sees the command and answers.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        let commands = driver.drain_commands();
        if commands.iter().any(|c| {
            matches!(c, Command::AddPublication { correlation_id: id, stream_id: 1001, channel }
                if *id == correlation_id && channel == "basalt:udp?endpoint=localhost:40123")
        }) {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "command never arrived");
    }
    driver.publication_ready(correlation_id, 7, 55, 1001, &log_path);

    let publication = client.wait_for_publication(correlation_id).expect("resolve");
    assert_eq!(publication.registration_id(), 7);
    assert_eq!(publication.session_id(), 55);
    assert_eq!(publication.stream_id(), 1001);
    assert_eq!(publication.term_length(), 65536);

    // Still findable after retrieval.
    let again = client.find_publication(correlation_id).expect("find again");
    assert!(again.is_some());

    // Idempotent removal: both calls succeed, each sends a driver command.
    client.remove_publication(7).expect("first remove");
    client.remove_publication(7).expect("second remove");
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    let mut removes = 0;
    while removes < 2 {
        removes += driver
            .drain_commands()
            .iter()
            .filter(|c| matches!(c, Command::RemovePublication { registration_id: 7 }))
            .count();
        assert!(std::time::Instant::now() < deadline, "remove commands never arrived");
    }

    client.close().expect("close");
    client.close().expect("close is idempotent");
    drop(client);

    let _ = std::fs::remove_file(&cnc_path);
    let _ = std::fs::remove_file(&log_path);
}

#[test]
fn subscription_and_image_lifecycle() {
    let cnc_path = unique_path("sub", 0);
    let log_path = unique_path("sub_log", 1);
    let mut driver = FakeDriver::create(&cnc_path, Duration::from_secs(3600));
    seed_log(&log_path, 65536);

    let available: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
    let unavailable: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));

    let context = Context {
        cnc_file_name: cnc_path.clone(),
        resource_linger_timeout: Duration::from_millis(30),
        available_image_handler: {
            let available = Arc::clone(&available);
            Arc::new(move |image| available.lock().unwrap().push(image.correlation_id()))
        },
        unavailable_image_handler: {
            let unavailable = Arc::clone(&unavailable);
            Arc::new(move |image| unavailable.lock().unwrap().push(image.correlation_id()))
        },
        ..Context::default()
    };
    let conductor = manual_conductor(&cnc_path, &context);

    let correlation_id = conductor
        .add_subscription("basalt:udp?endpoint=localhost:40124", 2002)
        .expect("add subscription");
    assert!(conductor.find_subscription(correlation_id).unwrap().is_none());

    driver.subscription_ready(correlation_id);
    conductor.do_work();

    let subscription = conductor
        .find_subscription(correlation_id)
        .expect("find")
        .expect("registered");
    assert_eq!(subscription.registration_id(), correlation_id);
    assert_eq!(subscription.image_count(), 0);

    driver.image_ready(900, -5, correlation_id, &log_path, "192.168.0.7:40124");
    conductor.do_work();

    assert_eq!(subscription.image_count(), 1);
    assert_eq!(*available.lock().unwrap(), vec![900]);
    let image = &subscription.images()[0];
    assert_eq!(image.session_id(), -5);
    assert_eq!(image.source_identity(), "192.168.0.7:40124");
    assert_eq!(image.subscription_registration_id(), correlation_id);

    driver.image_unavailable(900, correlation_id);
    conductor.do_work();

    assert_eq!(subscription.image_count(), 0);
    assert_eq!(*unavailable.lock().unwrap(), vec![900]);
    assert_eq!(conductor.lingering_count(), 1, "log lingers before release");

    std::thread::sleep(Duration::from_millis(50));
    conductor.do_work();
    assert_eq!(conductor.lingering_count(), 0, "linger deadline passed");

    conductor.release_all().expect("release");
    let _ = std::fs::remove_file(&cnc_path);
    let _ = std::fs::remove_file(&log_path);
}

#[test]
fn registration_times_out_then_entry_is_removed() {
    let cnc_path = unique_path("timeout", 0);
    let _driver = FakeDriver::create(&cnc_path, Duration::from_secs(3600));

    let context = Context {
        cnc_file_name: cnc_path.clone(),
        media_driver_timeout: Duration::from_millis(30),
        ..Context::default()
    };
    let conductor = manual_conductor(&cnc_path, &context);

    let correlation_id = conductor.add_publication("basalt:ipc", 5).expect("add");
    assert!(conductor.find_publication(correlation_id).unwrap().is_none());

    std::thread::sleep(Duration::from_millis(50));
    conductor.do_work();

    let err = conductor.find_publication(correlation_id).expect_err("timed out");
    assert!(matches!(err, ClientError::DriverTimeout));

    // Terminal outcome observed once; the entry is gone.
    assert!(conductor.find_publication(correlation_id).unwrap().is_none());

    let _ = std::fs::remove_file(&cnc_path);
}

#[test]
fn driver_error_resolves_registration_as_errored() {
    let cnc_path = unique_path("error", 0);
    let mut driver = FakeDriver::create(&cnc_path, Duration::from_secs(3600));

    let context = Context {
        cnc_file_name: cnc_path.clone(),
        ..Context::default()
    };
    let conductor = manual_conductor(&cnc_path, &context);

    let correlation_id = conductor.add_publication("basalt:bogus", 5).expect("add");
    driver.error_response(correlation_id, 11, "channel unknown");
    conductor.do_work();

    let err = conductor.find_publication(correlation_id).expect_err("errored");
    assert!(matches!(
        err,
        ClientError::Registration { code: 11, ref message } if message == "channel unknown"
    ));
    assert!(conductor.find_publication(correlation_id).unwrap().is_none());

    let _ = std::fs::remove_file(&cnc_path);
}

#[test]
fn stale_driver_heartbeat_terminates_the_conductor() {
    let cnc_path = unique_path("liveness", 0);
    let log_path = unique_path("liveness_log", 1);
    let mut driver = FakeDriver::create(&cnc_path, Duration::from_millis(100));
    seed_log(&log_path, 65536);

    let errors: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let context = Context {
        cnc_file_name: cnc_path.clone(),
        error_handler: {
            let errors = Arc::clone(&errors);
            Arc::new(move |err| errors.lock().unwrap().push(err.to_string()))
        },
        ..Context::default()
    };
    let conductor = manual_conductor(&cnc_path, &context);

    // Establish an active publication first.
    let correlation_id = conductor.add_publication("basalt:ipc", 5).expect("add");
    driver.publication_ready(correlation_id, 7, 1, 5, &log_path);
    conductor.do_work();
    assert!(conductor.find_publication(correlation_id).unwrap().is_some());

    // Heartbeat far in the past: liveness gap exceeds the CnC timeout.
    driver.heartbeat(epoch_ms() - 10_000);
    conductor.do_work();

    assert!(conductor.is_terminated());
    assert!(errors
        .lock()
        .unwrap()
        .iter()
        .any(|e| e.contains("unresponsive")));

    // Every subsequent operation fails with DriverTimeout.
    assert!(matches!(
        conductor.add_publication("basalt:ipc", 6),
        Err(ClientError::DriverTimeout)
    ));
    assert!(matches!(
        conductor.find_publication(correlation_id),
        Err(ClientError::DriverTimeout)
    ));

    let _ = std::fs::remove_file(&cnc_path);
    let _ = std::fs::remove_file(&log_path);
}

#[test]
fn log_buffers_shared_reference_survives_conductor_release() {
    // A user-held publication keeps its log mapping alive after the
    // conductor registry drops it.
    let log_path = unique_path("shared_log", 0);
    seed_log(&log_path, 65536);

    let log = Arc::new(LogBuffers::map(&log_path).expect("map"));
    let user_reference = Arc::clone(&log);
    drop(log);

    assert_eq!(user_reference.term_length(), 65536);
    assert_eq!(user_reference.meta().unwrap().term_length().unwrap(), 65536);

    drop(user_reference);
    let _ = std::fs::remove_file(&log_path);
}
