//! Two-process end-to-end test for the MPSC command ring.
//!
//! Spawns two independent writer processes that push tagged records into a
//! file-backed ring while this process consumes them concurrently, the same
//! self-spawning pattern used for the broadcast bus: the test executable is
//! re-invoked with a role selected through environment variables.
//!
//! Validates, across real process boundaries:
//! - multiple producers serialise through the CAS claim without loss
//! - per-producer FIFO order survives contention and wrap padding
//! - back-pressured writers make progress once the consumer drains

use std::env;
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use basalt_buffers::{AlignedBuffer, AtomicBuffer};
use basalt_icc::descriptor::RING_TRAILER_LENGTH;
use basalt_icc::{IccError, ManyToOneRingBuffer};
use basalt_mmap::MmapFileMut;

macro_rules! log {
    ($($arg:tt)*) => {{
        let _ = writeln!(std::io::stderr(), $($arg)*);
        let _ = std::io::stderr().flush();
    }};
}

const ENV_ROLE: &str = "BASALT_E2E_ROLE";
const ENV_PATH: &str = "BASALT_E2E_PATH";
const ENV_PRODUCER_ID: &str = "BASALT_E2E_PRODUCER";

const RING_CAPACITY: usize = 4096;
const RECORDS_PER_PRODUCER: i64 = 50_000;
const PRODUCER_COUNT: i64 = 2;

fn test_path() -> String {
    format!("/tmp/basalt_e2e_ring_{}", std::process::id())
}

fn map_ring(path: &str) -> (MmapFileMut, ManyToOneRingBuffer) {
    let mut mm = MmapFileMut::open_rw(path).expect("failed to map ring file");
    // SAFETY: the file was sized to capacity + trailer by the orchestrator
    // and mmap bases are page aligned.
    let buffer = unsafe { AtomicBuffer::wrap(mm.as_mut_ptr(), mm.len()) };
    let ring = ManyToOneRingBuffer::wrap(buffer).expect("invalid ring region");
    (mm, ring)
}

/// Writer child: publishes `RECORDS_PER_PRODUCER` records of
/// `{producer_id: i64, sequence: i64}`, spinning through back-pressure.
fn run_writer(path: &str, producer_id: i64) {
    let (_mm, ring) = map_ring(path);
    let mut src = AlignedBuffer::with_capacity(16);
    let buf = src.buffer();

    log!("[WRITER {producer_id}] publishing {RECORDS_PER_PRODUCER} records");

    let deadline = Instant::now() + Duration::from_secs(30);
    for sequence in 0..RECORDS_PER_PRODUCER {
        buf.put_i64(0, producer_id).unwrap();
        buf.put_i64(8, sequence).unwrap();

        loop {
            match ring.write(1, &buf, 0, 16) {
                Ok(_) => break,
                Err(IccError::BackPressured) => {
                    assert!(Instant::now() < deadline, "consumer never drained");
                    std::hint::spin_loop();
                }
                Err(e) => panic!("[WRITER {producer_id}] write failed: {e}"),
            }
        }
    }

    log!("[WRITER {producer_id}] done");
}

#[test]
fn e2e_two_producer_ring() {
    if let Ok(role) = env::var(ENV_ROLE) {
        let path = env::var(ENV_PATH).expect("BASALT_E2E_PATH not set");
        match role.as_str() {
            "writer" => {
                let id: i64 = env::var(ENV_PRODUCER_ID).expect("producer id").parse().unwrap();
                run_writer(&path, id);
            }
            other => panic!("Unknown role: {other}"),
        }
        return;
    }

    let path = test_path();
    let exe = env::current_exe().expect("current executable");

    MmapFileMut::create_rw(&path, (RING_CAPACITY + RING_TRAILER_LENGTH) as u64)
        .expect("failed to create ring file");

    log!("[ORCHESTRATOR] ring at {path}, spawning {PRODUCER_COUNT} writers");

    let mut writers = Vec::new();
    for id in 0..PRODUCER_COUNT {
        let child = Command::new(&exe)
            .arg("--exact")
            .arg("e2e_two_producer_ring")
            .env(ENV_ROLE, "writer")
            .env(ENV_PATH, &path)
            .env(ENV_PRODUCER_ID, id.to_string())
            .stderr(Stdio::inherit())
            .spawn()
            .expect("failed to spawn writer");
        writers.push(child);
    }

    let (_mm, ring) = map_ring(&path);
    let expected = RECORDS_PER_PRODUCER * PRODUCER_COUNT;
    let mut next_sequence = vec![0i64; PRODUCER_COUNT as usize];
    let mut received = 0i64;

    let deadline = Instant::now() + Duration::from_secs(60);
    while received < expected {
        let drained = ring
            .read(
                |msg_type, buffer, offset, length| {
                    assert_eq!(msg_type, 1);
                    assert_eq!(length, 16);
                    let producer = buffer.get_i64(offset).unwrap();
                    let sequence = buffer.get_i64(offset + 8).unwrap();
                    let expected_seq = &mut next_sequence[producer as usize];
                    assert_eq!(sequence, *expected_seq, "producer {producer} out of order");
                    *expected_seq += 1;
                },
                64,
            )
            .expect("read failed");

        received += drained as i64;
        if drained == 0 {
            assert!(Instant::now() < deadline, "timed out at {received}/{expected}");
            std::hint::spin_loop();
        }
    }

    for mut child in writers {
        let status = child.wait().expect("wait for writer");
        assert!(status.success(), "writer failed: {status}");
    }

    assert_eq!(received, expected);
    for seq in &next_sequence {
        assert_eq!(*seq, RECORDS_PER_PRODUCER);
    }

    let _ = std::fs::remove_file(&path);
    log!("[ORCHESTRATOR] {received} records, per-producer FIFO preserved");
}
