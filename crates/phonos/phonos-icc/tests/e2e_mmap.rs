//! End-to-end two-process integration test for the phoneme queue.
//!
//! # Overview
//!
//! The same test executable is spawned twice with a role in the
//! environment: a producer that creates the segment and publishes phonemes,
//! and a consumer that attaches and drains them **concurrently**.
//!
//! ```text
//!                    Time -->
//!
//! [Producer] ----[create]----[publish...(blocks when full)]----[shutdown]
//!                   |              |    |    |                     |
//!                   v              v    v    v                     v
//!               [segment]      (read_index frees slots)      (final drain)
//!                   |              ^    ^    ^                     |
//!                   v              |    |    |                     v
//! [Consumer] -----[attach]--------[drain...]-----------------------[exit]
//! ```
//!
//! The event count is far larger than the ring, so the run only completes
//! if the consumer's persisted `read_index` is seen by the producer across
//! the process boundary. Every 97th phoneme carries an invalid duration and
//! must be skipped without stalling the stream.
//!
//! # Running the Test
//!
//! ```bash
//! cargo test -p phonos-icc --test e2e_mmap -- --nocapture
//! ```

use std::env;
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Writes to stderr with immediate flush to bypass test output capture.
macro_rules! log {
    ($($arg:tt)*) => {{
        let _ = writeln!(std::io::stderr(), $($arg)*);
        let _ = std::io::stderr().flush();
    }};
}

/// Environment variable used to signal the role of a spawned process.
const ENV_ROLE: &str = "PHONOS_E2E_ROLE";
const ENV_PATH: &str = "PHONOS_E2E_PATH";

const ROLE_PRODUCER: &str = "producer";
const ROLE_CONSUMER: &str = "consumer";

/// Number of phonemes to publish, roughly 20 laps of the ring.
const EVENT_COUNT: i64 = 20_000;

/// Every `INVALID_EVERY`-th phoneme has a zero duration.
const INVALID_EVERY: i64 = 97;

const POLL_INTERVAL: Duration = Duration::from_millis(1);

fn test_path() -> String {
    let pid = std::process::id();
    format!("/tmp/phonos_e2e_queue_{pid}")
}

fn duration_for(i: i64) -> f32 {
    if i % INVALID_EVERY == 0 { 0.0 } else { 0.05 }
}

fn expected_valid() -> u64 {
    (0..EVENT_COUNT).filter(|i| i % INVALID_EVERY != 0).count() as u64
}

fn run_producer(path: &str) {
    use phonos_events::PhonemeEvent;
    use phonos_icc::PhonemeWriter;

    log!("[PRODUCER] Creating segment at {path}");
    let mut writer = PhonemeWriter::create(path).expect("producer: failed to create segment");

    let start = Instant::now();
    for i in 0..EVENT_COUNT {
        let ev = PhonemeEvent::new(i, duration_for(i), i as u64);
        writer
            .publish(ev, Duration::from_secs(10))
            .expect("producer: consumer stopped draining");
    }
    writer.shutdown();

    log!("[PRODUCER] Published {EVENT_COUNT} phonemes in {:?}", start.elapsed());
}

fn run_consumer(path: &str) {
    use phonos_icc::{PhonemeReader, ReadOutcome};

    log!("[CONSUMER] Waiting for segment at {path}");

    let open_deadline = Instant::now() + Duration::from_secs(5);
    let mut reader = loop {
        match PhonemeReader::attach(path) {
            Ok(r) => break r,
            Err(_) if Instant::now() < open_deadline => {
                std::thread::sleep(Duration::from_millis(1));
            }
            Err(e) => panic!("[CONSUMER] Failed to attach: {e}"),
        }
    };
    log!("[CONSUMER] Attached, cursor at {}", reader.cursor());

    let run_deadline = Instant::now() + Duration::from_secs(30);
    let mut emitted: u64 = 0;
    let mut skipped: u64 = 0;
    let mut next_expected: i64 = 0;

    loop {
        assert!(Instant::now() < run_deadline, "[CONSUMER] timed out");

        let snap = reader.snapshot();
        loop {
            match reader.try_read_upto(snap.write_index) {
                Ok(ReadOutcome::Empty) => break,
                Ok(ReadOutcome::Event(ev)) => {
                    assert_eq!(ev.phoneme_id, next_expected, "out of order");
                    next_expected += 1;
                    emitted += 1;
                }
                Ok(ReadOutcome::Skipped(bad)) => {
                    assert_eq!(bad.phoneme_id % INVALID_EVERY, 0);
                    assert_eq!(bad.phoneme_id, next_expected);
                    next_expected += 1;
                    skipped += 1;
                }
                Err(e) => panic!("[CONSUMER] full segment must not truncate: {e}"),
            }
        }

        if snap.shutdown {
            break;
        }
        reader.wait(snap.write_index, POLL_INTERVAL);
    }

    log!("[CONSUMER] Emitted {emitted}, skipped {skipped}");
    assert_eq!(emitted, expected_valid());
    assert_eq!(emitted + skipped, EVENT_COUNT as u64);
}

#[test]
fn e2e_two_process_phoneme_queue() {
    if let Ok(role) = env::var(ENV_ROLE) {
        let path = env::var(ENV_PATH).expect("PHONOS_E2E_PATH not set");
        match role.as_str() {
            ROLE_PRODUCER => run_producer(&path),
            ROLE_CONSUMER => run_consumer(&path),
            other => panic!("Unknown role: {other}"),
        }
        return;
    }

    let path = test_path();
    let exe = env::current_exe().expect("Failed to get current executable path");

    log!("[ORCHESTRATOR] Spawning producer...");
    let mut producer = Command::new(&exe)
        .arg("--exact")
        .arg("e2e_two_process_phoneme_queue")
        .env(ENV_ROLE, ROLE_PRODUCER)
        .env(ENV_PATH, &path)
        .stderr(Stdio::inherit())
        .spawn()
        .expect("Failed to spawn producer process");

    std::thread::sleep(Duration::from_millis(5));

    log!("[ORCHESTRATOR] Spawning consumer...");
    let mut consumer = Command::new(&exe)
        .arg("--exact")
        .arg("e2e_two_process_phoneme_queue")
        .env(ENV_ROLE, ROLE_CONSUMER)
        .env(ENV_PATH, &path)
        .stderr(Stdio::inherit())
        .spawn()
        .expect("Failed to spawn consumer process");

    let producer_status = producer.wait().expect("Failed to wait for producer");
    let consumer_status = consumer.wait().expect("Failed to wait for consumer");

    let _ = std::fs::remove_file(&path);

    assert!(producer_status.success(), "Producer failed: {producer_status}");
    assert!(consumer_status.success(), "Consumer failed: {consumer_status}");
}
