//! Drain loop against a real file-backed segment.

use phonos_events::PhonemeEvent;
use phonos_icc::shm_layout::{
    HEADER_SIZE, RECORD_SIZE, SHUTDOWN_FLAG_OFFSET, WRITE_INDEX_OFFSET, record_offset,
};
use phonos_icc::{PhonemeReader, PhonemeWriter, encode_record};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};
use viseme_core::{StopHandle, SubscriberRegistry};
use viseme_engine::{DrainState, EngineError, EngineSettings, ExitReason, VisemeEngine};

fn segment_path(tag: &str) -> PathBuf {
    let path = PathBuf::from(format!("/tmp/phonos_engine_{tag}_{}", std::process::id()));
    let _ = std::fs::remove_file(&path);
    path
}

fn settings(path: &PathBuf, attach_retries: u32, attach_interval: Duration) -> EngineSettings {
    EngineSettings {
        segment_path: path.clone(),
        attach_retries,
        attach_interval,
        poll_interval: Duration::from_millis(1),
    }
}

fn engine_with_channel(settings: EngineSettings) -> (VisemeEngine, Receiver<PhonemeEvent>) {
    let engine = VisemeEngine::new(settings);
    let (_id, rx) = engine.subscribers().subscribe_channel();
    (engine, rx)
}

#[test]
fn emits_valid_records_then_exits_on_producer_shutdown() {
    let path = segment_path("shutdown");
    let mut writer = PhonemeWriter::create(&path).expect("create");
    writer.try_publish(PhonemeEvent::new(1, 0.10, 10)).expect("publish");
    writer.try_publish(PhonemeEvent::new(2, 0.0, 20)).expect("publish");
    writer.try_publish(PhonemeEvent::new(3, 11.0, 30)).expect("publish");
    writer.try_publish(PhonemeEvent::new(4, 0.25, 40)).expect("publish");
    writer.shutdown();

    let (mut engine, rx) = engine_with_channel(settings(&path, 1, Duration::ZERO));
    let summary = engine.run().expect("run");

    assert_eq!(summary.exit, ExitReason::ProducerShutdown);
    assert_eq!(summary.emitted, 2);
    assert_eq!(summary.skipped, 2);
    assert_eq!(engine.state(), DrainState::Closed);

    let ids: Vec<i64> = rx.try_iter().map(|e| e.phoneme_id).collect();
    assert_eq!(ids, vec![1, 4]);
    assert_eq!(writer.read_index(), 4);
    writer.unlink().expect("unlink");
}

#[test]
fn resumes_from_persisted_read_index() {
    let path = segment_path("resume");
    let mut writer = PhonemeWriter::create(&path).expect("create");
    for id in 0..8 {
        writer.try_publish(PhonemeEvent::new(id, 0.1, id as u64)).expect("publish");
    }

    {
        let mut early = PhonemeReader::attach(&path).expect("attach");
        for _ in 0..5 {
            early.try_read().expect("read");
        }
    }
    assert_eq!(writer.read_index(), 5);
    writer.shutdown();

    let (mut engine, rx) = engine_with_channel(settings(&path, 1, Duration::ZERO));
    let summary = engine.run().expect("run");

    let ids: Vec<i64> = rx.try_iter().map(|e| e.phoneme_id).collect();
    assert_eq!(ids, vec![5, 6, 7]);
    assert_eq!(summary.emitted, 3);
    writer.unlink().expect("unlink");
}

#[test]
fn concurrent_producer_wraps_the_ring_in_order() {
    const COUNT: i64 = 1025;
    let path = segment_path("wrap");
    let writer = PhonemeWriter::create(&path).expect("create");

    let (engine, rx) = engine_with_channel(settings(&path, 1, Duration::ZERO));
    let draining = engine.spawn().expect("spawn");

    let producing = std::thread::spawn(move || {
        let mut writer = writer;
        for id in 0..COUNT {
            writer
                .publish(PhonemeEvent::new(id, 0.05, id as u64), Duration::from_secs(5))
                .expect("publish");
        }
        writer.shutdown();
        writer
    });

    let writer = producing.join().expect("producer thread");
    let summary = draining.join().expect("drain thread").expect("run");

    assert_eq!(summary.exit, ExitReason::ProducerShutdown);
    assert_eq!(summary.emitted, COUNT as u64);
    let ids: Vec<i64> = rx.try_iter().map(|e| e.phoneme_id).collect();
    assert_eq!(ids, (0..COUNT).collect::<Vec<_>>());
    assert_eq!(writer.read_index(), (COUNT % 1024) as u32);
    writer.unlink().expect("unlink");
}

#[test]
fn gives_up_after_attach_budget() {
    let path = segment_path("missing");
    let mut engine = VisemeEngine::new(settings(&path, 3, Duration::from_millis(5)));

    match engine.run() {
        Err(EngineError::AttachExhausted { attempts, source }) => {
            assert_eq!(attempts, 3);
            assert!(source.is_not_found());
        }
        other => panic!("expected AttachExhausted, got {other:?}"),
    }
    assert_eq!(engine.state(), DrainState::Closed);
}

#[test]
fn attaches_to_a_segment_created_late() {
    let path = segment_path("late");
    let (engine, rx) = engine_with_channel(settings(&path, 50, Duration::from_millis(20)));
    let draining = engine.spawn().expect("spawn");

    std::thread::sleep(Duration::from_millis(60));
    let mut writer = PhonemeWriter::create(&path).expect("create");
    writer.try_publish(PhonemeEvent::new(9, 0.2, 1)).expect("publish");
    writer.shutdown();

    let summary = draining.join().expect("drain thread").expect("run");
    assert_eq!(summary.emitted, 1);
    assert_eq!(rx.try_iter().map(|e| e.phoneme_id).collect::<Vec<_>>(), vec![9]);
    writer.unlink().expect("unlink");
}

#[test]
fn stop_request_ends_streaming() {
    let path = segment_path("stop");
    let mut writer = PhonemeWriter::create(&path).expect("create");
    writer.try_publish(PhonemeEvent::new(1, 0.1, 0)).expect("publish");

    let stop = StopHandle::new();
    let engine = VisemeEngine::with_parts(
        settings(&path, 1, Duration::ZERO),
        Arc::new(SubscriberRegistry::new()),
        stop.clone(),
    );
    let (_id, rx) = engine.subscribers().subscribe_channel();
    let draining = engine.spawn().expect("spawn");

    let first = rx.recv_timeout(Duration::from_secs(5)).expect("first phoneme");
    assert_eq!(first.phoneme_id, 1);
    stop.stop();

    let summary = draining.join().expect("drain thread").expect("run");
    assert_eq!(summary.exit, ExitReason::StopRequested);
    assert!(!writer.is_shut_down());
    writer.unlink().expect("unlink");
}

#[test]
fn stop_during_attach_is_not_an_error() {
    let path = segment_path("stop_attach");
    let engine = VisemeEngine::new(settings(&path, 1_000, Duration::from_millis(50)));
    let stop = engine.stop_handle();
    let draining = engine.spawn().expect("spawn");

    std::thread::sleep(Duration::from_millis(30));
    stop.stop();

    let summary = draining.join().expect("drain thread").expect("run");
    assert_eq!(summary.exit, ExitReason::StopRequested);
    assert_eq!(summary.emitted, 0);
}

#[test]
fn shutdown_with_undecodable_tail_still_exits() {
    // Two whole records, ten bytes of a third, producer already shut down.
    let path = segment_path("short_shutdown");
    let mut bytes = vec![0u8; HEADER_SIZE + 2 * RECORD_SIZE + 10];
    bytes[WRITE_INDEX_OFFSET..WRITE_INDEX_OFFSET + 4].copy_from_slice(&3u32.to_le_bytes());
    bytes[SHUTDOWN_FLAG_OFFSET] = 1;
    for slot in 0..2u32 {
        let mut rec = [0u8; RECORD_SIZE];
        encode_record(&PhonemeEvent::new(slot as i64 + 10, 0.1, 0), &mut rec);
        let off = record_offset(slot);
        bytes[off..off + RECORD_SIZE].copy_from_slice(&rec);
    }
    std::fs::write(&path, &bytes).expect("write");

    let (engine, rx) = engine_with_channel(settings(&path, 1, Duration::ZERO));
    let draining = engine.spawn().expect("spawn");

    let deadline = Instant::now() + Duration::from_secs(5);
    while !draining.is_finished() {
        assert!(Instant::now() < deadline, "drain loop hung on the truncated slot");
        std::thread::sleep(Duration::from_millis(5));
    }

    let summary = draining.join().expect("drain thread").expect("run");
    assert_eq!(summary.exit, ExitReason::ProducerShutdown);
    assert_eq!(summary.emitted, 2);
    assert_eq!(rx.try_iter().map(|e| e.phoneme_id).collect::<Vec<_>>(), vec![10, 11]);
    let _ = std::fs::remove_file(&path);
}
