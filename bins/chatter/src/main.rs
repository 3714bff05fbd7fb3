use anyhow::Context;
use chatter_config::ChatterConfig;
use phonos_events::PhonemeEvent;
use phonos_icc::{PhonemeWriter, PublishError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Size of the synthetic phoneme inventory.
const PHONEME_SET: i64 = 40;

fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Deterministic 40..=200 ms durations so a listener sees some variety.
fn synthetic(seq: u64) -> PhonemeEvent {
    let id = (seq % PHONEME_SET as u64) as i64;
    let ms = 40 + (seq * 37 % 161) as u32;
    PhonemeEvent::new(id, ms as f32 / 1000.0, now_us())
}

fn main() -> anyhow::Result<()> {
    let cfg = match std::env::args().nth(1) {
        Some(path) => {
            ChatterConfig::load(path.as_str()).with_context(|| format!("loading {path}"))?
        }
        None => ChatterConfig::default(),
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || interrupted.store(true, Ordering::Release))
            .context("installing signal handler")?;
    }

    let path = cfg.segment_path();
    let mut writer = PhonemeWriter::create(&path)
        .with_context(|| format!("creating {}", path.display()))?;
    info!(path = %path.display(), count = cfg.phoneme_count, "publishing phonemes");

    let interval = cfg.publish_interval();
    let timeout = cfg.publish_timeout();
    let mut seq: u64 = 0;
    let mut dropped: u64 = 0;
    let mut last = Instant::now();
    let mut window: u64 = 0;

    let unbounded = cfg.phoneme_count == 0;
    while !interrupted.load(Ordering::Acquire) && (unbounded || seq < cfg.phoneme_count) {
        match writer.publish(synthetic(seq), timeout) {
            Ok(()) => window += 1,
            Err(PublishError::ShutDown(_)) => break,
            Err(full) => {
                dropped += 1;
                let ev = full.into_event();
                warn!(
                    phoneme_id = ev.phoneme_id,
                    pending = writer.pending(),
                    "queue full, dropping phoneme"
                );
            }
        }
        seq += 1;

        if last.elapsed() >= Duration::from_secs(1) {
            info!(
                rate = window,
                pending = writer.pending(),
                free = writer.free_slots(),
                "publish rate (ev/s)"
            );
            window = 0;
            last = Instant::now();
        }
        if !interval.is_zero() {
            std::thread::sleep(interval);
        }
    }

    writer.shutdown();
    info!(published = seq - dropped, dropped, "producer shut down");

    if cfg.unlink_on_exit {
        writer.unlink().with_context(|| format!("unlinking {}", path.display()))?;
    }
    Ok(())
}
