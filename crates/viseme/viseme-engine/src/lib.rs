//! Consumer drain loop for the phoneme segment.
//!
//! ```text
//! Disconnected ──> Attaching ──> Streaming ──> ShuttingDown ──> Closed
//!                      │                                          ^
//!                      └──────── retry budget exhausted ──────────┘
//! ```
//!
//! The engine attaches to a segment created by the TTS producer, drains it
//! in slot order, fans valid phonemes out to its [`SubscriberRegistry`] and
//! stops when the producer raises the shutdown flag or a [`StopHandle`] is
//! triggered. The mapping is owned by a local [`PhonemeReader`], so it is
//! released on every way out of [`VisemeEngine::run`], unwinding included.

use phonos_icc::{AttachError, PhonemeReader, ReadOutcome};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use viseme_config::VisemeConfig;
use viseme_core::{StopHandle, SubscriberRegistry};

/// Longest single sleep while waiting between attach attempts, so a stop
/// request is noticed promptly.
const ATTACH_STOP_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    Disconnected,
    Attaching,
    Streaming,
    ShuttingDown,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The producer set the shutdown flag and everything it wrote was drained.
    ProducerShutdown,
    /// A [`StopHandle`] was triggered.
    StopRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub emitted: u64,
    pub skipped: u64,
    pub exit: ExitReason,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("could not attach to phoneme segment after {attempts} attempts")]
    AttachExhausted {
        attempts: u32,
        #[source]
        source: AttachError,
    },
}

/// What one streaming iteration saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollOutcome {
    pub emitted: usize,
    pub skipped: usize,
    /// `write_index` observed at the start of the iteration.
    pub write_index: u32,
    pub shutdown: bool,
    /// Draining stopped early on a slot that could not be decoded.
    pub stalled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub segment_path: PathBuf,
    /// Total attach attempts before giving up.
    pub attach_retries: u32,
    pub attach_interval: Duration,
    pub poll_interval: Duration,
}

impl From<&VisemeConfig> for EngineSettings {
    fn from(cfg: &VisemeConfig) -> Self {
        Self {
            segment_path: cfg.segment_path(),
            attach_retries: cfg.attach_retries,
            attach_interval: cfg.attach_interval(),
            poll_interval: cfg.poll_interval(),
        }
    }
}

pub struct VisemeEngine {
    settings: EngineSettings,
    subscribers: Arc<SubscriberRegistry>,
    stop: StopHandle,
    state: DrainState,
    emitted: u64,
    skipped: u64,
}

impl VisemeEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self::with_parts(settings, Arc::new(SubscriberRegistry::new()), StopHandle::new())
    }

    pub fn with_parts(
        settings: EngineSettings,
        subscribers: Arc<SubscriberRegistry>,
        stop: StopHandle,
    ) -> Self {
        Self {
            settings,
            subscribers,
            stop,
            state: DrainState::Disconnected,
            emitted: 0,
            skipped: 0,
        }
    }

    pub fn subscribers(&self) -> &Arc<SubscriberRegistry> {
        &self.subscribers
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn state(&self) -> DrainState {
        self.state
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Runs [`run`](Self::run) on a dedicated thread.
    pub fn spawn(mut self) -> io::Result<JoinHandle<Result<RunSummary, EngineError>>> {
        std::thread::Builder::new()
            .name("viseme-drain".into())
            .spawn(move || self.run())
    }

    /// Attaches, drains until shutdown or stop, and releases the segment.
    ///
    /// # Errors
    /// [`EngineError::AttachExhausted`] when the segment could not be
    /// attached within the retry budget. Nothing else is fatal.
    pub fn run(&mut self) -> Result<RunSummary, EngineError> {
        self.emitted = 0;
        self.skipped = 0;
        self.transition(DrainState::Disconnected);
        self.transition(DrainState::Attaching);

        let reader = match self.attach() {
            Ok(Some(reader)) => reader,
            Ok(None) => {
                self.transition(DrainState::Closed);
                return Ok(self.summary(ExitReason::StopRequested));
            }
            Err(e) => {
                self.transition(DrainState::Closed);
                return Err(e);
            }
        };

        self.transition(DrainState::Streaming);
        let exit = self.stream(reader);
        self.transition(DrainState::Closed);

        let summary = self.summary(exit);
        info!(
            emitted = summary.emitted,
            skipped = summary.skipped,
            exit = ?summary.exit,
            "drain loop finished"
        );
        Ok(summary)
    }

    /// Tries to attach up to `attach_retries` times. `Ok(None)` means a stop
    /// was requested while waiting.
    fn attach(&self) -> Result<Option<PhonemeReader>, EngineError> {
        let path = &self.settings.segment_path;
        let attempts = self.settings.attach_retries.max(1);

        let mut attempt = 1;
        loop {
            if self.stop.is_stopped() {
                return Ok(None);
            }
            match PhonemeReader::attach(path) {
                Ok(reader) => {
                    info!(
                        path = %path.display(),
                        cursor = reader.cursor(),
                        attempt,
                        "attached to phoneme segment"
                    );
                    return Ok(Some(reader));
                }
                Err(source) if attempt >= attempts => {
                    warn!(
                        path = %path.display(),
                        attempts,
                        error = %source,
                        "giving up on phoneme segment"
                    );
                    return Err(EngineError::AttachExhausted { attempts, source });
                }
                Err(e) => {
                    debug!(
                        path = %path.display(),
                        attempt,
                        attempts,
                        error = %e,
                        "phoneme segment not ready, retrying"
                    );
                }
            }
            attempt += 1;
            if !self.sleep_unless_stopped(self.settings.attach_interval) {
                return Ok(None);
            }
        }
    }

    /// Sleeps for `total`, returning false early if a stop is requested.
    fn sleep_unless_stopped(&self, total: Duration) -> bool {
        let deadline = Instant::now() + total;
        loop {
            if self.stop.is_stopped() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(ATTACH_STOP_POLL));
        }
    }

    /// The `Streaming` state. Takes the reader by value so the segment is
    /// unmapped when this returns or unwinds.
    fn stream(&mut self, mut reader: PhonemeReader) -> ExitReason {
        loop {
            if self.stop.is_stopped() {
                self.transition(DrainState::ShuttingDown);
                return ExitReason::StopRequested;
            }

            let polled = self.poll_events(&mut reader);

            if polled.shutdown {
                self.transition(DrainState::ShuttingDown);
                if polled.stalled {
                    warn!(
                        undrained = reader.pending(),
                        "producer shut down with undecodable slots left"
                    );
                } else {
                    info!("producer signalled shutdown");
                }
                return ExitReason::ProducerShutdown;
            }

            reader.wait(polled.write_index, self.settings.poll_interval);
        }
    }

    /// One streaming iteration: read the header, then drain every slot up to
    /// the observed `write_index`, emitting valid phonemes in order.
    pub fn poll_events(&mut self, reader: &mut PhonemeReader) -> PollOutcome {
        let snap = reader.snapshot();
        if snap.read_index != reader.cursor() {
            debug!(
                header = snap.read_index,
                cursor = reader.cursor(),
                "header read_index differs from local cursor"
            );
        }

        let mut out = PollOutcome {
            write_index: snap.write_index,
            shutdown: snap.shutdown,
            ..PollOutcome::default()
        };

        loop {
            match reader.try_read_upto(snap.write_index) {
                Ok(ReadOutcome::Empty) => break,
                Ok(ReadOutcome::Event(ev)) => {
                    self.subscribers.publish(&ev);
                    out.emitted += 1;
                }
                Ok(ReadOutcome::Skipped(invalid)) => {
                    warn!(
                        phoneme_id = invalid.phoneme_id,
                        duration_seconds = invalid.duration_seconds,
                        "skipping phoneme with invalid duration"
                    );
                    out.skipped += 1;
                }
                Err(e) => {
                    debug!(
                        cursor = reader.cursor(),
                        error = %e,
                        "slot not readable yet, retrying next poll"
                    );
                    out.stalled = true;
                    break;
                }
            }
        }

        self.emitted += out.emitted as u64;
        self.skipped += out.skipped as u64;
        out
    }

    fn transition(&mut self, next: DrainState) {
        if self.state != next {
            info!(from = ?self.state, to = ?next, "drain state");
            self.state = next;
        }
    }

    fn summary(&self, exit: ExitReason) -> RunSummary {
        RunSummary {
            emitted: self.emitted,
            skipped: self.skipped,
            exit,
        }
    }
}
