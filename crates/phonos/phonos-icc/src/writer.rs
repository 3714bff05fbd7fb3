//! Producer side of the phoneme queue.
//!
//! The TTS process normally owns this end; `PhonemeWriter` implements the
//! same contract so the consumer can be driven by the demo producer, tests
//! and benches.
//!
//! # Contract
//! - A record is fully written before `write_index` moves past it (Release).
//! - `write_index` never advances onto the consumer's `read_index`: at most
//!   `USABLE_SLOTS` records are pending. A full ring hands the event back
//!   instead of overwriting.
//! - `shutdown_flag` is the last store; `write_index` is frozen afterwards
//!   so the consumer can finish draining.

use crate::codec::encode_record;
use crate::error::PublishError;
use crate::ring::{advance, free_slots, is_full, pending_count, slot_index};
use crate::shm_layout::{PhonemeQueueHeader, RECORD_SIZE, SEGMENT_SIZE, record_offset};
use crate::wake::wake_all;
use phonos_events::PhonemeEvent;
use phonos_mmap::MmapFileMut;
use std::io;
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// How often a blocked `publish` re-checks the consumer's progress.
const BACKPRESSURE_POLL: Duration = Duration::from_micros(200);

/// The producer side of the phoneme queue. Single producer per segment.
pub struct PhonemeWriter {
    /// Owns the mmap lifetime; kept alive but not directly accessed after init.
    _mm: MmapFileMut,
    /// Start of the mapped region (header location).
    base: *mut u8,
    /// Local copy of `write_index`; only this writer stores it.
    write_index: u32,
    path: PathBuf,
    shut_down: bool,
}

// SAFETY: the raw pointer targets the mapping owned by `_mm`, which moves
// with the writer.
unsafe impl Send for PhonemeWriter {}

impl PhonemeWriter {
    /// Creates (or truncates) the segment at `path` with a zeroed header.
    ///
    /// # Errors
    /// Returns an error if file creation or memory mapping fails.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut mm = MmapFileMut::create_rw(&path, SEGMENT_SIZE as u64)?;
        let base = mm.as_mut_ptr();

        // `set_len` on a truncated file already yields zeroes; write them
        // anyway so reusing a live segment starts from a clean header.
        // SAFETY: the mapping is at least SEGMENT_SIZE bytes.
        unsafe { ptr::write_bytes(base, 0, SEGMENT_SIZE) };

        info!(path = %path.display(), bytes = SEGMENT_SIZE, "created phoneme segment");

        Ok(Self {
            _mm: mm,
            base,
            write_index: 0,
            path,
            shut_down: false,
        })
    }

    #[inline(always)]
    fn header(&self) -> &PhonemeQueueHeader {
        // SAFETY: base points to the header we zero-initialized in `create`.
        unsafe { &*(self.base as *const PhonemeQueueHeader) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Slot the next record will go to.
    #[inline]
    pub fn write_index(&self) -> u32 {
        self.write_index
    }

    /// The consumer's persisted cursor.
    #[inline]
    pub fn read_index(&self) -> u32 {
        slot_index(self.header().read_index.load(Ordering::Acquire))
    }

    /// Records written but not yet drained by the consumer.
    #[inline]
    pub fn pending(&self) -> u32 {
        pending_count(self.write_index, self.read_index())
    }

    /// Records that can still be published before the ring is full.
    #[inline]
    pub fn free_slots(&self) -> u32 {
        free_slots(self.write_index, self.read_index())
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Enqueues `event` without waiting.
    ///
    /// # Errors
    /// - [`PublishError::Full`] if the consumer has not freed a slot; the
    ///   event is dropped unless the caller retries.
    /// - [`PublishError::ShutDown`] after [`shutdown`](Self::shutdown).
    pub fn try_publish(&mut self, event: PhonemeEvent) -> Result<(), PublishError> {
        if self.shut_down {
            return Err(PublishError::ShutDown(event));
        }
        if is_full(self.write_index, self.read_index()) {
            return Err(PublishError::Full(event));
        }

        let mut rec = [0u8; RECORD_SIZE];
        encode_record(&event, &mut rec);
        let off = record_offset(self.write_index);
        // SAFETY: write_index < RING_CAPACITY, so the record lies inside the
        // mapping; the consumer does not read this slot until write_index
        // moves past it.
        unsafe { ptr::copy_nonoverlapping(rec.as_ptr(), self.base.add(off), RECORD_SIZE) };

        let next = advance(self.write_index);
        self.header().write_index.store(next, Ordering::Release);
        self.write_index = next;
        wake_all(&self.header().write_index);
        Ok(())
    }

    /// Enqueues `event`, waiting up to `timeout` for the consumer to free a
    /// slot when the ring is full.
    ///
    /// # Errors
    /// Same as [`try_publish`](Self::try_publish); `Full` means the wait
    /// timed out.
    pub fn publish(&mut self, event: PhonemeEvent, timeout: Duration) -> Result<(), PublishError> {
        let deadline = Instant::now() + timeout;
        let mut event = event;
        loop {
            match self.try_publish(event) {
                Err(PublishError::Full(ev)) if Instant::now() < deadline => {
                    event = ev;
                    std::thread::sleep(BACKPRESSURE_POLL);
                }
                other => return other,
            }
        }
    }

    /// Sets the shutdown flag. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        let h = self.header();
        h.shutdown_flag.store(true, Ordering::Release);
        wake_all(&h.write_index);
        debug!(write_index = self.write_index, "phoneme segment shut down");
    }

    /// Shuts down, unmaps and removes the backing file.
    pub fn unlink(mut self) -> io::Result<()> {
        self.shutdown();
        let path = self.path.clone();
        drop(self);
        std::fs::remove_file(&path)?;
        info!(path = %path.display(), "removed phoneme segment");
        Ok(())
    }
}

impl Drop for PhonemeWriter {
    fn drop(&mut self) {
        self.shutdown();
    }
}
