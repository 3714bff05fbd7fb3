//! Consumer side of the phoneme queue.
//!
//! `PhonemeReader` attaches to a segment someone else created, keeps a local
//! read cursor and persists it into the header's `read_index` after every
//! slot so the producer can reuse it.
//!
//! # Thread Safety
//! `PhonemeReader` is `Send` but NOT `Sync`: exactly one consumer per segment.

use crate::codec::{decode_record, validate};
use crate::error::{AttachError, DecodeError, ValidationError};
use crate::ring::{advance, pending_count, slot_index};
use crate::shm_layout::{
    HEADER_SIZE, PhonemeQueueHeader, RECORD_SIZE, SEGMENT_SIZE, record_offset,
};
use crate::wake::wait_for_change;
use phonos_events::PhonemeEvent;
use phonos_mmap::MmapFileMut;
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{debug, warn};

/// One consistent look at the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderSnapshot {
    pub write_index: u32,
    pub read_index: u32,
    pub shutdown: bool,
}

/// Result of consuming one slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadOutcome {
    /// The cursor has caught up with the observed `write_index`.
    Empty,
    /// A valid record; the cursor moved past it.
    Event(PhonemeEvent),
    /// A record with an out-of-range duration; the cursor still moved past it.
    Skipped(ValidationError),
}

/// The consumer side of the phoneme queue.
pub struct PhonemeReader {
    /// Owns the mmap lifetime; dropping the reader unmaps the segment.
    _mm: MmapFileMut,
    /// Start of the mapped region (header location).
    base: *mut u8,
    /// Bytes actually mapped; may be shorter than `SEGMENT_SIZE`.
    len: usize,
    /// Local read cursor: the next slot to drain. Authoritative for this
    /// process; mirrored into the header after every advance.
    cursor: u32,
    path: PathBuf,
    /// Set once an out-of-range `write_index` has been logged.
    warned_write_index: Cell<bool>,
}

// SAFETY: the raw pointer targets the mapping owned by `_mm`, which moves
// with the reader.
unsafe impl Send for PhonemeReader {}

impl PhonemeReader {
    /// Attaches to an existing segment.
    ///
    /// The cursor resumes from the header's `read_index`, so a consumer that
    /// restarts mid-stream does not replay what it already drained.
    ///
    /// # Errors
    /// - [`AttachError::NotFound`] if the segment does not exist (yet)
    /// - [`AttachError::Io`] if it cannot be opened or mapped
    /// - [`AttachError::Undersized`] if it cannot even hold the header
    pub fn attach<P: AsRef<Path>>(path: P) -> Result<Self, AttachError> {
        let path = path.as_ref().to_path_buf();
        let mut mm =
            MmapFileMut::open_rw(&path).map_err(|e| AttachError::from_io(path.clone(), e))?;

        let len = mm.len();
        if len < HEADER_SIZE {
            return Err(AttachError::Undersized {
                path,
                len,
                needed: HEADER_SIZE,
            });
        }
        if len < SEGMENT_SIZE {
            warn!(
                path = %path.display(),
                len,
                expected = SEGMENT_SIZE,
                "segment shorter than expected, trailing slots will not decode"
            );
        }

        let base = mm.as_mut_ptr();
        // SAFETY: the mapping holds at least a full header.
        let h = unsafe { &*(base as *const PhonemeQueueHeader) };
        let raw = h.read_index.load(Ordering::Acquire);
        let cursor = slot_index(raw);
        if cursor != raw {
            warn!(raw, cursor, "read_index out of range, reduced into the ring");
        }

        debug!(path = %path.display(), cursor, "attached to phoneme segment");

        Ok(Self {
            _mm: mm,
            base,
            len,
            cursor,
            path,
            warned_write_index: Cell::new(false),
        })
    }

    #[inline(always)]
    fn header(&self) -> &PhonemeQueueHeader {
        // SAFETY: attach() checked that a full header is mapped.
        unsafe { &*(self.base as *const PhonemeQueueHeader) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Next slot this reader will drain.
    #[inline]
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Slots between the cursor and the producer's current `write_index`.
    #[inline]
    pub fn pending(&self) -> u32 {
        pending_count(self.load_write_index(), self.cursor)
    }

    #[inline(always)]
    fn load_write_index(&self) -> u32 {
        slot_index(self.header().write_index.load(Ordering::Acquire))
    }

    /// Reads the header.
    ///
    /// `shutdown_flag` is loaded before `write_index`: the producer sets the
    /// flag after its last index store, so a snapshot with `shutdown == true`
    /// carries the final `write_index`. Both indices are reduced into the
    /// ring.
    #[inline]
    pub fn snapshot(&self) -> HeaderSnapshot {
        let h = self.header();
        let shutdown = h.shutdown_flag.load(Ordering::Acquire);
        let raw_write = h.write_index.load(Ordering::Acquire);
        let write_index = slot_index(raw_write);
        if write_index != raw_write && !self.warned_write_index.replace(true) {
            warn!(
                raw = raw_write,
                write_index,
                "write_index out of range, reduced into the ring"
            );
        }
        let read_index = slot_index(h.read_index.load(Ordering::Relaxed));
        HeaderSnapshot {
            write_index,
            read_index,
            shutdown,
        }
    }

    /// Copies the slot under the cursor out of the mapping and decodes it.
    fn load_slot(&self, slot: u32) -> Result<PhonemeEvent, DecodeError> {
        let off = record_offset(slot);
        let available = self.len.saturating_sub(off).min(RECORD_SIZE);
        let mut rec = [0u8; RECORD_SIZE];
        if available > 0 {
            // SAFETY: `off + available <= len`, all inside the mapping. The
            // producer does not write a slot in [cursor, write_index).
            unsafe { ptr::copy_nonoverlapping(self.base.add(off), rec.as_mut_ptr(), available) };
        }
        decode_record(&rec[..available])
    }

    /// Consumes the slot under the cursor if it lies before `write_index`.
    ///
    /// On success the cursor advances one slot and is stored into the
    /// header's `read_index` (Release) before returning, whether the record
    /// was valid or skipped.
    ///
    /// # Errors
    /// [`DecodeError`] if the slot cannot be read in full; the cursor does
    /// not move and the same slot is retried next time.
    pub fn try_read_upto(&mut self, write_index: u32) -> Result<ReadOutcome, DecodeError> {
        if self.cursor == slot_index(write_index) {
            return Ok(ReadOutcome::Empty);
        }

        let record = self.load_slot(self.cursor)?;
        self.commit();

        Ok(match validate(&record) {
            Ok(()) => ReadOutcome::Event(record),
            Err(invalid) => ReadOutcome::Skipped(invalid),
        })
    }

    /// [`try_read_upto`](Self::try_read_upto) against the current `write_index`.
    #[inline]
    pub fn try_read(&mut self) -> Result<ReadOutcome, DecodeError> {
        let w = self.load_write_index();
        self.try_read_upto(w)
    }

    #[inline(always)]
    fn commit(&mut self) {
        self.cursor = advance(self.cursor);
        self.header().read_index.store(self.cursor, Ordering::Release);
    }

    /// Parks until the producer moves `write_index` away from `observed`,
    /// signals shutdown, or `timeout` passes.
    ///
    /// `observed` is a slot index as returned by [`snapshot`](Self::snapshot).
    /// The wait keys on the raw header word, so an out-of-range value that
    /// reduces to `observed` still parks for the full interval.
    #[inline]
    pub fn wait(&self, observed: u32, timeout: Duration) {
        let word = &self.header().write_index;
        let raw = word.load(Ordering::Acquire);
        if slot_index(raw) != slot_index(observed) {
            return;
        }
        wait_for_change(word, raw, timeout);
    }
}
