//! Shared memory layout of the phoneme queue segment.
//!
//! The layout is fixed by the TTS producer and must not change: a 16-byte
//! header followed by `RING_CAPACITY` records of 24 bytes each. All
//! multi-byte fields are little-endian.
//!
//! # Memory Layout
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                     PhonemeQueueHeader (16B)                   │
//! │  ┌─────────────┬─────────────┬──────────┬──────────────────┐   │
//! │  │ write_index │ read_index  │ shutdown │    reserved      │   │
//! │  │ (4B atomic) │ (4B atomic) │ (1B)     │    (7B)          │   │
//! │  └─────────────┴─────────────┴──────────┴──────────────────┘   │
//! ├────────────────────────────────────────────────────────────────┤
//! │                     Record[0] (24B)                            │
//! │  ┌──────────────┬──────────────┬─────────┬────────────────┐    │
//! │  │ phoneme_id   │ duration_s   │ padding │ timestamp_us   │    │
//! │  │ (i64)        │ (f32)        │ (4B)    │ (u64)          │    │
//! │  └──────────────┴──────────────┴─────────┴────────────────┘    │
//! ├────────────────────────────────────────────────────────────────┤
//! │                          ...                                   │
//! ├────────────────────────────────────────────────────────────────┤
//! │                     Record[RING_CAPACITY-1]                    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Ownership
//!
//! Each header field has exactly one writer:
//! - `write_index`, `shutdown_flag` and every record: the producer
//! - `read_index`: the consumer

use std::mem::{offset_of, size_of};
use std::sync::atomic::{AtomicBool, AtomicU32};

/// Well-known name of the phoneme queue segment.
pub const SEGMENT_NAME: &str = "tts_phoneme_queue";

/// Number of record slots in the ring.
pub const RING_CAPACITY: usize = 1024;

/// Size of the header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Stride of one record in bytes.
pub const RECORD_SIZE: usize = 24;

/// Total size of a segment created by the producer.
pub const SEGMENT_SIZE: usize = HEADER_SIZE + RING_CAPACITY * RECORD_SIZE;

// Header field offsets
pub const WRITE_INDEX_OFFSET: usize = 0;
pub const READ_INDEX_OFFSET: usize = 4;
pub const SHUTDOWN_FLAG_OFFSET: usize = 8;

// Record field offsets, relative to the start of the record
pub const PHONEME_ID_OFFSET: usize = 0;
pub const DURATION_OFFSET: usize = 8;
pub const TIMESTAMP_OFFSET: usize = 16;

/// Header at offset 0 of the segment.
///
/// `#[repr(C)]` pins the field order to the producer's layout. The atomics
/// have the same in-memory representation as the plain integers the
/// producer writes, so the header can be overlaid on the mapping directly.
#[repr(C)]
pub struct PhonemeQueueHeader {
    /// Next slot the producer will fill.
    pub write_index: AtomicU32,

    /// Next slot the consumer will drain.
    pub read_index: AtomicU32,

    /// Set once by the producer when it stops writing. Never cleared.
    pub shutdown_flag: AtomicBool,

    _reserved: [u8; 7],
}

const _: () = assert!(size_of::<PhonemeQueueHeader>() == HEADER_SIZE);
const _: () = assert!(offset_of!(PhonemeQueueHeader, write_index) == WRITE_INDEX_OFFSET);
const _: () = assert!(offset_of!(PhonemeQueueHeader, read_index) == READ_INDEX_OFFSET);
const _: () = assert!(offset_of!(PhonemeQueueHeader, shutdown_flag) == SHUTDOWN_FLAG_OFFSET);
const _: () = assert!(RING_CAPACITY.is_power_of_two());

/// Byte offset of the record stored in `slot`.
///
/// `slot` must already be reduced into `[0, RING_CAPACITY)`.
#[inline(always)]
pub fn record_offset(slot: u32) -> usize {
    HEADER_SIZE + slot as usize * RECORD_SIZE
}
