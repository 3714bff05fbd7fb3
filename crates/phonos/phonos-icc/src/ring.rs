//! Index arithmetic for the fixed-capacity phoneme ring.
//!
//! Both cursors live in `[0, RING_CAPACITY)` and wrap around. Because the
//! capacity is a power of two, `index & RING_MASK` is equivalent to
//! `index % RING_CAPACITY` and every helper here reduces its inputs that way,
//! so an out-of-range value read from a corrupt header can never index past
//! the record array.
//!
//! ```text
//! capacity = 8, read = 6, write = 2
//!
//!   slot:   0   1   2   3   4   5   6   7
//!          [P] [P] [ ] [ ] [ ] [ ] [P] [P]
//!                   ^w              ^r
//!
//! pending = (2 - 6) mod 8 = 4   (slots 6, 7, 0, 1)
//! ```

use crate::shm_layout::RING_CAPACITY;

/// Bitmask equal to `RING_CAPACITY - 1`.
pub const RING_MASK: u32 = (RING_CAPACITY as u32) - 1;

/// Most records the ring can hold at once. One slot stays empty so that a
/// full ring (`advance(write) == read`) is distinguishable from an empty one
/// (`write == read`).
pub const USABLE_SLOTS: u32 = RING_MASK;

/// Reduces any raw index into the ring.
#[inline(always)]
pub fn slot_index(raw: u32) -> u32 {
    raw & RING_MASK
}

/// The slot after `index`, wrapping from `RING_CAPACITY - 1` to 0.
#[inline(always)]
pub fn advance(index: u32) -> u32 {
    slot_index(index.wrapping_add(1))
}

/// Number of slots in the cyclic range `[read_index, write_index)`.
///
/// # Example
///
/// ```
/// use phonos_icc::ring::pending_count;
/// assert_eq!(pending_count(8, 5), 3);
/// assert_eq!(pending_count(2, 1022), 4); // wrapped
/// assert_eq!(pending_count(7, 7), 0);
/// ```
#[inline(always)]
pub fn pending_count(write_index: u32, read_index: u32) -> u32 {
    write_index.wrapping_sub(read_index) & RING_MASK
}

/// True when the producer must not write: the next write would make the
/// ring look empty.
#[inline(always)]
pub fn is_full(write_index: u32, read_index: u32) -> bool {
    free_slots(write_index, read_index) == 0
}

/// Slots the producer may still fill before the ring is full.
#[inline(always)]
pub fn free_slots(write_index: u32, read_index: u32) -> u32 {
    USABLE_SLOTS - pending_count(write_index, read_index)
}
