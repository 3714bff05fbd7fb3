#![forbid(unsafe_code)]

// One timed phoneme as the TTS producer emits it. The field order and the
// explicit padding match the 24-byte record stride in the shared segment, so
// the in-memory struct and the wire record have the same shape.
// POD -> Plain old data , fixed-size
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PhonemeEvent {
    pub phoneme_id: i64,
    pub duration_seconds: f32, // how long the mouth shape is held, seconds
    pub _pad: u32,             // always zero on the wire
    pub timestamp_us: u64,     // producer clock, microseconds
}

/// Longest duration a producer is allowed to send, in seconds.
pub const MAX_DURATION_SECONDS: f32 = 10.0;

impl PhonemeEvent {
    #[inline]
    pub fn new(phoneme_id: i64, duration_seconds: f32, timestamp_us: u64) -> Self {
        Self {
            phoneme_id,
            duration_seconds,
            _pad: 0,
            timestamp_us,
        }
    }

    /// True when the duration lies in `(0, MAX_DURATION_SECONDS]`.
    ///
    /// NaN compares false against both bounds and is therefore invalid.
    #[inline]
    pub fn has_valid_duration(&self) -> bool {
        self.duration_seconds > 0.0 && self.duration_seconds <= MAX_DURATION_SECONDS
    }

    #[inline]
    pub fn duration_ms(&self) -> u64 {
        (self.duration_seconds as f64 * 1000.0).round() as u64
    }
}
