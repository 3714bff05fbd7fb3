//! Encoding and decoding of the 24-byte phoneme record.
//!
//! Records are decoded field by field from little-endian bytes rather than
//! by casting the mapping to `PhonemeEvent`, so a short or misaligned slice
//! is reported as [`DecodeError`] instead of being read out of bounds.

use crate::error::{DecodeError, ValidationError};
use crate::shm_layout::{DURATION_OFFSET, PHONEME_ID_OFFSET, RECORD_SIZE, TIMESTAMP_OFFSET};
use phonos_events::PhonemeEvent;

/// Decodes one record from the start of `bytes`.
///
/// Bytes past `RECORD_SIZE` are ignored. The padding word is not carried
/// into the decoded event.
///
/// # Errors
/// [`DecodeError::Truncated`] if fewer than `RECORD_SIZE` bytes are given.
pub fn decode_record(bytes: &[u8]) -> Result<PhonemeEvent, DecodeError> {
    let Some(rec) = bytes.first_chunk::<RECORD_SIZE>() else {
        return Err(DecodeError::Truncated {
            needed: RECORD_SIZE,
            available: bytes.len(),
        });
    };

    let phoneme_id = i64::from_le_bytes(field::<8>(rec, PHONEME_ID_OFFSET));
    let duration_seconds = f32::from_le_bytes(field::<4>(rec, DURATION_OFFSET));
    let timestamp_us = u64::from_le_bytes(field::<8>(rec, TIMESTAMP_OFFSET));

    Ok(PhonemeEvent::new(phoneme_id, duration_seconds, timestamp_us))
}

/// Encodes `event` into a full record, padding written as zero.
pub fn encode_record(event: &PhonemeEvent, out: &mut [u8; RECORD_SIZE]) {
    out[PHONEME_ID_OFFSET..PHONEME_ID_OFFSET + 8].copy_from_slice(&event.phoneme_id.to_le_bytes());
    out[DURATION_OFFSET..DURATION_OFFSET + 4]
        .copy_from_slice(&event.duration_seconds.to_le_bytes());
    out[DURATION_OFFSET + 4..TIMESTAMP_OFFSET].fill(0);
    out[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 8].copy_from_slice(&event.timestamp_us.to_le_bytes());
}

/// True iff `0 < duration_seconds <= 10.0`.
#[inline]
pub fn is_valid(record: &PhonemeEvent) -> bool {
    record.has_valid_duration()
}

/// Like [`is_valid`], but returns the offending values for logging.
#[inline]
pub fn validate(record: &PhonemeEvent) -> Result<(), ValidationError> {
    if is_valid(record) {
        Ok(())
    } else {
        Err(ValidationError {
            phoneme_id: record.phoneme_id,
            duration_seconds: record.duration_seconds,
        })
    }
}

#[inline(always)]
fn field<const N: usize>(rec: &[u8; RECORD_SIZE], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&rec[offset..offset + N]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(event: PhonemeEvent) -> [u8; RECORD_SIZE] {
        let mut buf = [0xFFu8; RECORD_SIZE];
        encode_record(&event, &mut buf);
        buf
    }

    #[test]
    fn decodes_what_was_encoded() {
        let ev = PhonemeEvent::new(42, 0.25, 1000);
        let decoded = decode_record(&encoded(ev)).expect("full record");
        assert_eq!(decoded.phoneme_id, 42);
        assert_eq!(decoded.duration_seconds, 0.25);
        assert_eq!(decoded.timestamp_us, 1000);
    }

    #[test]
    fn wire_bytes_are_little_endian_with_zero_padding() {
        let buf = encoded(PhonemeEvent::new(0x0102, 1.0, 0x0A0B));
        assert_eq!(&buf[0..8], &[0x02, 0x01, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&buf[8..12], &1.0f32.to_le_bytes());
        assert_eq!(&buf[12..16], &[0, 0, 0, 0]);
        assert_eq!(&buf[16..24], &[0x0B, 0x0A, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn decode_ignores_padding_contents() {
        let mut buf = encoded(PhonemeEvent::new(-3, 0.5, 9));
        buf[12..16].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let decoded = decode_record(&buf).expect("full record");
        assert_eq!(decoded, PhonemeEvent::new(-3, 0.5, 9));
    }

    #[test]
    fn short_read_is_a_decode_error() {
        let buf = encoded(PhonemeEvent::new(1, 0.1, 1));
        assert_eq!(
            decode_record(&buf[..20]),
            Err(DecodeError::Truncated {
                needed: 24,
                available: 20
            })
        );
        assert!(decode_record(&[]).is_err());
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut long = [0u8; 30];
        long[..RECORD_SIZE].copy_from_slice(&encoded(PhonemeEvent::new(5, 2.0, 7)));
        assert_eq!(decode_record(&long), Ok(PhonemeEvent::new(5, 2.0, 7)));
    }

    #[test]
    fn validation_rejects_zero_and_too_long() {
        assert!(is_valid(&PhonemeEvent::new(1, 0.08, 0)));
        assert!(!is_valid(&PhonemeEvent::new(1, 0.0, 0)));
        assert!(!is_valid(&PhonemeEvent::new(1, 11.0, 0)));

        let err = validate(&PhonemeEvent::new(9, 11.0, 0)).unwrap_err();
        assert_eq!(err.phoneme_id, 9);
        assert_eq!(err.duration_seconds, 11.0);
    }
}
