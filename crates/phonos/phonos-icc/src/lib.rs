pub mod codec;
mod error;
mod reader;
pub mod ring;
pub mod shm_layout;
pub mod wake;
mod writer;

pub use codec::{decode_record, encode_record, is_valid, validate};
pub use error::{AttachError, DecodeError, PublishError, ValidationError};
pub use reader::{HeaderSnapshot, PhonemeReader, ReadOutcome};
pub use ring::{advance, pending_count};
pub use shm_layout::{RING_CAPACITY, SEGMENT_NAME, SEGMENT_SIZE};
pub use writer::PhonemeWriter;
