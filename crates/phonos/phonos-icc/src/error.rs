use phonos_events::PhonemeEvent;
use std::io;
use std::path::PathBuf;

/// Failure to open and map an existing segment.
#[derive(Debug, thiserror::Error)]
pub enum AttachError {
    #[error("segment '{}' does not exist", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to map segment '{}'", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("segment '{}' is {len} bytes, smaller than the {needed}-byte header", path.display())]
    Undersized {
        path: PathBuf,
        len: usize,
        needed: usize,
    },
}

impl AttachError {
    pub(crate) fn from_io(path: PathBuf, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => AttachError::NotFound { path },
            _ => AttachError::Io { path, source },
        }
    }

    /// True when the segment simply does not exist yet and retrying later
    /// may succeed.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AttachError::NotFound { .. })
    }
}

/// A record could not be read in full, e.g. the slot straddles the end of a
/// short mapping. Transient: retry on the next poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("record truncated: need {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },
}

/// A decoded record whose duration is outside `(0, 10]` seconds.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("phoneme {phoneme_id} has invalid duration {duration_seconds}s")]
pub struct ValidationError {
    pub phoneme_id: i64,
    pub duration_seconds: f32,
}

/// The producer could not enqueue an event. The event is handed back.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum PublishError {
    #[error("ring is full, consumer has not drained a slot")]
    Full(PhonemeEvent),

    #[error("segment has been shut down")]
    ShutDown(PhonemeEvent),
}

impl PublishError {
    pub fn into_event(self) -> PhonemeEvent {
        match self {
            PublishError::Full(ev) | PublishError::ShutDown(ev) => ev,
        }
    }
}
