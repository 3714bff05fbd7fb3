//! Shapes of the line-delimited JSON control messages.
//!
//! Recognized fields, in any combination:
//!
//! ```text
//! {"message": "Hello"}
//! {"phoneme": "AA", "durationMs": 100}
//! {"phonemes": "HH EH L OW", "phonemeDurations": [80, 100, 90, 120]}
//! {"message": "Hi", "phonemes": "HH AY", "phonemeDurations": [80, 120]}
//! ```
//!
//! What the fields mean is up to the handler; this module only parses them.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phoneme: Option<String>,

    #[serde(default, rename = "durationMs", skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,

    /// Space separated phoneme symbols.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phonemes: Option<String>,

    #[serde(default, rename = "phonemeDurations", skip_serializing_if = "Option::is_none")]
    pub phoneme_durations: Option<Vec<i64>>,

    /// Any other fields, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ControlMessage {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn phoneme(phoneme: impl Into<String>, duration_ms: i64) -> Self {
        Self {
            phoneme: Some(phoneme.into()),
            duration_ms: Some(duration_ms),
            ..Self::default()
        }
    }

    pub fn batch(phonemes: impl Into<String>, durations: Vec<i64>) -> Self {
        Self {
            phonemes: Some(phonemes.into()),
            phoneme_durations: Some(durations),
            ..Self::default()
        }
    }

    /// Strict parse of one line.
    ///
    /// # Errors
    /// [`ProtocolError`] if the line is not a JSON object or a recognized
    /// field has the wrong type.
    pub fn from_json_line(line: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(line).map_err(ProtocolError::NotJson)?;
        if !value.is_object() {
            return Err(ProtocolError::NotAnObject);
        }
        serde_json::from_value(value).map_err(ProtocolError::BadField)
    }

    /// Parses one line, degrading anything unparseable to
    /// `{"message": <line>}`. The line terminator is stripped first.
    pub fn parse_line(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        match Self::from_json_line(line) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(error = %e, "control line is not a JSON message, treating as text");
                Self::text(line)
            }
        }
    }

    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
