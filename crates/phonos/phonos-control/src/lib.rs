mod client;
mod error;
mod message;
mod server;

pub use client::{ControlClient, FACE_HIDE, FACE_SHOW, send_control_command};
pub use error::{ControlError, ProtocolError};
pub use message::ControlMessage;
pub use server::{ControlServer, read_messages};

/// Socket the consumer listens on for ad-hoc speech/phoneme commands.
pub const CONTROL_SOCKET_PATH: &str = "/tmp/local-llm.sock";

/// Socket the TTS producer listens on for face commands.
pub const TTS_CONTROL_SOCKET_PATH: &str = "/tmp/tts_face_control.sock";
