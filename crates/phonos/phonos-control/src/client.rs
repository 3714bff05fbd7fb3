use crate::error::ControlError;
use crate::message::ControlMessage;
use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::Path;
use tracing::{debug, info};

/// Asks the TTS producer to start generating phonemes for the face.
pub const FACE_SHOW: &str = "face_show";

/// Asks the TTS producer to stop generating phonemes for the face.
pub const FACE_HIDE: &str = "face_hide";

/// Sends one newline-terminated command on a fresh connection and closes it.
///
/// # Errors
/// [`ControlError::Connect`] if nothing listens at `path`, or
/// [`ControlError::Io`] if the write fails. Callers usually log and carry on.
pub fn send_control_command<P: AsRef<Path>>(path: P, command: &str) -> Result<(), ControlError> {
    let mut client = ControlClient::connect(path)?;
    client.send_line(command)?;
    info!(command, "sent control command");
    Ok(())
}

/// Sending end of a control channel connection.
pub struct ControlClient {
    stream: UnixStream,
}

impl ControlClient {
    pub fn connect<P: AsRef<Path>>(path: P) -> Result<Self, ControlError> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).map_err(|source| ControlError::Connect {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "connected to control socket");
        Ok(Self { stream })
    }

    /// Writes `line` followed by `\n`. Embedded newlines would split the
    /// line on the receiving side, so they are replaced by spaces.
    pub fn send_line(&mut self, line: &str) -> Result<(), ControlError> {
        let mut out = line.replace(['\r', '\n'], " ");
        out.push('\n');
        self.stream.write_all(out.as_bytes())?;
        Ok(())
    }

    pub fn send(&mut self, message: &ControlMessage) -> Result<(), ControlError> {
        let line = message.to_json_line()?;
        self.stream.write_all(line.as_bytes())?;
        Ok(())
    }
}
