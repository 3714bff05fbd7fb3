use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("failed to bind control socket '{}'", path.display())]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to connect to control socket '{}'", path.display())]
    Connect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("control socket i/o failed")]
    Io(#[from] io::Error),

    #[error("failed to encode control message")]
    Encode(#[from] serde_json::Error),
}

/// A control line that is not a JSON object with the expected field types.
/// Never fatal: the line is degraded to a plain `message`.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("line is not valid JSON")]
    NotJson(#[source] serde_json::Error),

    #[error("line is JSON but not an object")]
    NotAnObject,

    #[error("field has the wrong type")]
    BadField(#[source] serde_json::Error),
}
