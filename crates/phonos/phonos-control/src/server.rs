use crate::error::ControlError;
use crate::message::ControlMessage;
use std::io::{self, BufRead, BufReader};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long `serve` sleeps between accept attempts and blocks on a read
/// before re-checking the stop flag.
const STOP_POLL: Duration = Duration::from_millis(50);

/// Reads newline-delimited control lines from `reader` until EOF and hands
/// each parsed message to `handler` in arrival order. Blank lines are
/// skipped and bytes that are not UTF-8 are replaced, so one bad line never
/// ends the stream. Returns the number of messages handled.
///
/// # Errors
/// Only I/O errors from `reader`.
pub fn read_messages<R, F>(mut reader: R, mut handler: F) -> io::Result<usize>
where
    R: BufRead,
    F: FnMut(ControlMessage),
{
    let mut handled = 0usize;
    let mut buf = Vec::new();
    loop {
        let (n, eof) = next_line(&mut reader, &mut buf, &mut handler)?;
        handled += n;
        if eof {
            return Ok(handled);
        }
    }
}

/// Reads up to the next `\n` and dispatches the line. Returns how many
/// messages were handled and whether EOF was reached.
///
/// Bytes read before an error stay in `buf`, so a read that times out
/// mid-line resumes the same line on the next call.
fn next_line<R, F>(reader: &mut R, buf: &mut Vec<u8>, handler: &mut F) -> io::Result<(usize, bool)>
where
    R: BufRead,
    F: FnMut(ControlMessage),
{
    let eof = reader.read_until(b'\n', buf)? == 0;
    if !eof && buf.last() != Some(&b'\n') {
        // unterminated tail; the next call sees EOF and dispatches it
        return Ok((0, false));
    }
    let handled = dispatch(buf, handler);
    buf.clear();
    Ok((handled, eof))
}

/// Listening end of the control channel on a Unix domain stream socket.
///
/// Connections are served one at a time so messages reach the handler in
/// the order they were sent. The socket file is removed on drop.
pub struct ControlServer {
    listener: UnixListener,
    path: PathBuf,
}

impl ControlServer {
    /// Binds `path`, replacing a stale socket file left by a previous run.
    pub fn bind<P: AsRef<Path>>(path: P) -> Result<Self, ControlError> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            debug!(path = %path.display(), "removing stale control socket");
            let _ = std::fs::remove_file(&path);
        }

        let listener = UnixListener::bind(&path).map_err(|source| ControlError::Bind {
            path: path.clone(),
            source,
        })?;
        listener.set_nonblocking(true)?;

        info!(path = %path.display(), "control channel listening");
        Ok(Self { listener, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accepts connections and feeds their lines to `handler` until `stop`
    /// is set. The flag is observed within `STOP_POLL`.
    pub fn serve<F>(&self, mut handler: F, stop: &AtomicBool) -> Result<(), ControlError>
    where
        F: FnMut(ControlMessage),
    {
        while !stop.load(Ordering::Acquire) {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    debug!("control client connected");
                    match serve_connection(stream, &mut handler, stop) {
                        Ok(n) => debug!(messages = n, "control client disconnected"),
                        Err(e) => warn!(error = %e, "control connection failed"),
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    std::thread::sleep(STOP_POLL);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(ControlError::Io(e)),
            }
        }
        Ok(())
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Reads one connection line by line. Uses a read timeout instead of a
/// blocking read so a silent client cannot hold off shutdown.
fn serve_connection<F>(stream: UnixStream, handler: &mut F, stop: &AtomicBool) -> io::Result<usize>
where
    F: FnMut(ControlMessage),
{
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(STOP_POLL))?;
    let mut reader = BufReader::new(stream);

    let mut handled = 0usize;
    let mut buf = Vec::new();
    while !stop.load(Ordering::Acquire) {
        match next_line(&mut reader, &mut buf, handler) {
            Ok((n, eof)) => {
                handled += n;
                if eof {
                    return Ok(handled);
                }
            }
            // Partial data read before the timeout stays in `buf`.
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(handled)
}

fn dispatch<F>(raw: &[u8], handler: &mut F) -> usize
where
    F: FnMut(ControlMessage),
{
    let line = String::from_utf8_lossy(raw);
    if line.trim().is_empty() {
        return 0;
    }
    handler(ControlMessage::parse_line(&line));
    1
}
