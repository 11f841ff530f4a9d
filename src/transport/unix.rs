//! Unix domain socket transport.

use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use super::{Connection, Transport};
use crate::{AppError, Result};

/// Writes never block longer than this; the peer drains its socket promptly.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connects to `discord-ipc-N` socket files.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixSocketTransport;

impl UnixSocketTransport {
    /// Create the transport.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Transport for UnixSocketTransport {
    fn name(&self) -> &'static str {
        "unix-socket"
    }

    fn connect(&self, path: &Path) -> Result<Box<dyn Connection>> {
        let stream = UnixStream::connect(path).map_err(|err| {
            AppError::Connect(format!("cannot open socket {}: {err}", path.display()))
        })?;
        stream
            .set_write_timeout(Some(WRITE_TIMEOUT))
            .map_err(|err| AppError::Connect(format!("cannot configure socket: {err}")))?;

        debug!(path = %path.display(), "unix socket connected");
        Ok(Box::new(UnixSocketConnection {
            stream: Some(stream),
        }))
    }
}

/// An open Unix socket; `None` once closed.
#[derive(Debug)]
pub struct UnixSocketConnection {
    stream: Option<UnixStream>,
}

impl UnixSocketConnection {
    fn stream(&mut self) -> io::Result<&mut UnixStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "connection closed"))
    }
}

impl Read for UnixSocketConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream()?.read(buf)
    }
}

impl Write for UnixSocketConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream()?.flush()
    }
}

impl Connection for UnixSocketConnection {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        // A zero timeout is rejected by the socket API; treat it as the
        // smallest bound instead.
        let timeout = timeout.map(|t| t.max(Duration::from_millis(1)));
        self.stream()?.set_read_timeout(timeout)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            // The peer may already be gone; dropping the stream releases it either way.
            let _ = stream.shutdown(Shutdown::Both);
            debug!("unix socket closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.stream.is_none()
    }
}

impl Drop for UnixSocketConnection {
    fn drop(&mut self) {
        self.close();
    }
}
