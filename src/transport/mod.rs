//! Local IPC transport to the desktop client.
//!
//! The peer listens on a Unix domain socket (Linux/macOS) or a named pipe
//! (Windows). Both are hidden behind the [`Transport`] and [`Connection`]
//! traits; [`platform_transport`] picks the implementation once, so nothing
//! else in the crate branches on the operating system.

use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::time::Duration;

use crate::{AppError, Result};

pub mod discovery;
#[cfg(windows)]
pub mod pipe;
pub mod pump;
#[cfg(unix)]
pub mod unix;

/// A bidirectional, ordered byte stream to the peer.
///
/// The session owns exactly one connection and is the only reader and
/// writer for its whole lifetime.
pub trait Connection: Read + Write + Send {
    /// Bound the duration of a single blocking read.
    ///
    /// A read that outlives the bound fails with `WouldBlock` or `TimedOut`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the timeout cannot be applied.
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> std::io::Result<()>;

    /// Release the underlying handle. Calling `close` again is a no-op.
    fn close(&mut self);

    /// Whether [`Connection::close`] has already run.
    fn is_closed(&self) -> bool;
}

/// Opens connections to a local IPC endpoint.
pub trait Transport {
    /// Short transport name for logs.
    fn name(&self) -> &'static str;

    /// Open the endpoint at `path`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Connect` if the endpoint does not exist or
    /// refuses the connection.
    fn connect(&self, path: &Path) -> Result<Box<dyn Connection>>;
}

/// The transport for the current operating system.
#[must_use]
pub fn platform_transport() -> Box<dyn Transport> {
    #[cfg(unix)]
    {
        Box::new(unix::UnixSocketTransport::new())
    }

    #[cfg(windows)]
    {
        Box::new(pipe::NamedPipeTransport::new())
    }
}

/// Read exactly `len` bytes, blocking until they arrive or the peer closes.
///
/// # Errors
///
/// - `AppError::ConnectionClosed` if the stream ends first.
/// - `AppError::Timeout` if the connection's read timeout expires.
/// - `AppError::Io` on any other read failure.
pub fn read_exact(conn: &mut dyn Connection, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    conn.read_exact(&mut buf).map_err(|err| match err.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => {
            AppError::Timeout(format!("no data within the read timeout ({len} bytes expected)"))
        }
        kind if closed_kind(kind) => {
            AppError::ConnectionClosed(format!("stream ended before {len} bytes arrived"))
        }
        _ => AppError::Io(format!("read failed: {err}")),
    })?;
    Ok(buf)
}

/// Write a whole buffer and flush it.
///
/// # Errors
///
/// Returns `AppError::ConnectionClosed` if the peer is gone, or
/// `AppError::Io` on any other write failure.
pub fn write_all(conn: &mut dyn Connection, bytes: &[u8]) -> Result<()> {
    conn.write_all(bytes)
        .and_then(|()| conn.flush())
        .map_err(|err| {
            if closed_kind(err.kind()) {
                AppError::ConnectionClosed(format!("write failed: {err}"))
            } else {
                AppError::Io(format!("write failed: {err}"))
            }
        })
}

/// I/O error kinds that mean the peer has gone away.
pub(crate) fn closed_kind(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
    )
}
