//! Windows named pipe transport built on `interprocess` local sockets.
//!
//! Named pipes have no per-read timeout, so the receive half is moved onto a
//! [`ReadPump`] thread and reads are bounded through it.

use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;

use interprocess::local_socket::{traits::Stream as _, GenericFilePath, SendHalf, Stream, ToFsName};
use tracing::debug;

use super::pump::ReadPump;
use super::{Connection, Transport};
use crate::{AppError, Result};

/// Connects to `\\.\pipe\discord-ipc-N`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NamedPipeTransport;

impl NamedPipeTransport {
    /// Create the transport.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Transport for NamedPipeTransport {
    fn name(&self) -> &'static str {
        "named-pipe"
    }

    fn connect(&self, path: &Path) -> Result<Box<dyn Connection>> {
        let name = path.to_fs_name::<GenericFilePath>().map_err(|err| {
            AppError::Connect(format!("invalid pipe name {}: {err}", path.display()))
        })?;
        let stream = Stream::connect(name).map_err(|err| {
            AppError::Connect(format!("cannot open pipe {}: {err}", path.display()))
        })?;

        let (recv, send) = stream.split();
        let reader = ReadPump::spawn(recv).map_err(|err| {
            AppError::Connect(format!("cannot start pipe reader for {}: {err}", path.display()))
        })?;

        debug!(path = %path.display(), "named pipe connected");
        Ok(Box::new(NamedPipeConnection {
            halves: Some((reader, send)),
        }))
    }
}

/// An open named pipe; `None` once closed.
pub struct NamedPipeConnection {
    halves: Option<(ReadPump, SendHalf)>,
}

impl NamedPipeConnection {
    fn halves(&mut self) -> io::Result<&mut (ReadPump, SendHalf)> {
        self.halves
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "connection closed"))
    }
}

impl Read for NamedPipeConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.halves()?.0.read(buf)
    }
}

impl Write for NamedPipeConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.halves()?.1.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.halves()?.1.flush()
    }
}

impl Connection for NamedPipeConnection {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.halves()?.0.set_timeout(timeout);
        Ok(())
    }

    fn close(&mut self) {
        // The reader thread exits once the peer drops its end.
        if self.halves.take().is_some() {
            debug!("named pipe closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.halves.is_none()
    }
}
