//! Timed reads over a stream that has no native read timeout.
//!
//! A background thread owns the blocking reader and forwards each chunk
//! through a channel. [`ReadPump`] drains the channel with
//! `recv_timeout`, so a quiet peer costs at most the configured timeout per
//! read instead of blocking forever.

use std::io::{self, ErrorKind, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::debug;

const CHUNK: usize = 4096;

type Chunk = io::Result<Vec<u8>>;

/// Reader side of a pumped stream.
#[derive(Debug)]
pub struct ReadPump {
    rx: Receiver<Chunk>,
    pending: Vec<u8>,
    offset: usize,
    timeout: Option<Duration>,
    finished: bool,
}

impl ReadPump {
    /// Move `reader` onto a background thread and return the timed front end.
    ///
    /// The thread exits when the stream ends, fails, or the pump is dropped
    /// and the next chunk cannot be delivered.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn spawn<R>(mut reader: R) -> io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<Chunk>();

        thread::Builder::new()
            .name("ipc-read".into())
            .spawn(move || loop {
                let mut buf = vec![0u8; CHUNK];
                match reader.read(&mut buf) {
                    Ok(0) => {
                        let _ = tx.send(Ok(Vec::new()));
                        break;
                    }
                    Ok(n) => {
                        buf.truncate(n);
                        if tx.send(Ok(buf)).is_err() {
                            break;
                        }
                    }
                    Err(err) if err.kind() == ErrorKind::Interrupted => {}
                    Err(err) => {
                        let _ = tx.send(Err(err));
                        break;
                    }
                }
            })?;

        Ok(Self {
            rx,
            pending: Vec::new(),
            offset: 0,
            timeout: None,
            finished: false,
        })
    }

    /// Bound each subsequent read. `None` blocks until data arrives.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        let received = match self.timeout {
            Some(timeout) => match self.rx.recv_timeout(timeout) {
                Ok(chunk) => Some(chunk),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(ErrorKind::WouldBlock, "read timed out"));
                }
                Err(RecvTimeoutError::Disconnected) => None,
            },
            None => self.rx.recv().ok(),
        };

        match received {
            Some(Ok(chunk)) if !chunk.is_empty() => Ok(Some(chunk)),
            Some(Err(err)) => {
                self.finished = true;
                Err(err)
            }
            Some(Ok(_)) | None => {
                self.finished = true;
                debug!("pumped stream ended");
                Ok(None)
            }
        }
    }
}

impl Read for ReadPump {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.offset >= self.pending.len() {
            if self.finished {
                return Ok(0);
            }
            match self.next_chunk()? {
                Some(chunk) => {
                    self.pending = chunk;
                    self.offset = 0;
                }
                None => return Ok(0),
            }
        }

        let available = &self.pending[self.offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.offset += n;
        Ok(n)
    }
}
