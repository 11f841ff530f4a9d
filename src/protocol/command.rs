//! Nonce-correlated commands.
//!
//! [`CommandChannel::send_command`] writes a FRAME and returns its nonce at
//! once. [`CommandChannel::await_response`] then polls the stream until a
//! response with that nonce and command name arrives or the deadline
//! passes. Everything else on the stream (activity pushes, other dispatch
//! events) is discarded. PING frames are answered on the way.

use std::thread;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use super::codec::{self, FrameReader};
use super::{describe_close, Command, CommandResponse, Frame, Opcode};
use crate::transport::{self, Connection};
use crate::{AppError, Result};

/// Default bound for a single read while polling.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Fresh correlation token: a random UUID v4 in simple (hex) form.
#[must_use]
pub fn generate_nonce() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Deadline `timeout` from now.
///
/// # Errors
///
/// Returns `AppError::Config` if the deadline is not representable.
pub fn deadline_after(timeout: Duration) -> Result<Instant> {
    Instant::now().checked_add(timeout).ok_or_else(|| {
        AppError::Config(format!("command timeout of {timeout:?} is out of range"))
    })
}

/// Command send/receive over a borrowed connection.
///
/// The [`FrameReader`] is borrowed too so that bytes of a frame that
/// straddles two commands are not lost.
pub struct CommandChannel<'a> {
    conn: &'a mut dyn Connection,
    reader: &'a mut FrameReader,
    poll_interval: Duration,
}

impl<'a> CommandChannel<'a> {
    /// Wrap a connection and its frame reader.
    pub fn new(conn: &'a mut dyn Connection, reader: &'a mut FrameReader) -> Self {
        Self {
            conn,
            reader,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the per-read bound used while polling.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    /// Encode and write a command, returning its nonce.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Framing` if the command cannot be encoded, or a
    /// transport error if the write fails.
    pub fn send_command(&mut self, name: &str, arguments: Map<String, Value>) -> Result<String> {
        let command = Command {
            name: name.to_owned(),
            arguments,
            nonce: generate_nonce(),
        };
        let bytes = codec::encode(Opcode::Frame, &command)?;
        transport::write_all(self.conn, &bytes)?;

        debug!(cmd = name, nonce = %command.nonce, "command sent");
        Ok(command.nonce)
    }

    /// Wait for the response to `name` carrying `nonce`.
    ///
    /// Returns the response `data` on success. Control comes back no later
    /// than one poll interval after `deadline`.
    ///
    /// # Errors
    ///
    /// - `AppError::Command` with the peer's message if the response is an
    ///   `ERROR` event.
    /// - `AppError::Timeout` if `deadline` passes without a match.
    /// - `AppError::ConnectionClosed` if the peer closes the stream or sends
    ///   CLOSE.
    /// - `AppError::Framing` / `AppError::Io` on malformed input or read
    ///   failures.
    pub fn await_response(&mut self, nonce: &str, name: &str, deadline: Instant) -> Result<Value> {
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(AppError::Timeout(format!(
                    "no {name} response for nonce {nonce} before the deadline"
                )));
            }

            let wait = self.poll_interval.min(deadline - now);
            self.conn
                .set_read_timeout(Some(wait))
                .map_err(|err| AppError::Io(format!("cannot set read timeout: {err}")))?;

            let started = Instant::now();
            match self.reader.poll_frame(self.conn, deadline)? {
                Some(frame) => {
                    if let Some(data) = self.handle_frame(frame, nonce, name)? {
                        return Ok(data);
                    }
                }
                None => {
                    // Transports without read timeouts return at once; pause
                    // for the rest of the interval instead of spinning.
                    let elapsed = started.elapsed();
                    if elapsed < wait {
                        thread::sleep(wait - elapsed);
                    }
                }
            }
        }
    }

    /// Send `name` and wait up to `timeout` for its response.
    ///
    /// # Errors
    ///
    /// `AppError::Config` if `timeout` overflows the clock, otherwise any
    /// error from [`CommandChannel::send_command`] or
    /// [`CommandChannel::await_response`].
    pub fn execute(
        &mut self,
        name: &str,
        arguments: Map<String, Value>,
        timeout: Duration,
    ) -> Result<Value> {
        let deadline = deadline_after(timeout)?;
        let nonce = self.send_command(name, arguments)?;
        self.await_response(&nonce, name, deadline)
    }

    /// `Ok(Some(data))` for the awaited response, `Ok(None)` to keep polling.
    fn handle_frame(&mut self, frame: Frame, nonce: &str, name: &str) -> Result<Option<Value>> {
        match frame.opcode {
            Opcode::Frame => {}
            Opcode::Ping => {
                let pong = codec::encode(Opcode::Pong, &frame.payload)?;
                transport::write_all(self.conn, &pong)?;
                debug!("answered ping");
                return Ok(None);
            }
            Opcode::Close => {
                let reason = describe_close(&frame.payload);
                warn!(%reason, "peer closed the connection");
                return Err(AppError::ConnectionClosed(reason));
            }
            other => {
                debug!(opcode = %other, "discarding non-command frame");
                return Ok(None);
            }
        }

        let response: CommandResponse = match serde_json::from_value(frame.payload) {
            Ok(response) => response,
            Err(err) => {
                debug!(error = %err, "discarding frame without a command envelope");
                return Ok(None);
            }
        };

        if response.nonce.as_deref() != Some(nonce) || response.name != name {
            debug!(
                cmd = %response.name,
                evt = ?response.event,
                nonce = ?response.nonce,
                "discarding unrelated frame"
            );
            return Ok(None);
        }

        if response.is_error() {
            return Err(AppError::Command(response.error_message()));
        }

        Ok(Some(response.data))
    }
}
