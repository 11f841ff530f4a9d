//! Handshake state machine.
//!
//! The first frame on a new connection must be a HANDSHAKE carrying the
//! protocol version and client id. The peer answers with a FRAME whose
//! `cmd` is `DISPATCH` and `evt` is `READY`, or with a CLOSE frame when the
//! client id is rejected.
//!
//! ```text
//! Init ──send──▶ Sent ──receive──▶ Ready
//!   │              │
//!   └──────────────┴──────────────▶ Failed
//! ```
//!
//! Failure is terminal; there are no retries.

use serde_json::Value;
use tracing::{debug, info, warn};

use super::codec::{self, HEADER_SIZE};
use super::{
    describe_close, CommandResponse, Frame, HandshakeRequest, HandshakeResult, Opcode,
    DISPATCH_COMMAND, READY_EVENT,
};
use crate::transport::{self, Connection};
use crate::{AppError, Result};

/// Where the handshake currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing sent yet.
    Init,
    /// Request written, waiting for READY.
    Sent,
    /// Peer confirmed; commands may be sent.
    Ready,
    /// Handshake failed; the session must be closed.
    Failed,
}

/// Drives one handshake over a connection.
#[derive(Debug)]
pub struct Handshake {
    request: HandshakeRequest,
    state: HandshakeState,
}

impl Handshake {
    /// Prepare a handshake for `client_id` at `protocol_version`.
    #[must_use]
    pub fn new(protocol_version: u32, client_id: impl Into<String>) -> Self {
        Self {
            request: HandshakeRequest {
                protocol_version,
                client_id: client_id.into(),
            },
            state: HandshakeState::Init,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// The request this handshake sends.
    #[must_use]
    pub fn request(&self) -> &HandshakeRequest {
        &self.request
    }

    /// Run `send` then `receive`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Handshake` if either step fails.
    pub fn perform(&mut self, conn: &mut dyn Connection) -> Result<HandshakeResult> {
        self.send(conn)?;
        self.receive(conn)
    }

    /// Write the HANDSHAKE frame. Valid only in [`HandshakeState::Init`].
    ///
    /// # Errors
    ///
    /// Returns `AppError::Handshake` if called out of order or if the frame
    /// cannot be encoded or written.
    pub fn send(&mut self, conn: &mut dyn Connection) -> Result<()> {
        if self.state != HandshakeState::Init {
            return Err(AppError::Handshake(format!(
                "cannot send handshake in state {:?}",
                self.state
            )));
        }

        let written = codec::encode(Opcode::Handshake, &self.request)
            .and_then(|bytes| transport::write_all(conn, &bytes));
        if let Err(err) = written {
            return Err(self.fail(format!("failed to send handshake: {err}")));
        }

        self.state = HandshakeState::Sent;
        debug!(
            client_id = %self.request.client_id,
            version = self.request.protocol_version,
            "handshake sent"
        );
        Ok(())
    }

    /// Read the peer's reply. Valid only in [`HandshakeState::Sent`].
    ///
    /// # Errors
    ///
    /// Returns `AppError::Handshake` if called out of order, if the stream
    /// closes or times out, if the reply cannot be decoded, or if it is
    /// anything other than a READY dispatch.
    pub fn receive(&mut self, conn: &mut dyn Connection) -> Result<HandshakeResult> {
        if self.state != HandshakeState::Sent {
            return Err(AppError::Handshake(format!(
                "cannot receive handshake reply in state {:?}",
                self.state
            )));
        }

        let frame = match read_frame(conn) {
            Ok(frame) => frame,
            Err(err) => return Err(self.fail(format!("no handshake reply: {err}"))),
        };

        match evaluate_reply(&frame) {
            Ok(result) => {
                self.state = HandshakeState::Ready;
                info!(session_id = ?result.session_id, "handshake ready");
                Ok(result)
            }
            Err(reason) => Err(self.fail(reason)),
        }
    }

    fn fail(&mut self, reason: String) -> AppError {
        self.state = HandshakeState::Failed;
        warn!(%reason, "handshake failed");
        AppError::Handshake(reason)
    }
}

/// Blocking read of one whole frame: header, then payload.
fn read_frame(conn: &mut dyn Connection) -> Result<Frame> {
    let header = transport::read_exact(conn, HEADER_SIZE)?;
    let (_, length) = codec::parse_header(&header)?;
    let payload = transport::read_exact(conn, length as usize)?;
    codec::decode(&header, &payload)
}

fn evaluate_reply(frame: &Frame) -> std::result::Result<HandshakeResult, String> {
    match frame.opcode {
        Opcode::Frame => {}
        Opcode::Close => return Err(describe_close(&frame.payload)),
        other => return Err(format!("unexpected {other} frame in reply to handshake")),
    }

    let reply: CommandResponse = serde_json::from_value(frame.payload.clone())
        .map_err(|err| format!("malformed handshake reply: {err}"))?;

    if reply.name != DISPATCH_COMMAND {
        return Err(format!(
            "expected {DISPATCH_COMMAND} reply, got cmd {}",
            reply.name
        ));
    }

    if reply.event.as_deref() != Some(READY_EVENT) {
        return Err(format!(
            "expected {READY_EVENT} event, got {}",
            reply.event.as_deref().unwrap_or("none")
        ));
    }

    Ok(HandshakeResult {
        session_id: reply
            .data
            .get("session_id")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned),
        protocol_version: reply.data.get("v").and_then(Value::as_u64),
    })
}
