//! Discord IPC RPC wire protocol.
//!
//! Every message on the stream is one [`Frame`]: an 8-byte header of two
//! little-endian `u32` values (opcode, payload length) followed by exactly
//! that many bytes of UTF-8 JSON.
//!
//! Submodules:
//! - `codec`: frame encoding, decoding, and the resumable [`FrameReader`](codec::FrameReader).
//! - `handshake`: the version/identity exchange that precedes any command.
//! - `command`: nonce-correlated command send and deadline-bounded response polling.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::AppError;

pub mod codec;
pub mod command;
pub mod handshake;

/// Protocol version announced in the handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// `cmd` value carried by unsolicited events and the handshake reply.
pub const DISPATCH_COMMAND: &str = "DISPATCH";

/// `evt` value confirming the handshake.
pub const READY_EVENT: &str = "READY";

/// `evt` value marking a failed command.
pub const ERROR_EVENT: &str = "ERROR";

/// Command listing the channels of a guild.
pub const GET_CHANNELS_COMMAND: &str = "GET_CHANNELS";

/// Frame category tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Opcode {
    /// Initial version/identity exchange.
    Handshake = 0,
    /// Command or response payload.
    Frame = 1,
    /// Peer-initiated shutdown carrying a close code and message.
    Close = 2,
    /// Keep-alive probe; answered with [`Opcode::Pong`].
    Ping = 3,
    /// Keep-alive answer.
    Pong = 4,
}

impl Opcode {
    /// Numeric wire value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for Opcode {
    type Error = AppError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Handshake),
            1 => Ok(Self::Frame),
            2 => Ok(Self::Close),
            3 => Ok(Self::Ping),
            4 => Ok(Self::Pong),
            other => Err(AppError::Framing(format!("unknown opcode {other}"))),
        }
    }
}

impl Display for Opcode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Handshake => "HANDSHAKE",
            Self::Frame => "FRAME",
            Self::Close => "CLOSE",
            Self::Ping => "PING",
            Self::Pong => "PONG",
        };
        f.write_str(name)
    }
}

/// One decoded message.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Frame category.
    pub opcode: Opcode,
    /// Parsed JSON payload.
    pub payload: Value,
}

/// Handshake payload: `{"v": 1, "client_id": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeRequest {
    /// Protocol version.
    #[serde(rename = "v")]
    pub protocol_version: u32,
    /// Application identifier.
    pub client_id: String,
}

/// Outcome of a confirmed handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeResult {
    /// Session identifier from the READY data, when the peer supplies one.
    pub session_id: Option<String>,
    /// Protocol version echoed in the READY data.
    pub protocol_version: Option<u64>,
}

/// Outbound command: `{"cmd": "...", "args": {...}, "nonce": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Command name.
    #[serde(rename = "cmd")]
    pub name: String,
    /// Command arguments.
    #[serde(rename = "args")]
    pub arguments: Map<String, Value>,
    /// Correlation token, fresh per command.
    pub nonce: String,
}

/// Inbound command response or dispatch event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Command name the response belongs to.
    #[serde(rename = "cmd")]
    pub name: String,
    /// Correlation token; `null` on unsolicited events.
    #[serde(default)]
    pub nonce: Option<String>,
    /// Event tag, `ERROR` on failure.
    #[serde(rename = "evt", default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// Response body.
    #[serde(default)]
    pub data: Value,
}

impl CommandResponse {
    /// Whether this response reports a failed command.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.event.as_deref() == Some(ERROR_EVENT)
    }

    /// Human-readable message from an `ERROR` response body.
    #[must_use]
    pub fn error_message(&self) -> String {
        self.data
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| self.data.to_string(), ToOwned::to_owned)
    }
}

/// Render a peer CLOSE payload (`{"code": 4000, "message": "..."}`) for errors.
pub(crate) fn describe_close(payload: &Value) -> String {
    let message = payload
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("no message");
    match payload.get("code").and_then(Value::as_i64) {
        Some(code) => format!("peer sent CLOSE ({code}): {message}"),
        None => format!("peer sent CLOSE: {message}"),
    }
}
