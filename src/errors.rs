//! Error types shared across the client.

use std::fmt::{Display, Formatter};

/// Shared client result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Client error enumeration covering every session failure mode.
///
/// Every variant is terminal for the session that produced it. Nothing is
/// retried internally; the caller decides how to report the failure.
#[derive(Debug)]
pub enum AppError {
    /// Missing or invalid client configuration.
    Config(String),
    /// No IPC endpoint was found on this machine.
    Discovery(String),
    /// The IPC endpoint exists but could not be opened.
    Connect(String),
    /// Malformed frame header, length, or JSON payload.
    Framing(String),
    /// The peer did not confirm the handshake.
    Handshake(String),
    /// The peer answered a command with an `ERROR` event.
    Command(String),
    /// No matching response arrived before the deadline.
    Timeout(String),
    /// The peer closed the stream while a read was in progress.
    ConnectionClosed(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Discovery(msg) => write!(f, "discovery: {msg}"),
            Self::Connect(msg) => write!(f, "connect: {msg}"),
            Self::Framing(msg) => write!(f, "framing: {msg}"),
            Self::Handshake(msg) => write!(f, "handshake: {msg}"),
            Self::Command(msg) => write!(f, "command: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::ConnectionClosed(msg) => write!(f, "connection closed: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Framing(format!("invalid json payload: {err}"))
    }
}
