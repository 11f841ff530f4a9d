#![forbid(unsafe_code)]

//! Client for the Discord desktop IPC RPC protocol.
//!
//! Finds the local socket or named pipe, performs the versioned handshake,
//! and runs nonce-correlated commands with deadline-bounded responses.

pub mod config;
pub mod errors;
pub mod models;
pub mod output;
pub mod protocol;
pub mod session;
pub mod transport;

pub use config::RpcConfig;
pub use errors::{AppError, Result};
pub use session::RpcSession;
