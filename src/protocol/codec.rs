//! Length-prefixed JSON frame codec.
//!
//! ```text
//! ┌──────────┬──────────┬─────────────────────┐
//! │ Opcode   │ Length   │ Payload             │
//! │ 4 bytes  │ 4 bytes  │ `Length` bytes JSON │
//! │ uint32 LE│ uint32 LE│ UTF-8               │
//! └──────────┴──────────┴─────────────────────┘
//! ```
//!
//! [`encode`] and [`decode`] operate on whole frames. [`FrameReader`] pulls
//! frames off a [`Connection`] whose reads may time out part-way through a
//! frame, keeping already-received bytes until the frame completes.

use std::io::{self, ErrorKind, Read};
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;

use super::{Frame, Opcode};
use crate::transport::{closed_kind, Connection};
use crate::{AppError, Result};

/// Header size in bytes (fixed, exactly 8).
pub const HEADER_SIZE: usize = 8;

/// Largest payload accepted from the peer: 16 MiB.
///
/// A header announcing more than this is rejected before any payload is
/// buffered.
pub const MAX_PAYLOAD_BYTES: u32 = 16 * 1024 * 1024;

const READ_CHUNK: usize = 4096;

/// Serialize `payload` to JSON and prepend the 8-byte header.
///
/// # Errors
///
/// Returns `AppError::Framing` if the payload cannot be serialized or is
/// larger than [`MAX_PAYLOAD_BYTES`].
pub fn encode<T: Serialize + ?Sized>(opcode: Opcode, payload: &T) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(payload)?;
    let length = u32::try_from(body.len())
        .ok()
        .filter(|len| *len <= MAX_PAYLOAD_BYTES)
        .ok_or_else(|| {
            AppError::Framing(format!(
                "payload of {} bytes exceeds maximum {MAX_PAYLOAD_BYTES}",
                body.len()
            ))
        })?;

    let mut bytes = Vec::with_capacity(HEADER_SIZE + body.len());
    bytes.extend_from_slice(&opcode.as_u32().to_le_bytes());
    bytes.extend_from_slice(&length.to_le_bytes());
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

/// Parse an 8-byte header into its opcode and declared payload length.
///
/// # Errors
///
/// Returns `AppError::Framing` if the header is not exactly
/// [`HEADER_SIZE`] bytes, names an unknown opcode, or declares a payload
/// larger than [`MAX_PAYLOAD_BYTES`].
pub fn parse_header(header: &[u8]) -> Result<(Opcode, u32)> {
    let header: [u8; HEADER_SIZE] = header.try_into().map_err(|_| {
        AppError::Framing(format!(
            "header must be {HEADER_SIZE} bytes, got {}",
            header.len()
        ))
    })?;

    let opcode = Opcode::try_from(u32::from_le_bytes([
        header[0], header[1], header[2], header[3],
    ]))?;
    let length = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

    if length > MAX_PAYLOAD_BYTES {
        return Err(AppError::Framing(format!(
            "declared payload of {length} bytes exceeds maximum {MAX_PAYLOAD_BYTES}"
        )));
    }

    Ok((opcode, length))
}

/// Decode one frame from its header and payload bytes.
///
/// # Errors
///
/// Returns `AppError::Framing` if the header is invalid, if `payload` is
/// not exactly the declared length, or if it is not UTF-8 JSON.
pub fn decode(header: &[u8], payload: &[u8]) -> Result<Frame> {
    let (opcode, length) = parse_header(header)?;

    if payload.len() != length as usize {
        return Err(AppError::Framing(format!(
            "payload length mismatch: header declares {length} bytes, got {}",
            payload.len()
        )));
    }

    let text = std::str::from_utf8(payload)
        .map_err(|err| AppError::Framing(format!("payload is not valid utf-8: {err}")))?;
    let payload: Value = serde_json::from_str(text)?;

    Ok(Frame { opcode, payload })
}

/// Incremental frame reader that survives read timeouts.
///
/// Bytes read before a timeout stay buffered, so the next poll resumes in
/// the middle of the frame instead of misreading payload bytes as a header.
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: Vec<u8>,
}

impl FrameReader {
    /// Create an empty reader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes buffered toward the next frame.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Read until one complete frame is available, a read times out, or
    /// `deadline` passes.
    ///
    /// Returns `Ok(None)` when no complete frame is available yet; buffered
    /// bytes are kept for the next call.
    ///
    /// # Errors
    ///
    /// - `AppError::ConnectionClosed` if the peer closes the stream.
    /// - `AppError::Framing` if the buffered bytes do not form a valid frame.
    /// - `AppError::Io` on any other read failure.
    pub fn poll_frame(
        &mut self,
        conn: &mut dyn Connection,
        deadline: Instant,
    ) -> Result<Option<Frame>> {
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if let Some(frame) = self.take_frame()? {
                return Ok(Some(frame));
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            match conn.read(&mut chunk) {
                Ok(0) => {
                    return Err(AppError::ConnectionClosed(format!(
                        "peer closed the stream with {} bytes of a partial frame buffered",
                        self.buf.len()
                    )));
                }
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(err) if is_timeout(&err) => return Ok(None),
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) if closed_kind(err.kind()) => {
                    return Err(AppError::ConnectionClosed(err.to_string()));
                }
                Err(err) => return Err(AppError::Io(format!("read failed: {err}"))),
            }
        }
    }

    /// Split one complete frame off the front of the buffer.
    fn take_frame(&mut self) -> Result<Option<Frame>> {
        if self.buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        let (_, length) = parse_header(&self.buf[..HEADER_SIZE])?;
        let end = HEADER_SIZE + length as usize;
        if self.buf.len() < end {
            return Ok(None);
        }

        let frame = decode(&self.buf[..HEADER_SIZE], &self.buf[HEADER_SIZE..end]);
        self.buf.drain(..end);
        frame.map(Some)
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}
