//! Shared fixtures: a scripted in-memory connection standing in for the
//! desktop client, plus frame builders.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};

use discord_rpc_ipc::protocol::codec::{self, HEADER_SIZE};
use discord_rpc_ipc::protocol::{Frame, Opcode};
use discord_rpc_ipc::transport::{Connection, Transport};
use discord_rpc_ipc::{AppError, Result};

/// Encode one frame.
pub fn frame(opcode: Opcode, payload: &Value) -> Vec<u8> {
    codec::encode(opcode, payload).expect("test payload encodes")
}

/// The READY dispatch the desktop client sends after a valid handshake.
pub fn ready_frame() -> Vec<u8> {
    frame(
        Opcode::Frame,
        &json!({
            "cmd": "DISPATCH",
            "evt": "READY",
            "nonce": null,
            "data": { "v": 1, "session_id": "sess-42", "config": { "api_endpoint": "//discord.com/api" } }
        }),
    )
}

/// One step of scripted peer output.
#[derive(Debug, Clone)]
pub enum Step {
    /// Bytes handed out by subsequent reads.
    Bytes(Vec<u8>),
    /// One read fails with `WouldBlock`, as a timed-out socket read does.
    Pending,
    /// One read returns end of stream.
    Eof,
}

/// What reads return once the script runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhausted {
    /// End of stream, as if the peer hung up.
    Eof,
    /// `WouldBlock` forever, as if the peer went quiet.
    Pending,
}

type Responder = Box<dyn FnMut(&Frame) -> Vec<Vec<u8>> + Send>;

/// Observations shared between a test and its [`ScriptedConnection`].
#[derive(Clone, Default)]
pub struct Probe {
    written: Arc<Mutex<Vec<u8>>>,
    closes: Arc<AtomicUsize>,
    read_timeouts: Arc<Mutex<Vec<Option<Duration>>>>,
}

impl Probe {
    /// Every complete frame the client has written so far.
    pub fn written_frames(&self) -> Vec<Frame> {
        let bytes = self.written.lock().expect("probe lock").clone();
        let mut frames = Vec::new();
        let mut rest = bytes.as_slice();
        while rest.len() >= HEADER_SIZE {
            let (_, length) = codec::parse_header(&rest[..HEADER_SIZE]).expect("valid header");
            let end = HEADER_SIZE + length as usize;
            frames.push(codec::decode(&rest[..HEADER_SIZE], &rest[HEADER_SIZE..end]).expect("valid frame"));
            rest = &rest[end..];
        }
        frames
    }

    /// How many times the connection was actually released.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Read timeouts applied by the client, in order.
    pub fn read_timeouts(&self) -> Vec<Option<Duration>> {
        self.read_timeouts.lock().expect("probe lock").clone()
    }
}

/// In-memory connection replaying a script of peer output.
pub struct ScriptedConnection {
    steps: VecDeque<Step>,
    exhausted: Exhausted,
    responder: Option<Responder>,
    pending_write: Vec<u8>,
    closed: bool,
    probe: Probe,
}

impl ScriptedConnection {
    /// Connection replaying `steps`, then behaving as `exhausted`.
    pub fn new(steps: Vec<Step>, exhausted: Exhausted) -> (Self, Probe) {
        let probe = Probe::default();
        let conn = Self {
            steps: steps.into(),
            exhausted,
            responder: None,
            pending_write: Vec::new(),
            closed: false,
            probe: probe.clone(),
        };
        (conn, probe)
    }

    /// Queue frames produced by `responder` for every frame the client writes.
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: FnMut(&Frame) -> Vec<Vec<u8>> + Send + 'static,
    {
        self.responder = Some(Box::new(responder));
        self
    }

    fn respond_to_written(&mut self) {
        while self.pending_write.len() >= HEADER_SIZE {
            let (_, length) =
                codec::parse_header(&self.pending_write[..HEADER_SIZE]).expect("client header valid");
            let end = HEADER_SIZE + length as usize;
            if self.pending_write.len() < end {
                return;
            }
            let frame = codec::decode(&self.pending_write[..HEADER_SIZE], &self.pending_write[HEADER_SIZE..end])
                .expect("client frame valid");
            self.pending_write.drain(..end);

            if let Some(responder) = self.responder.as_mut() {
                for bytes in responder(&frame) {
                    self.steps.push_back(Step::Bytes(bytes));
                }
            }
        }
    }
}

impl Read for ScriptedConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "closed"));
        }

        match self.steps.pop_front() {
            Some(Step::Bytes(mut bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    self.steps.push_front(Step::Bytes(bytes.split_off(n)));
                }
                Ok(n)
            }
            Some(Step::Pending) => Err(io::Error::new(io::ErrorKind::WouldBlock, "pending")),
            Some(Step::Eof) => Ok(0),
            None => match self.exhausted {
                Exhausted::Eof => Ok(0),
                Exhausted::Pending => Err(io::Error::new(io::ErrorKind::WouldBlock, "pending")),
            },
        }
    }
}

impl Write for ScriptedConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
        }
        self.probe.written.lock().expect("probe lock").extend_from_slice(buf);
        self.pending_write.extend_from_slice(buf);
        self.respond_to_written();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Connection for ScriptedConnection {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.probe.read_timeouts.lock().expect("probe lock").push(timeout);
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.probe.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Transport handing out one prepared connection and recording connect calls.
pub struct RecordingTransport {
    conn: Mutex<Option<ScriptedConnection>>,
    pub connects: Mutex<Vec<PathBuf>>,
}

impl RecordingTransport {
    pub fn new(conn: ScriptedConnection) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
            connects: Mutex::new(Vec::new()),
        }
    }

    pub fn connect_count(&self) -> usize {
        self.connects.lock().expect("transport lock").len()
    }
}

impl Transport for RecordingTransport {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn connect(&self, path: &Path) -> Result<Box<dyn Connection>> {
        self.connects.lock().expect("transport lock").push(path.to_path_buf());
        self.conn
            .lock()
            .expect("transport lock")
            .take()
            .map(|conn| Box::new(conn) as Box<dyn Connection>)
            .ok_or_else(|| AppError::Connect("scripted connection already used".into()))
    }
}
