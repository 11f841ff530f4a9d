//! End-to-end over a real Unix domain socket with a fake desktop client.

#![cfg(unix)]

use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use discord_rpc_ipc::protocol::codec::{self, HEADER_SIZE};
use discord_rpc_ipc::protocol::{Frame, Opcode};
use discord_rpc_ipc::transport::discovery::PathResolver;
use discord_rpc_ipc::transport::unix::UnixSocketTransport;
use discord_rpc_ipc::transport::Transport;
use discord_rpc_ipc::{AppError, RpcConfig, RpcSession};

use super::test_helpers::ready_frame;

fn read_frame(stream: &mut UnixStream) -> Option<Frame> {
    let mut header = [0u8; HEADER_SIZE];
    stream.read_exact(&mut header).ok()?;
    let (_, length) = codec::parse_header(&header).ok()?;
    let mut payload = vec![0u8; length as usize];
    stream.read_exact(&mut payload).ok()?;
    codec::decode(&header, &payload).ok()
}

fn write_frame(stream: &mut UnixStream, opcode: Opcode, payload: &Value) {
    let bytes = codec::encode(opcode, payload).expect("encode");
    stream.write_all(&bytes).expect("peer write");
}

#[test]
fn lists_channels_over_unix_socket() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("discord-ipc-0");
    let listener = UnixListener::bind(&path).expect("bind");

    let peer = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");

        let hello = read_frame(&mut stream).expect("handshake frame");
        assert_eq!(hello.opcode, Opcode::Handshake);
        assert_eq!(hello.payload, json!({ "v": 1, "client_id": "123" }));
        stream.write_all(&ready_frame()).expect("ready");

        let command = read_frame(&mut stream).expect("command frame");
        let nonce = command.payload["nonce"].clone();
        // Split the unrelated event across two writes to exercise reassembly.
        let event = codec::encode(
            Opcode::Frame,
            &json!({ "cmd": "DISPATCH", "evt": "MESSAGE_CREATE", "nonce": null, "data": {} }),
        )
        .expect("encode");
        stream.write_all(&event[..6]).expect("partial write");
        thread::sleep(Duration::from_millis(150));
        stream.write_all(&event[6..]).expect("rest write");

        write_frame(
            &mut stream,
            Opcode::Frame,
            &json!({
                "cmd": "GET_CHANNELS",
                "nonce": nonce,
                "data": { "channels": [{ "id": "1", "name": "general", "type": 0 }] }
            }),
        );

        // The client closes its end once the session is dropped.
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).expect("read to end");
        rest.len()
    });

    let config = RpcConfig::new("123", "456").expect("config");
    let resolver = PathResolver::with_base_dirs(vec![dir.path().to_path_buf()]);
    let mut session =
        RpcSession::open_with(&config, &resolver, &UnixSocketTransport::new()).expect("session");

    let channels = session.get_channels("456").expect("channels");
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].name, "general");

    session.close();
    assert_eq!(peer.join().expect("peer thread"), 0);
}

#[test]
fn silent_peer_times_out_on_real_socket() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("discord-ipc-0");
    let listener = UnixListener::bind(&path).expect("bind");

    let peer = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let _hello = read_frame(&mut stream);
        stream.write_all(&ready_frame()).expect("ready");
        let _command = read_frame(&mut stream);
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest);
    });

    let config = RpcConfig::new("123", "456").expect("config");
    let mut session = RpcSession::from_connection(
        &config,
        UnixSocketTransport::new().connect(&path).expect("connect"),
    )
    .expect("session");

    let mut channel = session.channel();
    let nonce = channel
        .send_command("GET_CHANNELS", serde_json::Map::new())
        .expect("send");
    let start = Instant::now();
    let err = channel
        .await_response(&nonce, "GET_CHANNELS", start + Duration::from_millis(500))
        .expect_err("must time out");
    let elapsed = start.elapsed();

    assert!(matches!(err, AppError::Timeout(_)), "got {err:?}");
    assert!(elapsed >= Duration::from_millis(500), "returned early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(650), "overshot: {elapsed:?}");

    drop(session);
    peer.join().expect("peer thread");
}

#[test]
fn close_is_idempotent_on_real_socket() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("discord-ipc-0");
    let listener = UnixListener::bind(&path).expect("bind");

    let peer = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).expect("read to end");
        rest.len()
    });

    let mut conn = UnixSocketTransport::new().connect(&path).expect("connect");
    assert!(!conn.is_closed());
    conn.close();
    conn.close();
    assert!(conn.is_closed());

    let err = conn.write(b"x").expect_err("closed connection refuses writes");
    assert_eq!(err.kind(), std::io::ErrorKind::NotConnected);
    assert_eq!(peer.join().expect("peer thread"), 0);
}

#[test]
fn missing_socket_is_connect_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let result = UnixSocketTransport::new().connect(&dir.path().join("discord-ipc-0"));
    assert!(matches!(result, Err(AppError::Connect(_))));
}
