// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Boots a real server on a loopback port and drives it with a plain
//! `TcpStream`, exercising the wire protocol end to end rather than calling
//! into the store directly.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use kvshard::config::Cli;
use kvshard::server::Server;
use serial_test::serial;

const HOST: &str = "127.0.0.1";
const PORT: u16 = 16380;

fn test_cli() -> Cli {
    Cli {
        host: HOST.to_string(),
        port: PORT,
        io_handlers: Some(1),
        workers: Some(2),
        queue_capacity: 64,
        branching_factor: 8,
        diagnostics_port: 0,
    }
}

/// Spawns the server in the background and blocks until its listener
/// accepts connections (or panics after a generous timeout).
fn spawn_server() -> thread::JoinHandle<()> {
    let handle = thread::spawn(|| {
        if let Err(e) = Server::new(test_cli()).run() {
            panic!("server exited with error: {e}");
        }
    });

    for _ in 0..100 {
        if TcpStream::connect((HOST, PORT)).is_ok() {
            return handle;
        }
        thread::sleep(Duration::from_millis(20));
    }
    panic!("server never started listening on {HOST}:{PORT}");
}

fn shutdown_server(handle: thread::JoinHandle<()>) {
    unsafe {
        libc::raise(libc::SIGTERM);
    }
    handle.join().expect("server thread panicked");
}

/// Sends one already-encoded RESP command and reads back exactly `expect_len`
/// bytes of reply (the caller knows the reply shape in advance).
fn roundtrip(stream: &mut TcpStream, request: &[u8], expect_len: usize) -> Vec<u8> {
    stream.write_all(request).unwrap();
    let mut buf = vec![0u8; expect_len];
    stream.read_exact(&mut buf).unwrap();
    buf
}

fn encode_command(parts: &[&str]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", parts.len()).into_bytes();
    for part in parts {
        out.extend_from_slice(format!("${}\r\n{}\r\n", part.len(), part).as_bytes());
    }
    out
}

#[test]
#[serial]
fn ping_and_set_get_round_trip() {
    let server = spawn_server();
    let mut stream = TcpStream::connect((HOST, PORT)).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let reply = roundtrip(&mut stream, &encode_command(&["PING"]), 7);
    assert_eq!(reply, b"+PONG\r\n");

    let reply = roundtrip(&mut stream, &encode_command(&["SET", "greeting", "hello"]), 5);
    assert_eq!(reply, b"+OK\r\n");

    let reply = roundtrip(&mut stream, &encode_command(&["GET", "greeting"]), 11);
    assert_eq!(reply, b"$5\r\nhello\r\n");

    shutdown_server(server);
}

#[test]
#[serial]
fn set_with_px_expires_the_key() {
    let server = spawn_server();
    let mut stream = TcpStream::connect((HOST, PORT)).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let reply = roundtrip(&mut stream, &encode_command(&["SET", "ephemeral", "v", "PX", "50"]), 5);
    assert_eq!(reply, b"+OK\r\n");

    thread::sleep(Duration::from_millis(150));

    let reply = roundtrip(&mut stream, &encode_command(&["GET", "ephemeral"]), 5);
    assert_eq!(reply, b"$-1\r\n");

    shutdown_server(server);
}

#[test]
#[serial]
fn zadd_zrange_orders_by_score_and_breaks_ties_lexically() {
    let server = spawn_server();
    let mut stream = TcpStream::connect((HOST, PORT)).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    for (score, member) in [("1", "b"), ("1", "a"), ("2", "c")] {
        let reply = roundtrip(&mut stream, &encode_command(&["ZADD", "board", score, member]), 4);
        assert_eq!(reply, b":1\r\n");
    }

    let expected = b"*3\r\n$1\r\na\r\n$1\r\nb\r\n$1\r\nc\r\n".to_vec();
    let reply = roundtrip(&mut stream, &encode_command(&["ZRANGE", "board", "0", "-1"]), expected.len());
    assert_eq!(reply, expected);

    let with_scores = encode_command(&["ZRANGE", "board", "0", "-1", "WITHSCORES"]);
    let expected_with_scores = b"*6\r\n$1\r\na\r\n$8\r\n1.000000\r\n$1\r\nb\r\n$8\r\n1.000000\r\n$1\r\nc\r\n$8\r\n2.000000\r\n".to_vec();
    let reply = roundtrip(&mut stream, &with_scores, expected_with_scores.len());
    assert_eq!(reply, expected_with_scores);

    shutdown_server(server);
}

#[test]
#[serial]
fn zrem_drops_the_key_once_empty() {
    let server = spawn_server();
    let mut stream = TcpStream::connect((HOST, PORT)).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let reply = roundtrip(&mut stream, &encode_command(&["ZADD", "lonely", "1", "only"]), 4);
    assert_eq!(reply, b":1\r\n");

    let reply = roundtrip(&mut stream, &encode_command(&["ZREM", "lonely", "only"]), 4);
    assert_eq!(reply, b":1\r\n");

    let reply = roundtrip(&mut stream, &encode_command(&["ZCARD", "lonely"]), 4);
    assert_eq!(reply, b":0\r\n");

    let reply = roundtrip(&mut stream, &encode_command(&["EXISTS", "lonely"]), 4);
    assert_eq!(reply, b":0\r\n");

    shutdown_server(server);
}

#[test]
#[serial]
fn zrem_removes_several_members_in_one_call() {
    let server = spawn_server();
    let mut stream = TcpStream::connect((HOST, PORT)).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let reply = roundtrip(
        &mut stream,
        &encode_command(&["ZADD", "z", "1", "a", "2", "b", "3", "c"]),
        4,
    );
    assert_eq!(reply, b":3\r\n");

    let reply = roundtrip(&mut stream, &encode_command(&["ZREM", "z", "a", "b", "c"]), 4);
    assert_eq!(reply, b":3\r\n");

    let reply = roundtrip(&mut stream, &encode_command(&["EXISTS", "z"]), 4);
    assert_eq!(reply, b":0\r\n");

    shutdown_server(server);
}

#[test]
#[serial]
fn zadd_rescore_of_an_existing_member_counts_as_added() {
    let server = spawn_server();
    let mut stream = TcpStream::connect((HOST, PORT)).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let reply = roundtrip(&mut stream, &encode_command(&["ZADD", "z", "1", "a"]), 4);
    assert_eq!(reply, b":1\r\n");

    // Same score again: a no-op, nothing added.
    let reply = roundtrip(&mut stream, &encode_command(&["ZADD", "z", "1", "a"]), 4);
    assert_eq!(reply, b":0\r\n");

    // Different score: a rescore, which still counts as added.
    let reply = roundtrip(&mut stream, &encode_command(&["ZADD", "z", "2", "a"]), 4);
    assert_eq!(reply, b":1\r\n");

    shutdown_server(server);
}

#[test]
#[serial]
fn cms_initbydim_incrby_and_query_round_trip() {
    let server = spawn_server();
    let mut stream = TcpStream::connect((HOST, PORT)).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let reply = roundtrip(&mut stream, &encode_command(&["CMS.INITBYDIM", "sketch", "2000", "5"]), 5);
    assert_eq!(reply, b"+OK\r\n");

    let reply = roundtrip(&mut stream, &encode_command(&["CMS.INCRBY", "sketch", "apple", "3"]), 8);
    assert_eq!(reply, b"*1\r\n:3\r\n");

    let reply = roundtrip(&mut stream, &encode_command(&["CMS.INCRBY", "sketch", "apple", "2"]), 8);
    assert_eq!(reply, b"*1\r\n:5\r\n");

    let expected = b"*1\r\n:5\r\n".to_vec();
    let reply = roundtrip(&mut stream, &encode_command(&["CMS.QUERY", "sketch", "apple"]), expected.len());
    assert_eq!(reply, expected);

    shutdown_server(server);
}

#[test]
#[serial]
fn cms_initbydim_against_a_string_key_returns_wrongtype() {
    let server = spawn_server();
    let mut stream = TcpStream::connect((HOST, PORT)).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let reply = roundtrip(&mut stream, &encode_command(&["SET", "strkey", "v"]), 5);
    assert_eq!(reply, b"+OK\r\n");

    stream
        .write_all(&encode_command(&["CMS.INITBYDIM", "strkey", "2000", "5"]))
        .unwrap();
    let mut buf = [0u8; 256];
    let n = stream.read(&mut buf).unwrap();
    let text = String::from_utf8_lossy(&buf[..n]);
    assert!(text.starts_with('-'), "expected an error reply, got {text:?}");
    assert!(text.to_uppercase().contains("WRONGTYPE"), "expected WRONGTYPE in {text:?}");

    shutdown_server(server);
}

#[test]
#[serial]
fn cms_incrby_reports_the_overflow_sentinel_once_saturated() {
    let server = spawn_server();
    let mut stream = TcpStream::connect((HOST, PORT)).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let reply = roundtrip(&mut stream, &encode_command(&["CMS.INITBYDIM", "sat", "2000", "5"]), 5);
    assert_eq!(reply, b"+OK\r\n");

    // A single increment by u32::MAX saturates the counter immediately.
    let expected = b"*1\r\n:4294967295\r\n".to_vec();
    let reply = roundtrip(
        &mut stream,
        &encode_command(&["CMS.INCRBY", "sat", "apple", "4294967295"]),
        expected.len(),
    );
    assert_eq!(reply, expected);

    stream
        .write_all(&encode_command(&["CMS.INCRBY", "sat", "apple", "1"]))
        .unwrap();
    let mut buf = [0u8; 256];
    let n = stream.read(&mut buf).unwrap();
    let text = String::from_utf8_lossy(&buf[..n]).into_owned();
    assert!(
        text.contains("CMS: INCRBY overflow"),
        "expected the overflow sentinel in {text:?}"
    );

    shutdown_server(server);
}

#[test]
#[serial]
fn sadd_on_a_string_key_returns_wrongtype() {
    let server = spawn_server();
    let mut stream = TcpStream::connect((HOST, PORT)).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let reply = roundtrip(&mut stream, &encode_command(&["SET", "strkey", "v"]), 5);
    assert_eq!(reply, b"+OK\r\n");

    stream.write_all(&encode_command(&["SADD", "strkey", "member"])).unwrap();
    let mut buf = [0u8; 256];
    let n = stream.read(&mut buf).unwrap();
    let text = String::from_utf8_lossy(&buf[..n]);
    assert!(text.starts_with('-'), "expected an error reply, got {text:?}");
    assert!(text.to_uppercase().contains("WRONGTYPE"), "expected WRONGTYPE in {text:?}");

    shutdown_server(server);
}
