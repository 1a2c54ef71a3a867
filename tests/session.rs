//! End-to-end session tests against a live server on an ephemeral port.
//!
//! Each test runs its own server on 127.0.0.1:0 with a scratch journal file
//! and a short poll timeout, drives it with plain blocking client sockets,
//! and shuts it down through the same cooperative flag the signal handlers
//! would raise.

use packetlog::config::Config;
use packetlog::server::Server;
use packetlog::shutdown::ShutdownFlag;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

struct TestServer {
    addr: SocketAddr,
    data_file: PathBuf,
    shutdown: ShutdownFlag,
    handle: Option<JoinHandle<std::io::Result<()>>>,
    _dir: tempfile::TempDir,
}

impl TestServer {
    fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let data_file = dir.path().join("journal.data");

        let config = Config {
            listen: "127.0.0.1:0".to_string(),
            data_file: data_file.clone(),
            poll_timeout: Duration::from_millis(50),
            log_level: "info".to_string(),
            daemon: false,
        };

        let shutdown = ShutdownFlag::new();
        let server = Server::bind(&config, shutdown.clone()).unwrap();
        let addr = server.local_addr();
        let handle = std::thread::spawn(move || server.run());

        Self {
            addr,
            data_file,
            shutdown,
            handle: Some(handle),
            _dir: dir,
        }
    }

    fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect(self.addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream
    }

    fn stop(mut self) {
        self.shutdown.raise();
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap().unwrap();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.raise();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn read_reply(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut reply = vec![0u8; len];
    stream.read_exact(&mut reply).unwrap();
    reply
}

#[test]
fn reply_accumulates_on_one_connection() {
    let server = TestServer::start();
    let mut client = server.connect();

    client.write_all(b"hello\n").unwrap();
    assert_eq!(read_reply(&mut client, 6), b"hello\n");

    client.write_all(b"world\n").unwrap();
    assert_eq!(read_reply(&mut client, 12), b"hello\nworld\n");

    server.stop();
}

#[test]
fn undelimited_bytes_get_no_reply_until_completed() {
    let server = TestServer::start();
    let mut client = server.connect();

    client.write_all(b"hel").unwrap();

    // No delimiter yet, so no reply arrives within the short window.
    client
        .set_read_timeout(Some(Duration::from_millis(300)))
        .unwrap();
    let mut probe = [0u8; 1];
    match client.read(&mut probe) {
        Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {}
        other => panic!("expected read timeout, got {other:?}"),
    }

    // Completing the packet yields the whole of it, not just the tail.
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    client.write_all(b"lo\n").unwrap();
    assert_eq!(read_reply(&mut client, 6), b"hello\n");

    server.stop();
}

#[test]
fn two_packets_in_one_send_each_get_a_reply() {
    let server = TestServer::start();
    let mut client = server.connect();

    client.write_all(b"first\nsecond\n").unwrap();

    // Reply to packet 1 is the journal after packet 1; reply to packet 2
    // includes both. They arrive back to back on the same stream.
    assert_eq!(read_reply(&mut client, 6), b"first\n");
    assert_eq!(read_reply(&mut client, 13), b"first\nsecond\n");

    server.stop();
}

#[test]
fn sequential_connections_share_the_journal() {
    let server = TestServer::start();

    let mut first = server.connect();
    first.write_all(b"first\n").unwrap();
    assert_eq!(read_reply(&mut first, 6), b"first\n");
    drop(first);

    let mut second = server.connect();
    second.write_all(b"second\n").unwrap();
    assert_eq!(read_reply(&mut second, 13), b"first\nsecond\n");

    server.stop();
}

#[test]
fn shutdown_with_idle_connection_exits_and_removes_journal() {
    let server = TestServer::start();
    let mut client = server.connect();

    client.write_all(b"payload\n").unwrap();
    assert_eq!(read_reply(&mut client, 8), b"payload\n");

    let data_file = server.data_file.clone();
    assert!(data_file.exists());

    let start = Instant::now();
    server.stop();

    // Worst-case latency is one bounded-timeout period per wait point.
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(!data_file.exists());
}
