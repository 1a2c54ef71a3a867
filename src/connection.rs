//! Per-connection service loop.
//!
//! One connection is serviced at a time, by a small state machine: wait for
//! readability with a bounded timeout, drain the socket into the packet
//! assembler, and after each completed packet append it to the journal and
//! stream the full journal content back. The bounded wait keeps the loop
//! responsive to shutdown even while the peer is idle.
//!
//! Journal append/read failures and reply send failures abort only the reply
//! for that packet; the connection stays open and keeps receiving. Only peer
//! disconnect, a fatal socket error, or a shutdown request ends the loop.

use crate::journal::{Journal, CHUNK_SIZE};
use crate::packet::PacketAssembler;
use crate::shutdown::ShutdownFlag;
use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token};
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, warn};

const CONN_TOKEN: Token = Token(0);

/// Why the service loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Peer closed the connection, or a fatal socket error closed it for us.
    Closed,
    /// The shutdown flag was raised while the connection was active.
    ShutdownRequested,
}

/// A single client connection.
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    assembler: PacketAssembler,
    poll: Poll,
    events: Events,
    poll_timeout: Duration,
}

impl Connection {
    /// Register the (already non-blocking) accepted stream for readiness
    /// polling.
    pub fn new(stream: TcpStream, peer: SocketAddr, poll_timeout: Duration) -> io::Result<Self> {
        let poll = Poll::new()?;
        let mut stream = stream;
        poll.registry()
            .register(&mut stream, CONN_TOKEN, Interest::READABLE)?;

        Ok(Self {
            stream,
            peer,
            assembler: PacketAssembler::new(),
            poll,
            events: Events::with_capacity(4),
            poll_timeout,
        })
    }

    /// Drive the connection until the peer disconnects, a fatal socket error
    /// occurs, or shutdown is requested.
    pub fn serve(&mut self, journal: &Journal, shutdown: &ShutdownFlag) -> io::Result<Outcome> {
        let mut recv_buf = [0u8; CHUNK_SIZE];

        loop {
            if shutdown.is_raised() {
                return Ok(Outcome::ShutdownRequested);
            }

            match self.poll.poll(&mut self.events, Some(self.poll_timeout)) {
                Ok(()) => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            if self.events.is_empty() {
                // Bounded wait expired; loop back to re-check the flag.
                continue;
            }

            // Events are edge-triggered: drain the socket until it would
            // block.
            loop {
                match self.stream.read(&mut recv_buf) {
                    Ok(0) => {
                        debug!(peer = %self.peer, "Peer closed connection");
                        return Ok(Outcome::Closed);
                    }
                    Ok(n) => {
                        self.assembler.extend(&recv_buf[..n]);
                        while let Some(packet) = self.assembler.next_packet() {
                            self.commit_and_reply(&packet, journal, shutdown);
                            if shutdown.is_raised() {
                                return Ok(Outcome::ShutdownRequested);
                            }
                        }
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        warn!(peer = %self.peer, error = %e, "Receive failed");
                        return Ok(Outcome::Closed);
                    }
                }
            }
        }
    }

    /// Append a completed packet to the journal, then stream the full journal
    /// content back to the peer. Failures abort the reply but leave the
    /// connection receiving.
    fn commit_and_reply(&mut self, packet: &[u8], journal: &Journal, shutdown: &ShutdownFlag) {
        debug!(peer = %self.peer, bytes = packet.len(), "Packet complete");

        if let Err(e) = journal.append(packet) {
            warn!(path = %journal.path().display(), error = %e, "Journal append failed");
            return;
        }

        let (mut reader, size) = match journal.open_reader() {
            Ok(r) => r,
            Err(e) => {
                warn!(path = %journal.path().display(), error = %e, "Journal open failed, skipping reply");
                return;
            }
        };

        let mut chunk = [0u8; CHUNK_SIZE];
        let mut sent: u64 = 0;
        while sent < size {
            let n = match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!(path = %journal.path().display(), error = %e, "Journal read failed mid-reply");
                    return;
                }
            };

            if let Err(e) = self.send_all(&chunk[..n], shutdown) {
                warn!(peer = %self.peer, error = %e, "Reply send failed");
                return;
            }
            if shutdown.is_raised() {
                return;
            }
            sent += n as u64;
        }
    }

    /// Write `bytes` fully, waiting (bounded) for writability as needed.
    ///
    /// Returns without error if shutdown is raised mid-wait; the caller
    /// re-checks the flag.
    fn send_all(&mut self, bytes: &[u8], shutdown: &ShutdownFlag) -> io::Result<()> {
        let mut written = 0;
        while written < bytes.len() {
            match self.stream.write(&bytes[written..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "peer stopped accepting data",
                    ));
                }
                Ok(n) => written += n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if shutdown.is_raised() {
                        return Ok(());
                    }
                    self.wait_writable()?;
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// One bounded wait for writability, then restore read interest.
    fn wait_writable(&mut self) -> io::Result<()> {
        self.poll
            .registry()
            .reregister(&mut self.stream, CONN_TOKEN, Interest::WRITABLE)?;

        let result = self.poll.poll(&mut self.events, Some(self.poll_timeout));

        self.poll
            .registry()
            .reregister(&mut self.stream, CONN_TOKEN, Interest::READABLE)?;

        match result {
            Ok(()) => Ok(()),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => Ok(()),
            Err(e) => Err(e),
        }
    }
}
