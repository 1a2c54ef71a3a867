//! Accept loop and orderly teardown.
//!
//! The listener waits for connections with a bounded poll timeout so the
//! shutdown flag is observed promptly even with no traffic. Connections are
//! serviced strictly one at a time: the next accept happens only after the
//! previous connection has fully closed, so the journal never has concurrent
//! writers. On shutdown the listening socket is closed and the journal's
//! backing file is deleted, exactly once, regardless of which wait observed
//! the flag.

use crate::config::Config;
use crate::connection::{Connection, Outcome};
use crate::journal::Journal;
use crate::shutdown::ShutdownFlag;
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{error, info, warn};

const LISTENER_TOKEN: Token = Token(usize::MAX);
const LISTEN_BACKLOG: i32 = 5;

/// Server instance holding the bound listening socket.
pub struct Server {
    listener: std::net::TcpListener,
    local_addr: SocketAddr,
    journal: Journal,
    shutdown: ShutdownFlag,
    poll_timeout: Duration,
}

impl Server {
    /// Create and bind the listening socket. Any failure here is fatal to
    /// process startup.
    pub fn bind(config: &Config, shutdown: ShutdownFlag) -> io::Result<Self> {
        let addr: SocketAddr = config
            .listen
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let listener = create_listener(addr)?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "Server listening");

        Ok(Self {
            listener,
            local_addr,
            journal: Journal::new(&config.data_file),
            shutdown,
            poll_timeout: config.poll_timeout,
        })
    }

    /// Address actually bound. Differs from the configured one when the
    /// configured port was 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run the accept loop until shutdown is requested, then tear down.
    pub fn run(self) -> io::Result<()> {
        let Server {
            listener,
            local_addr: _,
            journal,
            shutdown,
            poll_timeout,
        } = self;

        let mut poll = Poll::new()?;
        let mut events = Events::with_capacity(8);
        let mut listener = TcpListener::from_std(listener);
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        'accept: while !shutdown.is_raised() {
            match poll.poll(&mut events, Some(poll_timeout)) {
                Ok(()) => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(error = %e, "Listener poll failed");
                    break 'accept;
                }
            }

            if events.is_empty() {
                // Bounded wait expired; loop back to re-check the flag.
                continue;
            }

            // Edge-triggered: accept until the listener would block. Each
            // accepted connection is serviced to completion before the next.
            loop {
                if shutdown.is_raised() {
                    break;
                }

                match listener.accept() {
                    Ok((stream, peer)) => {
                        info!(peer = %peer, "Accepted connection");
                        serve_connection(stream, peer, &journal, &shutdown, poll_timeout);
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) => {
                        // Accept failure never takes the listener down.
                        error!(error = %e, "Accept failed");
                        break;
                    }
                }
            }
        }

        if shutdown.is_raised() {
            info!("Caught shutdown request, exiting");
        }

        drop(listener);
        if let Err(e) = journal.remove() {
            warn!(path = %journal.path().display(), error = %e, "Failed to remove journal file");
        }
        info!("Server stopped");
        Ok(())
    }
}

/// Run one connection to completion.
fn serve_connection(
    stream: mio::net::TcpStream,
    peer: SocketAddr,
    journal: &Journal,
    shutdown: &ShutdownFlag,
    poll_timeout: Duration,
) {
    let mut conn = match Connection::new(stream, peer, poll_timeout) {
        Ok(conn) => conn,
        Err(e) => {
            warn!(peer = %peer, error = %e, "Failed to set up connection");
            return;
        }
    };

    match conn.serve(journal, shutdown) {
        Ok(Outcome::Closed) => info!(peer = %peer, "Closed connection"),
        Ok(Outcome::ShutdownRequested) => info!(peer = %peer, "Closing connection for shutdown"),
        Err(e) => warn!(peer = %peer, error = %e, "Connection failed"),
    }
}

/// Create the listening socket: reuse-address, non-blocking, modest backlog.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::thread;
    use std::time::Instant;

    fn test_config(data_file: PathBuf) -> Config {
        Config {
            listen: "127.0.0.1:0".to_string(),
            data_file,
            poll_timeout: Duration::from_millis(50),
            log_level: "info".to_string(),
            daemon: false,
        }
    }

    #[test]
    fn test_bind_reports_local_addr() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path().join("journal.data"));

        let server = Server::bind(&config, ShutdownFlag::new()).unwrap();
        assert_ne!(server.local_addr().port(), 0);
    }

    #[test]
    fn test_bind_rejects_bad_listen_addr() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path().join("journal.data"));
        config.listen = "not-an-address".to_string();

        assert!(Server::bind(&config, ShutdownFlag::new()).is_err());
    }

    #[test]
    fn test_idle_shutdown_within_one_timeout_and_removes_journal() {
        let dir = tempfile::tempdir().unwrap();
        let data_file = dir.path().join("journal.data");
        std::fs::write(&data_file, b"leftover\n").unwrap();

        let config = test_config(data_file.clone());
        let shutdown = ShutdownFlag::new();
        let server = Server::bind(&config, shutdown.clone()).unwrap();

        let handle = thread::spawn(move || server.run());

        let start = Instant::now();
        shutdown.raise();
        handle.join().unwrap().unwrap();

        // One bounded-timeout period, plus slack for teardown.
        assert!(start.elapsed() < Duration::from_millis(500));
        assert!(!data_file.exists());
    }
}
