//! packetlog: a line-delimited packet journal server.
//!
//! Clients send arbitrary bytes over TCP; every `\n`-terminated packet is
//! appended to an on-disk journal, and the full journal content is echoed
//! back after each append. Connections are serviced strictly one at a time
//! on a single thread; non-blocking sockets with bounded poll timeouts keep
//! the process responsive to SIGINT/SIGTERM even while idle.

pub mod config;
pub mod connection;
pub mod daemon;
pub mod journal;
pub mod packet;
pub mod server;
pub mod shutdown;
