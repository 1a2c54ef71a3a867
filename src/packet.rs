//! Packet framing.
//!
//! A packet is any byte sequence terminated by `\n`, delimiter included.
//! Received bytes accumulate in a growable buffer until a delimiter completes
//! a packet; bytes after the delimiter stay buffered as the start of the next
//! packet. The buffer has no upper bound; arbitrarily long packets are
//! accepted.

use bytes::{Bytes, BytesMut};

/// Packet delimiter byte.
pub const DELIMITER: u8 = b'\n';

/// Accumulates received bytes and splits off completed packets.
#[derive(Debug, Default)]
pub struct PacketAssembler {
    buf: BytesMut,
}

impl PacketAssembler {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    /// Feed newly received bytes into the assembly buffer.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Take the next completed packet, delimiter included.
    ///
    /// Only the bytes up to and including the first delimiter are split off;
    /// anything after it remains buffered. Call repeatedly to drain a receive
    /// that carried more than one packet.
    pub fn next_packet(&mut self) -> Option<Bytes> {
        let pos = self.buf.iter().position(|&b| b == DELIMITER)?;
        Some(self.buf.split_to(pos + 1).freeze())
    }

    /// Bytes currently buffered without a completing delimiter.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
