// Message/body channel over one byte stream

use std::fmt;
use std::io::{Read, Write};
use std::net::TcpStream;
use crate::common::error::Result;
use crate::common::types::MAX_FRAME_SIZE;
use crate::protocol::codec::{self, BodyCopy};
use crate::protocol::messages::Message;

/// Counters for one connection
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub body_bytes_sent: u64,
    pub body_bytes_received: u64,
}

/// A framed connection: messages and raw bodies share one ordered stream.
///
/// Each connection is owned by exactly one session, so a frame is always
/// written in one piece and never interleaved with another.
pub struct Connection<S> {
    stream: S,
    peer: String,
    stats: ConnectionStats,
    max_frame: usize,
}

impl Connection<TcpStream> {
    /// Wrap an accepted or connected TCP stream
    pub fn from_tcp(stream: TcpStream) -> Result<Self> {
        let peer = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream, peer))
    }
}

impl<S: Read + Write> Connection<S> {
    pub fn new(stream: S, peer: impl fmt::Display) -> Self {
        Self {
            stream,
            peer: peer.to_string(),
            stats: ConnectionStats::default(),
            max_frame: MAX_FRAME_SIZE,
        }
    }

    /// Largest incoming frame payload accepted by [`receive`](Self::receive)
    pub fn with_max_frame_size(mut self, max_frame: usize) -> Self {
        self.max_frame = max_frame;
        self
    }

    pub fn send(&mut self, message: &Message) -> Result<()> {
        codec::write_message(&mut self.stream, message)?;
        self.stats.messages_sent += 1;
        log::debug!("[{}] -> {}", self.peer, message.kind());
        Ok(())
    }

    /// Next message, or `None` once the peer has closed cleanly
    pub fn receive(&mut self) -> Result<Option<Message>> {
        let message = codec::read_message_limited(&mut self.stream, self.max_frame)?;
        if let Some(msg) = &message {
            self.stats.messages_received += 1;
            log::debug!("[{}] <- {}", self.peer, msg.kind());
        }
        Ok(message)
    }

    pub fn send_body(&mut self, body: &[u8]) -> Result<()> {
        codec::write_body(&mut self.stream, body)?;
        self.stats.body_bytes_sent += body.len() as u64;
        Ok(())
    }

    /// Stream exactly `size` bytes from `source` as a body
    pub fn send_body_from<R: Read + ?Sized>(&mut self, source: &mut R, size: u64) -> Result<u64> {
        let sent = codec::copy_body(source, size, &mut self.stream)?;
        self.stats.body_bytes_sent += sent;
        Ok(sent)
    }

    pub fn receive_body(&mut self, size: u64) -> Result<Vec<u8>> {
        let body = codec::read_body(&mut self.stream, size)?;
        self.stats.body_bytes_received += body.len() as u64;
        Ok(body)
    }

    /// Consume exactly `size` body bytes, handing them to `sink`
    pub fn receive_body_into<W: Write + ?Sized>(&mut self, size: u64, sink: &mut W) -> Result<BodyCopy> {
        let outcome = codec::read_body_into(&mut self.stream, size, sink)?;
        self.stats.body_bytes_received += outcome.received;
        Ok(outcome)
    }

    /// Peer identity used in log lines
    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn stats(&self) -> ConnectionStats {
        self.stats
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}
