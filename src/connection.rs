//! Connection state machine for a single exchange.
//!
//! A connection walks `HandleOpen -> Connected -> Sent -> Received` and is
//! closed by consuming it, so a handle can be released only once and never
//! outlives the exchange that opened it. Out-of-order operations are
//! rejected instead of reaching the socket.

use crate::transport::Transport;
use bytes::{Bytes, BytesMut};
use std::io::{self, Read, Write};

/// Current state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Handle acquired, not yet connected.
    HandleOpen,
    /// Connected to the peer, nothing written.
    Connected,
    /// Request written.
    Sent {
        /// Bytes handed to the transport.
        bytes: usize,
    },
    /// Response read; no further I/O allowed.
    Received {
        /// Bytes returned by the single read.
        bytes: usize,
    },
}

/// A single transport handle plus its lifecycle state.
#[derive(Debug)]
pub struct Connection<H> {
    handle: H,
    state: ConnState,
}

impl<H: Read + Write> Connection<H> {
    /// Acquire a fresh handle from the transport.
    pub fn open<T>(transport: &T) -> io::Result<Self>
    where
        T: Transport<Handle = H>,
    {
        Ok(Self {
            handle: transport.open()?,
            state: ConnState::HandleOpen,
        })
    }

    /// Connect the handle to the transport's peer.
    pub fn connect<T>(&mut self, transport: &T) -> io::Result<()>
    where
        T: Transport<Handle = H>,
    {
        self.require_state(ConnState::HandleOpen, "connect")?;
        transport.connect(&mut self.handle)?;
        self.state = ConnState::Connected;
        Ok(())
    }

    /// Write the whole request.
    pub fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.require_state(ConnState::Connected, "send")?;
        self.handle.write_all(data)?;
        self.state = ConnState::Sent { bytes: data.len() };
        Ok(())
    }

    /// Perform exactly one read of at most `max` bytes.
    ///
    /// Whatever that read returns is the response, including nothing at all.
    pub fn receive(&mut self, max: usize) -> io::Result<Bytes> {
        if !matches!(self.state, ConnState::Sent { .. }) {
            return Err(out_of_order("receive", self.state));
        }
        let mut buf = BytesMut::zeroed(max);
        let n = self.handle.read(&mut buf)?;
        buf.truncate(n);
        self.state = ConnState::Received { bytes: n };
        Ok(buf.freeze())
    }

    /// Current state of the connection.
    #[cfg(test)]
    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Release the handle, returning the state it was closed in.
    pub fn close(self) -> ConnState {
        let state = self.state;
        drop(self.handle);
        state
    }

    fn require_state(&self, want: ConnState, op: &str) -> io::Result<()> {
        if self.state == want {
            Ok(())
        } else {
            Err(out_of_order(op, self.state))
        }
    }
}

fn out_of_order(op: &str, state: ConnState) -> io::Error {
    io::Error::other(format!("{} not allowed in state {:?}", op, state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{FailAt, MockTransport};

    #[test]
    fn test_connection_state_transitions() {
        let transport = MockTransport::replying(b"PONG");
        let mut conn = Connection::open(&transport).unwrap();
        assert_eq!(conn.state(), ConnState::HandleOpen);

        conn.connect(&transport).unwrap();
        assert_eq!(conn.state(), ConnState::Connected);

        conn.send(b"ping").unwrap();
        assert_eq!(conn.state(), ConnState::Sent { bytes: 4 });

        let response = conn.receive(4096).unwrap();
        assert_eq!(&response[..], b"PONG");
        assert_eq!(conn.state(), ConnState::Received { bytes: 4 });

        assert_eq!(conn.close(), ConnState::Received { bytes: 4 });
        assert_eq!(transport.counters.released.get(), 1);
    }

    #[test]
    fn test_receive_is_bounded_by_max() {
        let transport = MockTransport::replying(&[b'x'; 100]);
        let mut conn = Connection::open(&transport).unwrap();
        conn.connect(&transport).unwrap();
        conn.send(b"").unwrap();

        let response = conn.receive(16).unwrap();
        assert_eq!(response.len(), 16);
    }

    #[test]
    fn test_receive_takes_only_the_first_chunk() {
        let transport = MockTransport::replying_in_chunks(&[&b"AB"[..], &b"CD"[..]]);
        let mut conn = Connection::open(&transport).unwrap();
        conn.connect(&transport).unwrap();
        conn.send(b"x").unwrap();

        let response = conn.receive(4096).unwrap();
        assert_eq!(&response[..], b"AB");
        assert_eq!(conn.state(), ConnState::Received { bytes: 2 });
    }

    #[test]
    fn test_empty_reply_is_a_response() {
        let transport = MockTransport::replying(b"");
        let mut conn = Connection::open(&transport).unwrap();
        conn.connect(&transport).unwrap();
        conn.send(b"hi").unwrap();

        assert!(conn.receive(4096).unwrap().is_empty());
        assert_eq!(conn.state(), ConnState::Received { bytes: 0 });
    }

    #[test]
    fn test_out_of_order_operations_rejected() {
        let transport = MockTransport::replying(b"PONG");
        let mut conn = Connection::open(&transport).unwrap();

        assert!(conn.send(b"early").is_err());
        assert!(conn.receive(16).is_err());
        assert!(transport.counters.sent.borrow().is_empty());

        conn.connect(&transport).unwrap();
        assert!(conn.connect(&transport).is_err());

        conn.send(b"once").unwrap();
        assert!(conn.send(b"twice").is_err());
        assert_eq!(&transport.counters.sent.borrow()[..], b"once");

        conn.receive(16).unwrap();
        assert!(conn.receive(16).is_err());
    }

    #[test]
    fn test_failed_connect_keeps_state() {
        let transport = MockTransport::failing_at(FailAt::Connect);
        let mut conn = Connection::open(&transport).unwrap();

        assert!(conn.connect(&transport).is_err());
        assert_eq!(conn.close(), ConnState::HandleOpen);
        assert_eq!(transport.counters.released.get(), 1);
    }
}
