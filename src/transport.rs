//! Socket transport used to reach the enclave.
//!
//! The exchange client only needs two things from the operating system:
//! a fresh stream handle and a way to connect it to the peer. Both sit
//! behind [`Transport`] so the client can be driven by an AF_VSOCK socket
//! in production and by other stream sockets or in-memory handles in tests.

use socket2::{Domain, SockAddr, Socket, Type};
use std::fmt;
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::warn;

/// Address of the enclave: a (context id, port) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddress {
    pub cid: u32,
    pub port: u32,
}

impl PeerAddress {
    pub const fn new(cid: u32, port: u32) -> Self {
        Self { cid, port }
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CID={}, Port={}", self.cid, self.port)
    }
}

/// Source of connection-oriented handles bound to a single peer.
///
/// Dropping a handle releases it.
pub trait Transport: fmt::Display {
    type Handle: Read + Write;

    /// Acquire a new, unconnected handle.
    fn open(&self) -> io::Result<Self::Handle>;

    /// Connect a handle obtained from [`Transport::open`] to the peer.
    fn connect(&self, handle: &mut Self::Handle) -> io::Result<()>;
}

/// Stream socket transport backed by `socket2`.
///
/// Every handle gets the same deadline applied to connect, write and read.
/// With no deadline those calls block until the kernel reports an outcome.
pub struct SocketTransport {
    domain: Domain,
    addr: SockAddr,
    label: String,
    io_timeout: Option<Duration>,
}

impl SocketTransport {
    /// AF_VSOCK transport to the given enclave address.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub fn vsock(peer: PeerAddress, io_timeout: Option<Duration>) -> Self {
        Self {
            domain: Domain::VSOCK,
            addr: SockAddr::vsock(peer.cid, peer.port),
            label: format!("vsock {}", peer),
            io_timeout,
        }
    }

    /// AF_UNIX transport, used to run exchanges against a local peer.
    #[cfg(test)]
    pub fn unix(path: &std::path::Path, io_timeout: Option<Duration>) -> io::Result<Self> {
        Ok(Self {
            domain: Domain::UNIX,
            addr: SockAddr::unix(path)?,
            label: format!("unix {}", path.display()),
            io_timeout,
        })
    }
}

impl fmt::Display for SocketTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl Transport for SocketTransport {
    type Handle = Socket;

    fn open(&self) -> io::Result<Socket> {
        let socket = Socket::new(self.domain, Type::STREAM, None).inspect_err(|e| {
            if e.raw_os_error() == Some(libc::EAFNOSUPPORT) {
                warn!(transport = %self, "Address family not supported by this kernel");
            }
        })?;

        // SO_RCVTIMEO / SO_SNDTIMEO; `None` leaves the socket fully blocking.
        socket.set_read_timeout(self.io_timeout)?;
        socket.set_write_timeout(self.io_timeout)?;
        Ok(socket)
    }

    fn connect(&self, socket: &mut Socket) -> io::Result<()> {
        match self.io_timeout {
            Some(timeout) => socket.connect_timeout(&self.addr, timeout),
            None => socket.connect(&self.addr),
        }
    }
}
