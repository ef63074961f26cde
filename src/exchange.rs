//! One request/response round trip against the enclave.
//!
//! Each exchange opens its own connection, writes the request once, reads
//! once, and closes the connection before returning. Nothing is retried and
//! nothing is kept between exchanges.

use crate::connection::Connection;
use crate::transport::Transport;
use bytes::Bytes;
use std::fmt;
use std::io;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Timing samples for a single exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeMetrics {
    /// Time spent connecting the handle.
    pub connect: Duration,
    /// Time spent writing the request.
    pub send: Duration,
    /// Time spent in the single read.
    pub receive: Duration,
    /// From handle creation until the response was read.
    pub total: Duration,
}

/// Result of a successful exchange.
#[derive(Debug, Clone)]
pub struct ExchangeOutcome {
    pub response: Bytes,
    pub metrics: ExchangeMetrics,
}

/// Failure of a single exchange. None of these are fatal to the process.
#[derive(Debug)]
pub enum ExchangeError {
    HandleCreationFailed(io::Error),
    ConnectFailed(io::Error),
    SendFailed(io::Error),
    ReceiveFailed(io::Error),
}

impl fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeError::HandleCreationFailed(e) => write!(f, "Failed to create socket: {}", e),
            ExchangeError::ConnectFailed(e) => write!(f, "Failed to connect to enclave: {}", e),
            ExchangeError::SendFailed(e) => write!(f, "Failed to send request: {}", e),
            ExchangeError::ReceiveFailed(e) => write!(f, "Failed to receive response: {}", e),
        }
    }
}

impl std::error::Error for ExchangeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExchangeError::HandleCreationFailed(e)
            | ExchangeError::ConnectFailed(e)
            | ExchangeError::SendFailed(e)
            | ExchangeError::ReceiveFailed(e) => Some(e),
        }
    }
}

/// Client performing serial, one-shot exchanges over a transport.
pub struct ExchangeClient<T> {
    transport: T,
    receive_buffer_size: usize,
}

impl<T: Transport> ExchangeClient<T> {
    pub fn new(transport: T, receive_buffer_size: usize) -> Self {
        Self {
            transport,
            receive_buffer_size,
        }
    }

    /// Get a reference to the transport for testing
    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send `request` and return the bytes produced by a single read.
    ///
    /// The connection is closed before this returns, on every path.
    pub fn perform_exchange(&self, request: &Bytes) -> Result<ExchangeOutcome, ExchangeError> {
        info!(peer = %self.transport, "Attempting to connect to enclave");
        let start = Instant::now();

        let mut conn = Connection::open(&self.transport).map_err(|e| {
            error!(peer = %self.transport, error = %e, "Error creating socket");
            ExchangeError::HandleCreationFailed(e)
        })?;
        debug!("Created socket");

        let connect_start = Instant::now();
        if let Err(e) = conn.connect(&self.transport) {
            return Err(abort(conn, ExchangeError::ConnectFailed(e)));
        }
        let connect = connect_start.elapsed();
        info!(elapsed = ?connect, "Connected to enclave");

        info!(bytes = request.len(), "Sending request");
        let send_start = Instant::now();
        if let Err(e) = conn.send(request) {
            return Err(abort(conn, ExchangeError::SendFailed(e)));
        }
        let send = send_start.elapsed();
        debug!(elapsed = ?send, "Request sent");

        debug!(max = self.receive_buffer_size, "Waiting for response");
        let receive_start = Instant::now();
        let response = match conn.receive(self.receive_buffer_size) {
            Ok(response) => response,
            Err(e) => return Err(abort(conn, ExchangeError::ReceiveFailed(e))),
        };
        let received_at = Instant::now();
        let metrics = ExchangeMetrics {
            connect,
            send,
            receive: received_at - receive_start,
            total: received_at - start,
        };
        info!(
            bytes = response.len(),
            connect = ?metrics.connect,
            send = ?metrics.send,
            elapsed = ?metrics.receive,
            total = ?metrics.total,
            "Received response"
        );
        debug!(
            response = ?String::from_utf8_lossy(&response),
            bytes = ?&response[..],
            "Encrypted result"
        );
        if !request.is_empty() {
            debug!(
                ratio = response.len() as f64 / request.len() as f64,
                "Response/request size ratio"
            );
        }

        conn.close();
        debug!("Connection closed");

        Ok(ExchangeOutcome { response, metrics })
    }
}

/// Log a failed exchange and release its connection.
fn abort<H: io::Read + io::Write>(conn: Connection<H>, err: ExchangeError) -> ExchangeError {
    let state = conn.close();
    error!(state = ?state, error = %err, "Exchange failed, connection closed");
    err
}
