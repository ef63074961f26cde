//! Interactive operator loop.
//!
//! Reads one line at a time, turns it into a request and prints a summary of
//! each exchange. A failed exchange is reported and the loop moves on.

use crate::exchange::{ExchangeClient, ExchangeOutcome};
use crate::transport::Transport;
use bytes::Bytes;
use std::io::{self, BufRead, Write};
use tracing::{debug, info, warn};

pub const PROMPT: &str = "Enter text to encrypt (or type exit): ";

const EXIT_SENTINEL: &[u8] = b"exit";

/// Drive exchanges from `input` until `exit` or end of input.
///
/// Only I/O errors on the console itself are returned.
pub fn run_loop<R, W, T>(
    input: &mut R,
    output: &mut W,
    client: &ExchangeClient<T>,
) -> io::Result<()>
where
    R: BufRead,
    W: Write,
    T: Transport,
{
    let mut line = Vec::new();

    loop {
        output.write_all(PROMPT.as_bytes())?;
        output.flush()?;

        line.clear();
        if input.read_until(b'\n', &mut line)? == 0 {
            info!("End of input");
            return Ok(());
        }

        let text = strip_terminator(&line);
        if text == EXIT_SENTINEL {
            info!("Exiting...");
            return Ok(());
        }

        let request = Bytes::copy_from_slice(text);
        info!(len = request.len(), "New encryption request");
        debug!(
            plaintext = ?String::from_utf8_lossy(&request),
            bytes = ?&request[..],
            "Plaintext input"
        );

        match client.perform_exchange(&request) {
            Ok(outcome) => write_summary(output, &request, &outcome)?,
            Err(e) => {
                warn!(error = %e, "Request not completed");
                writeln!(output, "Exchange failed: {}", e)?;
            }
        }
    }
}

/// Strip a trailing `\n` or `\r\n`.
pub fn strip_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn write_summary<W: Write>(
    output: &mut W,
    request: &[u8],
    outcome: &ExchangeOutcome,
) -> io::Result<()> {
    writeln!(output, "=== ENCRYPTION SUMMARY ===")?;
    writeln!(output, "Plaintext: {:?}", String::from_utf8_lossy(request))?;
    writeln!(output, "Encrypted: {:?}", String::from_utf8_lossy(&outcome.response))?;
    writeln!(output, "Plaintext length: {} bytes", request.len())?;
    writeln!(output, "Encrypted length: {} bytes", outcome.response.len())?;
    writeln!(output, "Total round-trip time: {:?}", outcome.metrics.total)?;
    writeln!(output, "==========================")
}
