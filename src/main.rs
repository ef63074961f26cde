//! vsock-connector: interactive client for an enclave reachable over vsock
//!
//! Each line typed by the operator is sent to the enclave as raw bytes over
//! a fresh AF_VSOCK stream connection. The reply from a single read is
//! printed together with the round-trip time, then the connection is closed.
//!
//! Features:
//! - One connection per request, closed on every path
//! - Per-operation I/O deadline
//! - Configuration via CLI arguments or TOML file

mod config;
mod connection;
mod console;
mod exchange;
mod transport;

use config::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging; stdout belongs to the console
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(
        cid = config.peer.cid,
        port = config.peer.port,
        receive_buffer_size = config.receive_buffer_size,
        io_timeout = ?config.io_timeout,
        "Starting vsock connector client"
    );

    run(config)
}

/// Run the interactive loop against the configured enclave.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    use exchange::ExchangeClient;
    use transport::SocketTransport;

    let transport = SocketTransport::vsock(config.peer, config.io_timeout);
    let client = ExchangeClient::new(transport, config.receive_buffer_size);

    let mut input = std::io::stdin().lock();
    let mut output = std::io::stdout().lock();
    console::run_loop(&mut input, &mut output, &client)?;
    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn run(_config: Config) -> Result<(), Box<dyn std::error::Error>> {
    Err(Box::new(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "Unsupported platform: AF_VSOCK is only available on Linux",
    )))
}
