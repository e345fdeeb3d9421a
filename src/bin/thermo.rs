//! thermo - watch the readings a thermod instance broadcasts
//!
//! # Usage
//!
//! ```text
//! thermo                          # Connect to 127.0.0.1:5150 and print readings
//! thermo --addr 10.0.0.7:5150     # Another host
//! thermo --count 3                # Exit after three readings
//! ```
//!
//! The daemon serves one client at a time. While another client is
//! connected the connection is refused; use `--retry` to keep trying.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use thermo_core::format_temperature;
use thermo_protocol::decode_reading;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Delay between connection attempts with `--retry`
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Largest chunk read from the daemon at once
const READ_BUFFER: usize = 256;

/// thermo - temperature watch client
#[derive(Parser, Debug)]
#[command(name = "thermo", version, about)]
struct Args {
    /// Daemon address
    #[arg(short, long, default_value = "127.0.0.1:5150")]
    addr: SocketAddr,

    /// Exit after this many readings
    #[arg(short = 'n', long)]
    count: Option<usize>,

    /// Keep retrying while the daemon refuses the connection
    #[arg(long)]
    retry: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("thermo=warn".parse()?))
        .init();

    let mut stream = connect(args.addr, args.retry).await?;
    info!(addr = %args.addr, "Connected");

    let mut buf = [0u8; READ_BUFFER];
    let mut seen = 0usize;
    loop {
        let n = stream
            .read(&mut buf)
            .await
            .context("Connection to daemon failed")?;
        if n == 0 {
            println!("Daemon closed the connection.");
            return Ok(());
        }

        // Values are unframed; one read usually carries exactly one of them.
        let text = String::from_utf8_lossy(&buf[..n]);
        match decode_reading(&text) {
            Ok(value) => println!("{} °F", format_temperature(value)),
            Err(e) => {
                warn!(error = %e, "Could not decode chunk");
                println!("{}", text.trim());
            }
        }

        seen += 1;
        if args.count.is_some_and(|limit| seen >= limit) {
            return Ok(());
        }
    }
}

async fn connect(addr: SocketAddr, retry: bool) -> Result<TcpStream> {
    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) if retry => {
                debug!(addr = %addr, error = %e, "Connect failed, retrying");
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(e) => bail!("Cannot connect to {addr}: {e} (is thermod running, or is another client connected?)"),
        }
    }
}
