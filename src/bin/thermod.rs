//! thermod - temperature poller and single-client broadcaster
//!
//! Reads the board's thermal sensor on a fixed interval, shows the value in
//! Fahrenheit on the console display, and pushes it to at most one connected
//! client.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (foreground)
//! thermod start
//!
//! # Start the daemon (background/daemonized)
//! thermod start -d
//!
//! # Local display only, no listener
//! thermod start --no-wireless
//!
//! # Stop the daemon
//! thermod stop
//!
//! # Check daemon status
//! thermod status
//! ```

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use thermod::devices::HostDevices;
use thermod::{DaemonConfig, SessionManager, TcpAdapter, WirelessAdapter};

/// thermod - temperature broadcaster
#[derive(Parser, Debug)]
#[command(name = "thermod", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Config file (default: $XDG_CONFIG_HOME/thermo/thermod.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        /// Skip the listener and only drive the local display
        #[arg(long)]
        no_wireless: bool,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
}

fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("thermo")
}

fn pid_file_path() -> PathBuf {
    state_dir().join("thermod.pid")
}

fn log_file_path() -> PathBuf {
    state_dir().join("thermod.log")
}

fn read_pid() -> Option<u32> {
    let mut file = File::open(pid_file_path()).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

fn remove_pid_file() {
    let _ = fs::remove_file(pid_file_path());
}

fn is_process_running(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{pid}")).exists()
}

fn is_daemon_running() -> Option<u32> {
    if let Some(pid) = read_pid() {
        if is_process_running(pid) {
            return Some(pid);
        }
        remove_pid_file();
    }
    None
}

fn stop_daemon(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let result = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
        if result != 0 {
            bail!("Failed to send SIGTERM to process {pid}");
        }
    }
    #[cfg(not(unix))]
    {
        bail!("Stop command is only supported on Unix systems");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let command = args.command.unwrap_or(Command::Start {
        daemon: false,
        no_wireless: false,
    });

    match command {
        Command::Start {
            daemon,
            no_wireless,
        } => {
            if let Some(pid) = is_daemon_running() {
                eprintln!("Daemon is already running (PID {pid})");
                eprintln!("Use 'thermod stop' to stop it first.");
                process::exit(1);
            }

            // Fail before forking so config errors reach the terminal
            let mut config = DaemonConfig::load(args.config.as_deref())
                .context("Failed to load configuration")?;
            if no_wireless {
                config.wireless = false;
            }

            if daemon {
                daemonize()?;
            }

            write_pid()?;

            let result = run_daemon(config);

            remove_pid_file();

            result
        }
        Command::Stop => {
            if let Some(pid) = is_daemon_running() {
                println!("Stopping daemon (PID {pid})...");
                stop_daemon(pid)?;

                for _ in 0..50 {
                    if !is_process_running(pid) {
                        println!("Daemon stopped.");
                        return Ok(());
                    }
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }

                eprintln!("Daemon did not stop within 5 seconds.");
                process::exit(1);
            } else {
                println!("Daemon is not running.");
                Ok(())
            }
        }
        Command::Status => {
            if let Some(pid) = is_daemon_running() {
                println!("Daemon is running (PID {pid})");
                print_config_summary(args.config.as_deref());
                Ok(())
            } else {
                println!("Daemon is not running.");
                process::exit(1);
            }
        }
    }
}

fn print_config_summary(path: Option<&Path>) {
    match DaemonConfig::load(path) {
        Ok(config) => {
            println!("Service: {}", config.service);
            if config.wireless {
                println!("Listening on: {}", config.listen_addr);
            } else {
                println!("Listener: disabled");
            }
            println!("Sensor: {}", config.sensor_path.display());
            println!("Poll interval: {} ms", config.poll_interval_ms);
        }
        Err(e) => println!("Config: {e}"),
    }
}

fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = File::create(&log_path).context("Failed to create log file for stderr")?;

    let daemonize = Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr);

    daemonize.start().context("Failed to daemonize")?;

    Ok(())
}

#[tokio::main]
async fn run_daemon(config: DaemonConfig) -> Result<()> {
    // stdout belongs to the console display
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("thermod=info".parse()?)
                .add_directive("thermo_core=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "thermod starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let devices = Arc::new(HostDevices::new(config.sensor_path.clone()));
    let adapter: Option<Arc<dyn WirelessAdapter>> = if config.wireless {
        Some(Arc::new(TcpAdapter::new(config.listen_addr)))
    } else {
        info!("Listener disabled by configuration");
        None
    };

    let mut session = SessionManager::new(config.session_config(), devices, adapter);
    session.start().context("Failed to start session")?;

    tokio::select! {
        _ = cancel_token.cancelled() => {}
        _ = session.terminated() => {
            warn!("Session ended on its own");
        }
    }

    if let Err(e) = session.stop().await {
        error!(error = %e, "Session error");
        return Err(e.into());
    }

    info!("thermod stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
