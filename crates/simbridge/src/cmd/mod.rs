use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod blackboard;
pub mod bridge;
pub mod listen;
pub mod telemetry;
pub mod version;

/// Port the command-bus bridge listens on unless told otherwise.
pub const DEFAULT_BRIDGE_PORT: u16 = 12020;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Forward JSON commands from TCP clients to the command bus.
    Bridge(BridgeArgs),
    /// Accept line-delimited messages and print them.
    Listen(ListenArgs),
    /// Connect to the physics engine and print its latest telemetry.
    Telemetry(TelemetryArgs),
    /// Print a snapshot of the shared-memory blackboard.
    Blackboard(BlackboardArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Bridge(args) => bridge::run(args),
        Command::Listen(args) => listen::run(args, format),
        Command::Telemetry(args) => telemetry::run(args, format),
        Command::Blackboard(args) => blackboard::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct BridgeArgs {
    /// TCP port to accept command clients on.
    #[arg(long, env = "SIMBRIDGE_BRIDGE_PORT", default_value_t = DEFAULT_BRIDGE_PORT)]
    pub port: u16,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// TCP port to accept clients on.
    #[arg(long, env = "SIMBRIDGE_LISTEN_PORT", default_value_t = DEFAULT_BRIDGE_PORT)]
    pub port: u16,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct TelemetryArgs {
    /// Physics engine host.
    #[arg(long, env = "SIMBRIDGE_HOST", default_value = "localhost")]
    pub host: String,
    /// Telemetry port on the physics engine.
    #[arg(long, env = "SIMBRIDGE_TELEMETRY_PORT")]
    pub port: u16,
    /// Command port on the physics engine. Absent or 0 disables commands.
    #[arg(long, env = "SIMBRIDGE_COMMAND_PORT")]
    pub command_port: Option<u16>,
    /// Command to send once connected (repeatable).
    #[arg(long = "send", value_name = "COMMAND")]
    pub commands: Vec<String>,
    /// Retries after the first failed connection attempt.
    #[arg(long, env = "SIMBRIDGE_MAX_ATTEMPTS", default_value_t = 5)]
    pub max_attempts: u32,
    /// Wait between connection attempts (e.g. 5s, 500ms).
    #[arg(long, env = "SIMBRIDGE_RETRY_WAIT", default_value = "5s")]
    pub retry_wait: String,
    /// How often to sample the latest data point (e.g. 1s, 250ms).
    #[arg(long, default_value = "1s")]
    pub interval: String,
    /// Exit after printing N data points.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct BlackboardArgs {
    /// Shared-memory segment name.
    #[arg(long, env = "SIMBRIDGE_BLACKBOARD", default_value = "Blackboard")]
    pub name: String,
    /// Print every blackboard field instead of the sensor view.
    #[arg(long)]
    pub full: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `5s`, `250ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Clear `running` on Ctrl-C. When `wake_port` is set, also connect to that
/// local port so a server blocked in its readiness wait notices the flag.
pub fn install_ctrlc_handler(running: Arc<AtomicBool>, wake_port: Option<u16>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
        if let Some(port) = wake_port {
            let _ = TcpStream::connect(("127.0.0.1", port));
        }
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
