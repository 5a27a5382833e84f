mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "simbridge", version, about = "Simulation bridge CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridge_port_defaults_to_12020() {
        let cli = Cli::try_parse_from(["simbridge", "bridge"]).expect("bridge args should parse");
        match cli.command {
            Command::Bridge(args) => assert_eq!(args.port, cmd::DEFAULT_BRIDGE_PORT),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_telemetry_subcommand() {
        let cli = Cli::try_parse_from([
            "simbridge",
            "telemetry",
            "--host",
            "engine",
            "--port",
            "4242",
            "--command-port",
            "4243",
            "--send",
            "a",
            "--send",
            "b",
        ])
        .expect("telemetry args should parse");

        let Command::Telemetry(args) = cli.command else {
            panic!("expected telemetry command");
        };
        assert_eq!(args.host, "engine");
        assert_eq!(args.port, 4242);
        assert_eq!(args.command_port, Some(4243));
        assert_eq!(args.commands, vec!["a", "b"]);
        assert_eq!(args.max_attempts, 5);
    }

    #[test]
    fn telemetry_requires_port() {
        let err = Cli::try_parse_from(["simbridge", "telemetry", "--host", "engine"])
            .expect_err("missing port should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn blackboard_name_defaults() {
        let cli = Cli::try_parse_from(["simbridge", "blackboard"]).expect("args should parse");
        let Command::Blackboard(args) = cli.command else {
            panic!("expected blackboard command");
        };
        assert_eq!(args.name, "Blackboard");
        assert!(!args.full);
    }
}
