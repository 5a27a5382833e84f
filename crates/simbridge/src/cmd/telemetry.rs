use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use simbridge_provider::{SocketProvider, SocketProviderConfig};
use simbridge_transport::RetryPolicy;

use crate::cmd::{install_ctrlc_handler, parse_duration, TelemetryArgs};
use crate::exit::{provider_error, CliResult, FAILURE, SUCCESS};
use crate::output::{print_data_point, OutputFormat};

pub fn run(args: TelemetryArgs, format: OutputFormat) -> CliResult<i32> {
    let interval = parse_duration(&args.interval)?;
    let retry = RetryPolicy::new(args.max_attempts, parse_duration(&args.retry_wait)?);

    let mut config = SocketProviderConfig::new(&args.host, args.port).with_retry(retry);
    if let Some(port) = args.command_port.filter(|port| *port != 0) {
        config = config.with_command_port(port);
    }

    let provider =
        SocketProvider::connect(config).map_err(|err| provider_error("connect failed", err))?;

    let mut exit_code = SUCCESS;
    for command in &args.commands {
        if !provider.send_command(command) {
            exit_code = FAILURE;
        }
    }

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone(), None)?;

    let mut printed = 0usize;
    let mut last = None;

    while running.load(Ordering::SeqCst) {
        let reading = provider.is_reading();
        let point = provider.latest();
        if !point.is_empty() && last.as_ref() != Some(&point) {
            printed = printed.saturating_add(1);
            print_data_point(&point, printed, format);
            last = Some(point);

            if args.count.is_some_and(|count| printed >= count) {
                break;
            }
        }

        if !reading {
            tracing::info!(printed, "telemetry stream ended");
            break;
        }
        thread::sleep(interval);
    }

    Ok(exit_code)
}
