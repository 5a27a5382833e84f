use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use simbridge_server::LineServer;

use crate::cmd::{install_ctrlc_handler, ListenArgs};
use crate::exit::{server_error, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let mut server = LineServer::bind(args.port).map_err(|err| server_error("bind failed", err))?;
    tracing::info!(port = server.port(), "listening for line-delimited messages");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone(), Some(server.port()))?;

    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        if !server
            .poll()
            .map_err(|err| server_error("readiness wait failed", err))?
        {
            continue;
        }

        while let Some(message) = server.next_message() {
            printed = printed.saturating_add(1);
            print_message(&message, printed, format);

            if args.count.is_some_and(|count| printed >= count) {
                return Ok(SUCCESS);
            }
        }
    }

    Ok(SUCCESS)
}
