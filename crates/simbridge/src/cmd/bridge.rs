use simbridge_server::{CommandBridge, LineServer, LoggingBus};

use crate::cmd::{install_ctrlc_handler, BridgeArgs};
use crate::exit::{bridge_error, server_error, CliResult, SUCCESS};

pub fn run(args: BridgeArgs) -> CliResult<i32> {
    let server = LineServer::bind(args.port).map_err(|err| server_error("bind failed", err))?;
    let port = server.port();
    tracing::info!(port, "command bus bridge listening");

    let mut bridge = CommandBridge::new(server, LoggingBus::default());
    install_ctrlc_handler(bridge.running_flag(), Some(port))?;

    bridge
        .run()
        .map_err(|err| bridge_error("bridge stopped", err))?;

    tracing::info!(forwarded = bridge.bus().sent(), "command bus bridge finished");
    Ok(SUCCESS)
}
