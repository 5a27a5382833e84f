//! Bridge from line-delimited JSON commands onto a command bus.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::error::BridgeError;

/// Destination for parsed commands.
///
/// The bus is external to simbridge; implementations route `payload` to the
/// hardware-model node called `node`.
pub trait CommandBus {
    fn send(&mut self, node: &str, payload: &[u8]) -> Result<(), BridgeError>;
}

/// A command addressed to one node on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub node: String,
    pub cmd: String,
}

impl CommandEnvelope {
    /// Parse one server message as `{"node": "...", "cmd": "..."}`.
    ///
    /// Extra fields are ignored.
    pub fn parse(msg: &str) -> Result<Self, BridgeError> {
        let value: Value = serde_json::from_str(msg)?;
        let field = |name: &'static str| {
            value
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or(BridgeError::MissingField(name))
        };

        Ok(Self {
            node: field("node")?,
            cmd: field("cmd")?,
        })
    }

    /// Bus payload: the command text followed by a NUL terminator, so the
    /// receiving side can treat the buffer as a C string.
    pub fn payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(self.cmd.len() + 1);
        payload.extend_from_slice(self.cmd.as_bytes());
        payload.push(0);
        payload
    }
}

/// Bus that only logs what it would send.
#[derive(Debug, Default)]
pub struct LoggingBus {
    sent: u64,
}

impl LoggingBus {
    /// Messages handed to this bus so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl CommandBus for LoggingBus {
    fn send(&mut self, node: &str, payload: &[u8]) -> Result<(), BridgeError> {
        self.sent += 1;
        info!(node, size = payload.len(), "command bus send");
        Ok(())
    }
}

#[cfg(unix)]
pub use self::driver::CommandBridge;

#[cfg(unix)]
mod driver {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use tracing::{debug, info, Span};

    use super::{CommandBus, CommandEnvelope};
    use crate::error::BridgeError;
    use crate::server::LineServer;

    /// Drives a [`LineServer`] and forwards every message to a [`CommandBus`].
    ///
    /// The loop runs while the liveness flag is set. Clearing the flag takes
    /// effect after the current readiness wait returns, i.e. on the next
    /// message, connection or signal.
    pub struct CommandBridge<B> {
        server: LineServer,
        bus: B,
        running: Arc<AtomicBool>,
        span: Span,
    }

    impl<B: CommandBus> CommandBridge<B> {
        pub fn new(server: LineServer, bus: B) -> Self {
            let span = tracing::info_span!("command_bridge", port = server.port());
            Self {
                server,
                bus,
                running: Arc::new(AtomicBool::new(true)),
                span,
            }
        }

        /// Replace the span every event of this bridge is recorded under.
        pub fn with_span(mut self, span: Span) -> Self {
            self.span = span;
            self
        }

        /// Shared liveness flag; store `false` to stop [`CommandBridge::run`].
        pub fn running_flag(&self) -> Arc<AtomicBool> {
            Arc::clone(&self.running)
        }

        /// Serve until the liveness flag is cleared.
        ///
        /// Bad messages and bus failures are logged and skipped; only a failed
        /// readiness wait ends the loop with an error.
        pub fn run(&mut self) -> Result<(), BridgeError> {
            let span = self.span.clone();
            let _entered = span.enter();
            info!("command bridge running");

            while self.running.load(Ordering::SeqCst) {
                if !self.server.poll()? {
                    continue;
                }
                self.drain();
            }

            info!("command bridge stopped");
            Ok(())
        }

        /// Process every queued message. Returns how many reached the bus.
        pub fn drain(&mut self) -> usize {
            let mut forwarded = 0usize;
            while let Some(msg) = self.server.next_message() {
                match self.process(&msg) {
                    Ok(()) => forwarded += 1,
                    Err(err) => super::log_rejected(&msg, &err),
                }
            }
            forwarded
        }

        /// Parse one message and forward it to the bus.
        pub fn process(&mut self, msg: &str) -> Result<(), BridgeError> {
            let envelope = CommandEnvelope::parse(msg)?;
            info!(
                node = %envelope.node,
                cmd = %envelope.cmd,
                "received new message for command bus"
            );
            self.bus.send(&envelope.node, &envelope.payload())?;
            debug!(node = %envelope.node, "forwarded command");
            Ok(())
        }

        pub fn server(&self) -> &LineServer {
            &self.server
        }

        pub fn server_mut(&mut self) -> &mut LineServer {
            &mut self.server
        }

        pub fn bus(&self) -> &B {
            &self.bus
        }

        pub fn into_parts(self) -> (LineServer, B) {
            (self.server, self.bus)
        }
    }
}

fn log_rejected(msg: &str, err: &BridgeError) {
    match err {
        BridgeError::Parse(_) | BridgeError::MissingField(_) => {
            error!(msg, error = %err, "could not interpret message")
        }
        _ => error!(error = %err, "unable to forward message"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingBus {
        sent: Vec<(String, Vec<u8>)>,
        refuse: bool,
    }

    impl CommandBus for RecordingBus {
        fn send(&mut self, node: &str, payload: &[u8]) -> Result<(), BridgeError> {
            if self.refuse {
                return Err(BridgeError::Bus {
                    node: node.to_string(),
                    reason: "no such node".to_string(),
                });
            }
            self.sent.push((node.to_string(), payload.to_vec()));
            Ok(())
        }
    }

    #[test]
    fn parses_node_and_cmd() {
        let env = CommandEnvelope::parse(r#"{"node":"cam","cmd":"ON","extra":1}"#).unwrap();
        assert_eq!(env.node, "cam");
        assert_eq!(env.cmd, "ON");
    }

    #[test]
    fn payload_is_nul_terminated() {
        let env = CommandEnvelope {
            node: "gps".to_string(),
            cmd: "RESET".to_string(),
        };
        assert_eq!(env.payload(), b"RESET\0".to_vec());
    }

    #[test]
    fn invalid_json_is_parse_error() {
        let err = CommandEnvelope::parse("not json").unwrap_err();
        assert!(matches!(err, BridgeError::Parse(_)));
    }

    #[test]
    fn missing_or_non_string_field_is_reported() {
        let err = CommandEnvelope::parse(r#"{"cmd":"ON"}"#).unwrap_err();
        assert!(matches!(err, BridgeError::MissingField("node")));

        let err = CommandEnvelope::parse(r#"{"node":"cam","cmd":7}"#).unwrap_err();
        assert!(matches!(err, BridgeError::MissingField("cmd")));
    }

    #[test]
    fn logging_bus_counts_sends() {
        let mut bus = LoggingBus::default();
        bus.send("node", b"x\0").unwrap();
        bus.send("node", b"y\0").unwrap();
        assert_eq!(bus.sent(), 2);
    }

    #[cfg(unix)]
    mod driven {
        use std::io::Write;
        use std::net::TcpStream;

        use super::*;
        use crate::LineServer;

        fn connected_bridge(bus: RecordingBus) -> (CommandBridge<RecordingBus>, TcpStream) {
            let mut server = LineServer::bind(0).unwrap();
            let client = TcpStream::connect(("127.0.0.1", server.port())).unwrap();
            while server.active_clients() == 0 {
                server.poll().unwrap();
            }
            (CommandBridge::new(server, bus), client)
        }

        #[test]
        fn forwards_valid_and_skips_invalid_messages() {
            let (mut bridge, mut client) = connected_bridge(RecordingBus::default());

            client
                .write_all(b"{\"node\":\"fss\",\"cmd\":\"PWR ON\"}\ngarbage\n{\"node\":\"css\"}\n")
                .unwrap();
            while bridge.server().pending_messages() < 3 {
                bridge.server_mut().poll().unwrap();
            }

            assert_eq!(bridge.drain(), 1);
            assert_eq!(
                bridge.bus().sent,
                vec![("fss".to_string(), b"PWR ON\0".to_vec())]
            );
        }

        #[test]
        fn bus_refusal_is_not_fatal() {
            let bus = RecordingBus {
                refuse: true,
                ..RecordingBus::default()
            };
            let (mut bridge, mut client) = connected_bridge(bus);

            client.write_all(b"{\"node\":\"rw\",\"cmd\":\"SPIN\"}\n").unwrap();
            while bridge.server().pending_messages() < 1 {
                bridge.server_mut().poll().unwrap();
            }

            assert_eq!(bridge.drain(), 0);
            assert_eq!(bridge.server().pending_messages(), 0);
        }

        #[test]
        fn cleared_flag_stops_run_immediately() {
            let (mut bridge, _client) = connected_bridge(RecordingBus::default());
            bridge.running_flag().store(false, std::sync::atomic::Ordering::SeqCst);
            bridge.run().unwrap();
        }
    }
}
