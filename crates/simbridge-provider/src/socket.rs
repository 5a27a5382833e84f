//! Telemetry provider over TCP.

use std::io::Write;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use simbridge_frame::{FrameError, SentinelReader};
use simbridge_transport::{connect_with_retry, RetryPolicy};
use tracing::{debug, error, info, Span};

use crate::data_point::DataPoint;
use crate::error::{ProviderError, Result};
use crate::latest::{LatestState, LatestValueProvider};

/// Where and how to reach the physics engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketProviderConfig {
    pub host: String,
    pub telemetry_port: u16,
    /// Port accepting raw commands. `None` disables the command channel.
    pub command_port: Option<u16>,
    pub retry: RetryPolicy,
}

impl SocketProviderConfig {
    pub const DEFAULT_HOST: &'static str = "localhost";

    pub fn new(host: impl Into<String>, telemetry_port: u16) -> Self {
        Self {
            host: host.into(),
            telemetry_port,
            command_port: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_command_port(mut self, port: u16) -> Self {
        self.command_port = Some(port);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Latest-value provider fed by the engine's telemetry stream.
///
/// A background thread reads `[ENDMSG]`-terminated messages and replaces the
/// shared [`DataPoint`] after each one. Readers always get a whole message,
/// never a partially accumulated one.
///
/// Dropping the provider shuts the telemetry socket down and joins the
/// reader thread.
pub struct SocketProvider {
    config: SocketProviderConfig,
    latest: Arc<LatestState<DataPoint>>,
    running: Arc<AtomicBool>,
    telemetry: TcpStream,
    reader: Option<JoinHandle<()>>,
    command: Option<Mutex<TcpStream>>,
    span: Span,
}

impl SocketProvider {
    /// Connect the command channel (if configured) and the telemetry stream,
    /// then start the reader thread.
    ///
    /// A command channel that cannot be reached is logged and left
    /// disconnected. A telemetry stream that cannot be reached is an error.
    pub fn connect(config: SocketProviderConfig) -> Result<Self> {
        let span = tracing::info_span!(
            "socket_provider",
            host = %config.host,
            port = config.telemetry_port
        );
        Self::connect_with_span(config, span)
    }

    /// Like [`SocketProvider::connect`], recording every event under `span`.
    pub fn connect_with_span(config: SocketProviderConfig, span: Span) -> Result<Self> {
        let entered = span.enter();

        let command = config.command_port.and_then(|port| {
            match connect_with_retry(&config.host, port, &config.retry) {
                Ok(stream) => {
                    info!(port, "connected command channel");
                    Some(Mutex::new(stream))
                }
                Err(err) => {
                    error!(port, error = %err, "command channel unavailable, commands will be dropped");
                    None
                }
            }
        });

        let telemetry = connect_with_retry(&config.host, config.telemetry_port, &config.retry)
            .map_err(|err| {
                error!(error = %err, "telemetry connection failed");
                ProviderError::Transport(err)
            })?;
        info!("connected telemetry stream");

        let latest = Arc::new(LatestState::default());
        let running = Arc::new(AtomicBool::new(true));

        let reader = {
            let stream = telemetry.try_clone()?;
            let latest = Arc::clone(&latest);
            let running = Arc::clone(&running);
            let span = span.clone();
            thread::Builder::new()
                .name("telemetry-reader".to_string())
                .spawn(move || read_telemetry(stream, &latest, &running, &span))
                .map_err(ProviderError::ThreadSpawn)?
        };

        drop(entered);
        Ok(Self {
            config,
            latest,
            running,
            telemetry,
            reader: Some(reader),
            command,
            span,
        })
    }

    /// Most recent complete message. Empty until the first one arrives.
    pub fn latest(&self) -> DataPoint {
        self.latest.get()
    }

    /// Handle for sharing the latest value with other threads.
    pub fn latest_state(&self) -> Arc<LatestState<DataPoint>> {
        Arc::clone(&self.latest)
    }

    /// Write `message` verbatim on the command channel.
    ///
    /// Returns `false`, after logging, when the channel is not connected or
    /// the write fails.
    pub fn send_command(&self, message: &str) -> bool {
        let _entered = self.span.enter();
        let Some(command) = &self.command else {
            error!(message, "not connected to command port, not sending command");
            return false;
        };

        let mut stream = command.lock().unwrap_or_else(PoisonError::into_inner);
        match stream.write_all(message.as_bytes()) {
            Ok(()) => {
                debug!(message, "sent command");
                true
            }
            Err(err) => {
                error!(message, error = %err, "failed to send command");
                false
            }
        }
    }

    pub fn is_command_connected(&self) -> bool {
        self.command.is_some()
    }

    /// True while the reader thread is alive.
    pub fn is_reading(&self) -> bool {
        self.reader
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn config(&self) -> &SocketProviderConfig {
        &self.config
    }

    /// Stop the reader thread and close both connections. Idempotent.
    pub fn shutdown(&mut self) {
        let _entered = self.span.enter();
        self.running.store(false, Ordering::SeqCst);

        let _ = self.telemetry.shutdown(Shutdown::Both);
        if let Some(command) = &self.command {
            let stream = command.lock().unwrap_or_else(PoisonError::into_inner);
            let _ = stream.shutdown(Shutdown::Both);
        }

        if let Some(handle) = self.reader.take() {
            if handle.join().is_err() {
                error!("telemetry reader thread panicked");
            }
            debug!("telemetry reader joined");
        }
    }
}

impl LatestValueProvider for SocketProvider {
    type Value = DataPoint;

    fn snapshot(&self) -> Result<DataPoint> {
        Ok(self.latest())
    }
}

impl Drop for SocketProvider {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SocketProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketProvider")
            .field("config", &self.config)
            .field("command_connected", &self.is_command_connected())
            .field("reading", &self.is_reading())
            .finish()
    }
}

fn read_telemetry(
    stream: TcpStream,
    latest: &LatestState<DataPoint>,
    running: &AtomicBool,
    span: &Span,
) {
    let _entered = span.enter();
    let mut reader = SentinelReader::new(stream);
    let mut published = 0u64;

    while running.load(Ordering::SeqCst) {
        match reader.read_message() {
            Ok(message) => {
                if !message.complete {
                    debug!(lines = message.lines.len(), "telemetry ended mid-message");
                }
                latest.replace(DataPoint::from_lines(message.lines));
                published += 1;
            }
            Err(FrameError::ConnectionClosed) => {
                info!(published, "telemetry stream closed");
                return;
            }
            Err(err) => {
                if running.load(Ordering::SeqCst) {
                    error!(error = %err, "telemetry read failed");
                }
                return;
            }
        }
    }
    debug!(published, "telemetry reader stopping");
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::net::TcpListener;
    use std::time::{Duration, Instant};

    use simbridge_transport::TransportError;

    use super::*;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(0, Duration::from_millis(10))
    }

    fn engine() -> (TcpListener, SocketProviderConfig) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = SocketProviderConfig::new("127.0.0.1", port).with_retry(fast_retry());
        (listener, config)
    }

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn publishes_each_complete_message() {
        let (listener, config) = engine();
        let provider = SocketProvider::connect(config).unwrap();
        let (mut engine, _) = listener.accept().unwrap();

        assert!(provider.latest().is_empty());

        engine
            .write_all(b"TIME 2024-001-00:00:00.0\nSC[0].svb = [1 0 0]\n[ENDMSG]\n")
            .unwrap();
        wait_for(|| provider.latest().value("SC[0].svb").is_some());
        let first = provider.latest();
        assert_eq!(first.lines().len(), 3);
        assert_eq!(first.vector("SC[0].svb"), Some(vec![1.0, 0.0, 0.0]));

        engine.write_all(b"SC[0].svb = [0 1 0]\n").unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(provider.latest(), first, "partial message must not be visible");

        engine.write_all(b"[ENDMSG]\n").unwrap();
        wait_for(|| provider.latest().value("SC[0].svb") == Some("[0 1 0]"));
        let second = provider.latest();
        assert_eq!(second.lines(), ["SC[0].svb = [0 1 0]", "[ENDMSG]"]);
        assert!(second.value("TIME").is_none());
    }

    #[test]
    fn reader_stops_when_engine_disconnects() {
        let (listener, config) = engine();
        let provider = SocketProvider::connect(config).unwrap();
        let (engine, _) = listener.accept().unwrap();

        drop(engine);
        wait_for(|| !provider.is_reading());
    }

    #[test]
    fn message_cut_short_by_disconnect_is_published() {
        let (listener, config) = engine();
        let provider = SocketProvider::connect(config).unwrap();
        let (mut engine, _) = listener.accept().unwrap();

        engine.write_all(b"k = v\n").unwrap();
        drop(engine);

        wait_for(|| !provider.is_reading());
        let latest = provider.latest();
        assert_eq!(latest.value("k"), Some("v"));
        assert_eq!(latest.lines(), ["k = v"]);
    }

    #[test]
    fn shutdown_unblocks_idle_reader() {
        let (listener, config) = engine();
        let mut provider = SocketProvider::connect(config).unwrap();
        let (_engine, _) = listener.accept().unwrap();

        assert!(provider.is_reading());
        provider.shutdown();
        assert!(!provider.is_reading());
        provider.shutdown();
    }

    #[test]
    fn unreachable_telemetry_is_error() {
        let (listener, config) = engine();
        drop(listener);

        let err = SocketProvider::connect(config).unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Transport(TransportError::ConnectExhausted { attempts: 1, .. })
        ));
    }

    #[test]
    fn commands_are_written_verbatim() {
        let (telemetry, config) = engine();
        let commands = TcpListener::bind("127.0.0.1:0").unwrap();
        let config = config.with_command_port(commands.local_addr().unwrap().port());

        let provider = SocketProvider::connect(config).unwrap();
        let (_engine, _) = telemetry.accept().unwrap();
        let (mut command_side, _) = commands.accept().unwrap();

        assert!(provider.is_command_connected());
        assert!(provider.send_command("SC[0].AC.Whl[0].Tcmd = 0.1\n"));

        let expected = b"SC[0].AC.Whl[0].Tcmd = 0.1\n";
        let mut received = vec![0u8; expected.len()];
        command_side.read_exact(&mut received).unwrap();
        assert_eq!(received, expected);
    }

    #[test]
    fn unreachable_command_port_is_not_fatal() {
        let (telemetry, config) = engine();
        let closed = TcpListener::bind("127.0.0.1:0").unwrap();
        let closed_port = closed.local_addr().unwrap().port();
        drop(closed);

        let provider = SocketProvider::connect(config.with_command_port(closed_port)).unwrap();
        let (_engine, _) = telemetry.accept().unwrap();

        assert!(!provider.is_command_connected());
        assert!(!provider.send_command("ignored"));
    }

    #[test]
    fn latest_state_is_shared() {
        let (listener, config) = engine();
        let provider = SocketProvider::connect(config).unwrap();
        let (mut engine, _) = listener.accept().unwrap();
        let shared = provider.latest_state();

        engine.write_all(b"k = v\n[ENDMSG]\n").unwrap();
        wait_for(|| shared.get().value("k") == Some("v"));
        assert_eq!(provider.snapshot().unwrap(), shared.get());
    }
}
