use std::fmt;
use std::io;

use simbridge_provider::{ProviderError, ShmError};
use simbridge_server::{BridgeError, ServerError};
use simbridge_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused => FAILURE,
        io::ErrorKind::AddrInUse | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Listen { source, .. }
        | TransportError::ConnectExhausted { source, .. }
        | TransportError::Socket(source)
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn server_error(context: &str, err: ServerError) -> CliError {
    match err {
        ServerError::Transport(err) => transport_error(context, err),
        ServerError::Io(err) => io_error(context, err),
    }
}

pub fn bridge_error(context: &str, err: BridgeError) -> CliError {
    match err {
        BridgeError::Server(err) => server_error(context, err),
        BridgeError::Parse(_) | BridgeError::MissingField(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        BridgeError::Bus { .. } => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn provider_error(context: &str, err: ProviderError) -> CliError {
    match err {
        ProviderError::Transport(err) => transport_error(context, err),
        ProviderError::Shm(ShmError::InvalidName(_)) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        ProviderError::Shm(ShmError::SegmentOpen(source)) => io_error(context, source),
        ProviderError::Io(source) => io_error(context, source),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}
