/// Errors that can occur in the line server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Transport-level setup error (socket, bind, listen).
    #[error("transport error: {0}")]
    Transport(#[from] simbridge_transport::TransportError),

    /// The readiness wait failed for a reason other than a signal.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors that can occur while bridging messages onto the command bus.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The underlying server failed.
    #[error("server error: {0}")]
    Server(#[from] ServerError),

    /// The message is not valid JSON.
    #[error("could not parse message as json: {0}")]
    Parse(#[from] serde_json::Error),

    /// A required string field is missing.
    #[error("message is missing string field `{0}`")]
    MissingField(&'static str),

    /// The command bus refused the message.
    #[error("unable to send message to {node}: {reason}")]
    Bus { node: String, reason: String },
}
