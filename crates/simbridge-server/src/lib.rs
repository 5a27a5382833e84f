//! Multi-client line-delimited message server.
//!
//! [`LineServer`] accepts up to [`MAX_CLIENTS`] TCP clients, waits on all of
//! them at once, reassembles `\n`-terminated messages per client and queues
//! them for the caller. [`CommandBridge`] drives a server and forwards JSON
//! `{"node": ..., "cmd": ...}` messages to a [`CommandBus`].

pub mod bridge;
pub mod error;
#[cfg(unix)]
pub mod server;
pub mod slot;

pub use bridge::{CommandBus, CommandEnvelope, LoggingBus};
#[cfg(unix)]
pub use bridge::CommandBridge;
pub use error::{BridgeError, Result, ServerError};
#[cfg(unix)]
pub use server::LineServer;
pub use slot::{ClientSlot, MAX_CLIENTS};
