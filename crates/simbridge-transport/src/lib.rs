//! TCP transport primitives for simulator telemetry links.
//!
//! This is the lowest layer of simbridge:
//! - [`TcpAcceptor`] — listening socket bound to `INADDR_ANY` with a fixed backlog
//! - [`wait_readable`] — blocking readiness wait over a set of descriptors
//! - [`connect_with_retry`] — outbound connect with bounded retries and fixed backoff
//!
//! Everything else builds on the plain [`std::net::TcpStream`] values handed out here.

pub mod connect;
pub mod error;

#[cfg(unix)]
pub mod readiness;
#[cfg(unix)]
pub mod tcp;

pub use connect::{connect_with_retry, RetryPolicy};
pub use error::{Result, TransportError};

#[cfg(unix)]
pub use readiness::{wait_readable, Readiness};
#[cfg(unix)]
pub use tcp::TcpAcceptor;
