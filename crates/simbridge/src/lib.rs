//! Simulation bridge plumbing between a physics engine and hardware models.
//!
//! # Crate Structure
//!
//! - [`transport`] — TCP acceptor, readiness wait, connect with retry
//! - [`frame`] — newline and sentinel message framing
//! - [`server`] — multi-client line server and command-bus bridge (behind `server` feature)
//! - [`provider`] — latest-value telemetry and shared-memory providers (behind `provider` feature)

/// Re-export transport types.
pub mod transport {
    pub use simbridge_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use simbridge_frame::*;
}

/// Re-export server types (requires `server` feature).
#[cfg(feature = "server")]
pub mod server {
    pub use simbridge_server::*;
}

/// Re-export provider types (requires `provider` feature).
#[cfg(feature = "provider")]
pub mod provider {
    pub use simbridge_provider::*;
}
