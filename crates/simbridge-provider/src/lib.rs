//! Latest-value simulation data providers.
//!
//! Hardware models read simulation state through [`LatestValueProvider`]
//! without caring where it comes from:
//! - [`SocketProvider`] keeps a TCP telemetry connection to the physics
//!   engine, reads sentinel-framed messages on a background thread and
//!   republishes the newest [`DataPoint`]. It can also forward raw commands
//!   on an optional second connection.
//! - [`ShmProvider`] snapshots a [`BlackboardState`] that another process
//!   writes into a named shared-memory segment under a cross-process mutex.
//!
//! Both keep only the latest value; there is no history.

pub mod data_point;
pub mod error;
pub mod latest;
#[cfg(unix)]
pub mod shm;
#[cfg(unix)]
pub mod socket;

pub use data_point::{date_to_j2000_seconds, doy_to_month_day, parse_double_vector, DataPoint};
pub use error::{ProviderError, Result, ShmError};
pub use latest::{LatestState, LatestValueProvider};
#[cfg(unix)]
pub use shm::{
    BlackboardState, BlackboardWriter, ShmDataPoint, ShmProvider, ShmSegment, BLACKBOARD_SIZE,
    DEFAULT_BLACKBOARD_NAME,
};
#[cfg(unix)]
pub use socket::{SocketProvider, SocketProviderConfig};
