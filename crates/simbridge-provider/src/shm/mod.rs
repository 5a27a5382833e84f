//! Shared-memory blackboard provider.
//!
//! A writer process keeps a [`BlackboardState`] in a named segment, guarded
//! by a process-shared mutex stored in front of it. Readers take a full copy
//! under that mutex, so one update is never observed half applied.

mod blackboard;
mod provider;
mod segment;

pub use blackboard::{BlackboardState, BLACKBOARD_SIZE};
pub use provider::{BlackboardWriter, ShmDataPoint, ShmProvider, DEFAULT_BLACKBOARD_NAME};
pub use segment::ShmSegment;
