//! Newline and sentinel framing for simulator byte streams.
//!
//! Two framings are used on simulator links:
//! - Command clients send one message per line, terminated by `\n`. A
//!   [`LineBuffer`] reassembles those lines from arbitrary TCP segmentation
//!   inside a fixed 256-byte buffer.
//! - The physics engine sends telemetry as a block of lines closed by a
//!   sentinel line starting with `[ENDMSG]`. A [`SentinelReader`] assembles
//!   those blocks from a blocking stream.
//!
//! Neither framing carries a length prefix or header.

pub mod error;
pub mod line;
pub mod sentinel;

pub use error::{FrameError, Result};
pub use line::{FeedStats, LineBuffer, DELIMITER, LINE_BUFFER_CAPACITY};
pub use sentinel::{SentinelMessage, SentinelReader, ENDMSG_SENTINEL, MAX_LINE_LEN};
