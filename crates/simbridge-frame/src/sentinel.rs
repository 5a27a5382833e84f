//! Sentinel-terminated multi-line framing.

use std::io::{ErrorKind, Read};

use bytes::{BufMut, BytesMut};
use tracing::trace;

use crate::error::{FrameError, Result};

/// Marker line closing one telemetry message. Matched as a line prefix.
pub const ENDMSG_SENTINEL: &str = "[ENDMSG]";

/// Longest line kept, in bytes. Longer input is split into several lines.
pub const MAX_LINE_LEN: usize = 510;

/// One block of lines read by [`SentinelReader::read_message`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SentinelMessage {
    /// Lines in arrival order, without their `\n`. Includes the sentinel line
    /// when [`SentinelMessage::complete`] is set.
    pub lines: Vec<String>,
    /// True when the sentinel closed the message, false when end-of-stream did.
    pub complete: bool,
}

/// Reads `\n`-terminated lines from a blocking stream and groups them into
/// messages closed by a sentinel line.
///
/// Input is consumed one byte at a time, so partial reads of any size are
/// fine and nothing past the current line is taken from `inner`. Wrapping
/// `inner` in a `BufReader` trades that for fewer reads.
pub struct SentinelReader<R> {
    inner: R,
    line: BytesMut,
    sentinel: String,
    max_line_len: usize,
}

impl<R: Read> SentinelReader<R> {
    /// Reader closing messages on [`ENDMSG_SENTINEL`].
    pub fn new(inner: R) -> Self {
        Self::with_sentinel(inner, ENDMSG_SENTINEL)
    }

    pub fn with_sentinel(inner: R, sentinel: impl Into<String>) -> Self {
        Self {
            inner,
            line: BytesMut::with_capacity(MAX_LINE_LEN + 1),
            sentinel: sentinel.into(),
            max_line_len: MAX_LINE_LEN,
        }
    }

    /// Read one line (blocking).
    ///
    /// Returns `Ok(None)` at end-of-stream when no byte of a new line was read.
    /// A final line without `\n` is returned as-is.
    pub fn read_line(&mut self) -> Result<Option<String>> {
        self.line.clear();
        let mut byte = [0u8; 1];

        while self.line.len() < self.max_line_len {
            let read = match self.inner.read(&mut byte) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if self.line.is_empty() {
                    return Ok(None);
                }
                break;
            }

            if byte[0] == b'\n' {
                break;
            }
            self.line.put_u8(byte[0]);
        }

        let line = String::from_utf8_lossy(&self.line).into_owned();
        trace!(line = %line, "telemetry line");
        Ok(Some(line))
    }

    /// Read lines until one starts with the sentinel or the stream ends.
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when the stream ended before
    /// any line; a message cut short by end-of-stream is returned with
    /// `complete == false`.
    pub fn read_message(&mut self) -> Result<SentinelMessage> {
        let mut message = SentinelMessage::default();

        loop {
            let Some(line) = self.read_line()? else {
                if message.lines.is_empty() {
                    return Err(FrameError::ConnectionClosed);
                }
                return Ok(message);
            };

            let is_sentinel = line.starts_with(&self.sentinel);
            message.lines.push(line);
            if is_sentinel {
                message.complete = true;
                return Ok(message);
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> R {
        self.inner
    }
}
