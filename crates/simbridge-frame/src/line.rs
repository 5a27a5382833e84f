//! Fixed-capacity newline framing.

use tracing::{debug, error};

/// Per-connection receive buffer size in bytes.
pub const LINE_BUFFER_CAPACITY: usize = 256;

/// Message delimiter.
pub const DELIMITER: u8 = b'\n';

/// Outcome of [`LineBuffer::feed`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    /// Complete, non-empty messages extracted.
    pub messages: usize,
    /// Times the buffer was full with no delimiter and had to be discarded.
    pub overflows: usize,
}

/// Fixed-capacity byte buffer that splits a stream into `\n`-terminated messages.
///
/// Bytes are appended at the write cursor. Every append scans the new bytes
/// for delimiters; each delimiter closes one message made of the bytes since
/// the previous delimiter, without the delimiter itself. Empty messages are
/// dropped. Unterminated trailing bytes are moved to the start of the buffer
/// so the next append continues the same message.
///
/// When the buffer is full and holds no delimiter, the next append discards
/// the whole buffer first. Any data in it is lost, including the start of a
/// message that may have been valid.
pub struct LineBuffer {
    buf: [u8; LINE_BUFFER_CAPACITY],
    cursor: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self {
            buf: [0u8; LINE_BUFFER_CAPACITY],
            cursor: 0,
        }
    }

    /// Bytes held that are not yet part of a complete message.
    pub fn len(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    /// Free space at the write cursor.
    pub fn remaining(&self) -> usize {
        LINE_BUFFER_CAPACITY - self.cursor
    }

    /// Full with no delimiter; the next append must discard the content.
    pub fn is_full(&self) -> bool {
        self.cursor == LINE_BUFFER_CAPACITY
    }

    /// The pending, unterminated bytes.
    pub fn pending(&self) -> &[u8] {
        &self.buf[..self.cursor]
    }

    /// Discard all content and rewind the write cursor.
    pub fn reset(&mut self) {
        self.buf.fill(0);
        self.cursor = 0;
    }

    /// Writable region at the cursor, for reading a socket straight into the buffer.
    ///
    /// Follow with [`LineBuffer::commit`] for the number of bytes written.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.cursor..]
    }

    /// Account for `n` bytes written into [`LineBuffer::spare_mut`] and extract
    /// every complete message into `out`. Returns the number of messages extracted.
    pub fn commit<E: Extend<String>>(&mut self, n: usize, out: &mut E) -> usize {
        let n = n.min(self.remaining());
        let scan_from = self.cursor;
        self.cursor += n;
        self.extract(scan_from, out)
    }

    /// Append `chunk`, applying the overflow policy whenever the buffer fills up.
    ///
    /// The chunk is consumed in pieces no larger than the free space, the same
    /// way a socket read into [`LineBuffer::spare_mut`] would be.
    pub fn feed<E: Extend<String>>(&mut self, mut chunk: &[u8], out: &mut E) -> FeedStats {
        let mut stats = FeedStats::default();

        while !chunk.is_empty() {
            if self.is_full() {
                error!(
                    capacity = LINE_BUFFER_CAPACITY,
                    "receive buffer full with no delimiter, dumping buffer"
                );
                self.reset();
                stats.overflows += 1;
            }

            let n = chunk.len().min(self.remaining());
            self.spare_mut()[..n].copy_from_slice(&chunk[..n]);
            stats.messages += self.commit(n, out);
            chunk = &chunk[n..];
        }

        stats
    }

    fn extract<E: Extend<String>>(&mut self, scan_from: usize, out: &mut E) -> usize {
        // Bytes before `scan_from` were scanned already and hold no delimiter.
        let mut next_msg_start = 0usize;
        let mut extracted = 0usize;

        for pos in scan_from..self.cursor {
            if self.buf[pos] != DELIMITER {
                continue;
            }
            if pos > next_msg_start {
                let msg = String::from_utf8_lossy(&self.buf[next_msg_start..pos]).into_owned();
                debug!(size = msg.len(), "new message");
                out.extend(std::iter::once(msg));
                extracted += 1;
            }
            next_msg_start = pos + 1;
        }

        if next_msg_start > 0 {
            let remaining = self.cursor - next_msg_start;
            self.buf.copy_within(next_msg_start..self.cursor, 0);
            self.cursor = remaining;
            if remaining > 0 {
                debug!(remaining, "bytes remaining in buffer");
            }
        }

        extracted
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LineBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineBuffer")
            .field("len", &self.cursor)
            .field("capacity", &LINE_BUFFER_CAPACITY)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(chunks: &[&[u8]]) -> (Vec<String>, LineBuffer) {
        let mut buf = LineBuffer::new();
        let mut out = Vec::new();
        for chunk in chunks {
            buf.feed(chunk, &mut out);
        }
        (out, buf)
    }

    #[test]
    fn single_message_in_one_chunk() {
        let (out, buf) = feed_all(&[b"hello\n"]);
        assert_eq!(out, vec!["hello"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn several_messages_in_one_chunk() {
        let (out, _) = feed_all(&[b"one\ntwo\nthree\n"]);
        assert_eq!(out, vec!["one", "two", "three"]);
    }

    #[test]
    fn message_split_across_chunks() {
        let (out, buf) = feed_all(&[b"A\nB\nC", b"\n"]);
        assert_eq!(out, vec!["A", "B", "C"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn trailing_bytes_are_compacted_to_front() {
        let mut buf = LineBuffer::new();
        let mut out = Vec::new();
        buf.feed(b"first\npart", &mut out);
        assert_eq!(out, vec!["first"]);
        assert_eq!(buf.pending(), b"part");
        assert_eq!(buf.remaining(), LINE_BUFFER_CAPACITY - 4);
    }

    #[test]
    fn empty_lines_are_dropped() {
        let (out, _) = feed_all(&[b"\n\na\n\n\nb\n", b"\n"]);
        assert_eq!(out, vec!["a", "b"]);
    }

    #[test]
    fn every_split_point_yields_same_messages() {
        let wire: &[u8] = b"{\"node\":\"sample\"}\n\nsecond line\nthird\n";
        let expected = vec!["{\"node\":\"sample\"}", "second line", "third"];

        for split in 0..=wire.len() {
            let (out, buf) = feed_all(&[&wire[..split], &wire[split..]]);
            assert_eq!(out, expected, "split at {split}");
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn byte_at_a_time_yields_same_messages() {
        let wire = b"alpha\nbeta\n\ngamma\n";
        let chunks: Vec<&[u8]> = wire.chunks(1).collect();
        let (out, _) = feed_all(&chunks);
        assert_eq!(out, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn full_buffer_is_discarded_on_next_append() {
        let mut buf = LineBuffer::new();
        let mut out = Vec::new();

        let stats = buf.feed(&[b'x'; LINE_BUFFER_CAPACITY], &mut out);
        assert_eq!(stats.overflows, 0);
        assert!(buf.is_full());

        let stats = buf.feed(b"hello\n", &mut out);
        assert_eq!(stats.overflows, 1);
        assert_eq!(out, vec!["hello"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn bytes_after_overflow_point_form_next_message() {
        let mut buf = LineBuffer::new();
        let mut out = Vec::new();

        let mut wire = vec![b'x'; LINE_BUFFER_CAPACITY + 10];
        wire.extend_from_slice(b"tail\n");
        let stats = buf.feed(&wire, &mut out);

        assert_eq!(stats.overflows, 1);
        assert_eq!(out, vec![format!("{}tail", "x".repeat(10))]);
    }

    #[test]
    fn overflow_also_drops_unflushed_leading_data() {
        let mut buf = LineBuffer::new();
        let mut out = Vec::new();

        buf.feed(b"partial-", &mut out);
        buf.feed(&[b'y'; LINE_BUFFER_CAPACITY - 8], &mut out);
        assert!(buf.is_full());

        buf.feed(b"ok\n", &mut out);
        assert_eq!(out, vec!["ok"]);
    }

    #[test]
    fn delimiter_in_last_slot_frees_whole_buffer() {
        let mut buf = LineBuffer::new();
        let mut out = Vec::new();

        let mut wire = vec![b'z'; LINE_BUFFER_CAPACITY - 1];
        wire.push(DELIMITER);
        let stats = buf.feed(&wire, &mut out);

        assert_eq!(stats.messages, 1);
        assert_eq!(stats.overflows, 0);
        assert_eq!(out[0].len(), LINE_BUFFER_CAPACITY - 1);
        assert!(buf.is_empty());
    }

    #[test]
    fn commit_after_direct_write_extracts() {
        let mut buf = LineBuffer::new();
        let mut out = std::collections::VecDeque::new();

        let spare = buf.spare_mut();
        spare[..4].copy_from_slice(b"cmd\n");
        assert_eq!(buf.commit(4, &mut out), 1);
        assert_eq!(out.pop_front().as_deref(), Some("cmd"));
    }

    #[test]
    fn reset_rewinds_cursor() {
        let mut buf = LineBuffer::new();
        let mut out = Vec::<String>::new();
        buf.feed(b"dangling", &mut out);
        buf.reset();
        assert!(buf.is_empty());
        assert_eq!(buf.remaining(), LINE_BUFFER_CAPACITY);
    }

    #[test]
    fn invalid_utf8_is_replaced_not_dropped() {
        let (out, _) = feed_all(&[&[0xff, b'a', b'\n']]);
        assert_eq!(out.len(), 1);
        assert!(out[0].ends_with('a'));
    }
}
