use std::net::{SocketAddr, TcpStream};

use simbridge_frame::LineBuffer;

/// Fixed number of client slots in a [`crate::LineServer`].
pub const MAX_CLIENTS: usize = 10;

/// One preallocated client connection entry.
///
/// A slot is free iff it holds no stream. Freeing a slot drops, and so
/// closes, its stream and rewinds its buffer.
#[derive(Debug, Default)]
pub struct ClientSlot {
    stream: Option<TcpStream>,
    peer: Option<SocketAddr>,
    buffer: LineBuffer,
}

impl ClientSlot {
    pub fn is_free(&self) -> bool {
        self.stream.is_none()
    }

    /// Peer address of the connected client.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Bytes of a not yet terminated message.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    pub(crate) fn occupy(&mut self, stream: TcpStream, peer: SocketAddr) {
        self.buffer.reset();
        self.stream = Some(stream);
        self.peer = Some(peer);
    }

    pub(crate) fn free(&mut self) {
        self.stream = None;
        self.peer = None;
        self.buffer.reset();
    }

    pub(crate) fn parts_mut(&mut self) -> (Option<&mut TcpStream>, &mut LineBuffer) {
        (self.stream.as_mut(), &mut self.buffer)
    }

    #[cfg(unix)]
    pub(crate) fn raw_fd(&self) -> Option<std::os::fd::RawFd> {
        use std::os::fd::AsRawFd;
        self.stream.as_ref().map(AsRawFd::as_raw_fd)
    }
}

/// First free slot, if any.
pub(crate) fn first_free(slots: &[ClientSlot]) -> Option<usize> {
    slots.iter().position(ClientSlot::is_free)
}
