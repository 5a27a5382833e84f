use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener, TcpStream};
use std::os::fd::{AsRawFd, RawFd};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Listening TCP socket bound to `INADDR_ANY`.
///
/// Socket creation, bind and listen are performed as separate steps so that
/// each failure surfaces as its own [`TransportError`] variant. The listen
/// backlog is fixed at construction.
pub struct TcpAcceptor {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpAcceptor {
    /// Default listen backlog.
    pub const DEFAULT_BACKLOG: i32 = 5;

    /// Bind and listen on `0.0.0.0:port` with the default backlog.
    ///
    /// Port 0 asks the OS for an ephemeral port; see [`TcpAcceptor::local_addr`].
    pub fn bind(port: u16) -> Result<Self> {
        Self::bind_with_backlog(port, Self::DEFAULT_BACKLOG)
    }

    /// Bind and listen on `0.0.0.0:port` with an explicit backlog.
    pub fn bind_with_backlog(port: u16, backlog: i32) -> Result<Self> {
        let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));

        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
            .map_err(TransportError::Socket)?;
        debug!(fd = socket.as_raw_fd(), "listener socket created");

        socket
            .bind(&addr.into())
            .map_err(|source| TransportError::Bind { addr, source })?;
        debug!(%addr, "listener socket bound");

        socket
            .listen(backlog)
            .map_err(|source| TransportError::Listen { addr, source })?;

        let listener: TcpListener = socket.into();
        let local_addr = listener.local_addr().map_err(TransportError::Io)?;

        info!(%local_addr, backlog, "listening for tcp connections");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept one pending connection (blocking unless the caller saw readiness first).
    pub fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%peer, fd = stream.as_raw_fd(), "accepted connection");
        Ok((stream, peer))
    }

    /// The address actually bound (resolves an ephemeral port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The bound port.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }
}

impl AsRawFd for TcpAcceptor {
    fn as_raw_fd(&self) -> RawFd {
        self.listener.as_raw_fd()
    }
}

impl std::fmt::Debug for TcpAcceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpAcceptor")
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn bind_ephemeral_accept_connect() {
        let acceptor = TcpAcceptor::bind(0).unwrap();
        let port = acceptor.port();
        assert_ne!(port, 0);

        let handle = std::thread::spawn(move || {
            let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
            client.write_all(b"hello").unwrap();
        });

        let (mut server, peer) = acceptor.accept().unwrap();
        assert!(peer.ip().is_loopback());
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        handle.join().unwrap();
    }

    #[test]
    fn bind_conflict_is_reported_as_bind_error() {
        let first = TcpAcceptor::bind(0).unwrap();
        let result = TcpAcceptor::bind(first.port());
        assert!(matches!(result, Err(TransportError::Bind { .. })));
    }

    #[test]
    fn local_addr_is_unspecified_ipv4() {
        let acceptor = TcpAcceptor::bind(0).unwrap();
        assert!(acceptor.local_addr().ip().is_unspecified());
        assert!(acceptor.local_addr().is_ipv4());
    }

    #[test]
    fn listener_is_not_inherited_by_children() {
        let acceptor = TcpAcceptor::bind(0).unwrap();
        // SAFETY: F_GETFD on an open descriptor takes no pointers.
        let flags = unsafe { libc::fcntl(acceptor.as_raw_fd(), libc::F_GETFD) };
        assert!(flags >= 0);
        assert_ne!(flags & libc::FD_CLOEXEC, 0);
    }
}
