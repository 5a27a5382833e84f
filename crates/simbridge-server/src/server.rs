use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::net::SocketAddr;
use std::os::fd::AsRawFd;

use simbridge_transport::{wait_readable, TcpAcceptor, TransportError};
use tracing::{debug, error, info, Span};

use crate::error::{Result, ServerError};
use crate::slot::{first_free, ClientSlot, MAX_CLIENTS};

/// Line-delimited message server over TCP.
///
/// Single-threaded: [`LineServer::poll`] blocks in one readiness wait over
/// the acceptor and every connected client, then services whatever is ready.
/// Complete messages leave the server only through
/// [`LineServer::next_message`], in the order their delimiters arrived on
/// each connection. No ordering holds across connections.
///
/// Dropping the server closes the acceptor and every client socket.
pub struct LineServer {
    acceptor: TcpAcceptor,
    slots: [ClientSlot; MAX_CLIENTS],
    pending: VecDeque<String>,
    span: Span,
}

impl LineServer {
    /// Listen on `0.0.0.0:port` with a backlog of 5.
    ///
    /// Socket creation, bind and listen failures are reported as distinct
    /// [`TransportError`] variants and never retried.
    pub fn bind(port: u16) -> Result<Self> {
        let acceptor = TcpAcceptor::bind(port).map_err(|err| {
            error!(port, error = %err, "line server failed to initialize");
            ServerError::Transport(err)
        })?;
        let span = tracing::info_span!("line_server", port = acceptor.port());

        Ok(Self {
            acceptor,
            slots: Default::default(),
            pending: VecDeque::new(),
            span,
        })
    }

    /// Replace the span every event of this server is recorded under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Wait for I/O on the acceptor and all clients, then service it.
    ///
    /// Accepts at most one new connection per call. Returns `Ok(true)` iff
    /// the message queue grew. A signal interrupting the wait returns
    /// `Ok(false)` so the caller can check its liveness flag; any other wait
    /// failure is logged and returned.
    pub fn poll(&mut self) -> Result<bool> {
        let span = self.span.clone();
        let _entered = span.enter();

        let before = self.pending.len();

        let mut fds = Vec::with_capacity(MAX_CLIENTS + 1);
        let mut polled_slots = Vec::with_capacity(MAX_CLIENTS);
        fds.push(self.acceptor.as_raw_fd());
        for (index, slot) in self.slots.iter().enumerate() {
            if let Some(fd) = slot.raw_fd() {
                fds.push(fd);
                polled_slots.push(index);
            }
        }

        let readiness = match wait_readable(&fds, None) {
            Ok(readiness) => readiness,
            Err(err) if err.kind() == ErrorKind::Interrupted => {
                info!("readiness wait interrupted, prepare for shutdown");
                return Ok(false);
            }
            Err(err) => {
                error!(error = %err, "readiness wait failed");
                return Err(ServerError::Io(err));
            }
        };

        if readiness.is_ready(0) {
            self.accept_one();
        }

        for (position, index) in polled_slots.into_iter().enumerate() {
            if readiness.is_ready(position + 1) {
                self.service_slot(index);
            }
        }

        Ok(self.pending.len() > before)
    }

    /// Pop the oldest pending message.
    pub fn next_message(&mut self) -> Option<String> {
        self.pending.pop_front()
    }

    /// Messages waiting in the queue.
    pub fn pending_messages(&self) -> usize {
        self.pending.len()
    }

    /// Number of occupied client slots.
    pub fn active_clients(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.is_free()).count()
    }

    /// Read-only view of the slot table.
    pub fn slots(&self) -> &[ClientSlot] {
        &self.slots
    }

    /// The address the acceptor is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.acceptor.local_addr()
    }

    pub fn port(&self) -> u16 {
        self.acceptor.port()
    }

    fn accept_one(&mut self) {
        let (stream, peer) = match self.acceptor.accept() {
            Ok(accepted) => accepted,
            Err(TransportError::Accept(err)) if err.kind() == ErrorKind::WouldBlock => return,
            Err(err) => {
                error!(error = %err, "socket accept failed");
                return;
            }
        };

        match first_free(&self.slots) {
            Some(index) => {
                debug!(slot = index, %peer, fd = stream.as_raw_fd(), "added new client connection");
                self.slots[index].occupy(stream, peer);
            }
            None => {
                error!(
                    max = MAX_CLIENTS,
                    %peer,
                    "max number of client connections exceeded, rejecting connection request"
                );
                drop(stream);
            }
        }
    }

    fn service_slot(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        let peer = slot.peer();
        let (stream, buffer) = slot.parts_mut();
        let Some(stream) = stream else {
            return;
        };

        if buffer.is_full() {
            error!(slot = index, ?peer, "receive buffer full, dumping buffer");
            buffer.reset();
            return;
        }

        debug!(slot = index, free = buffer.remaining(), "reading client data");

        match stream.read(buffer.spare_mut()) {
            Ok(0) => {
                debug!(slot = index, ?peer, "client disconnect");
                slot.free();
            }
            Ok(n) => {
                buffer.commit(n, &mut self.pending);
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => {
                error!(slot = index, ?peer, error = %err, "socket read error, resetting buffer");
                buffer.reset();
            }
        }
    }
}

impl Drop for LineServer {
    fn drop(&mut self) {
        let _entered = self.span.enter();
        info!(clients = self.active_clients(), "line server closing");
        for slot in self.slots.iter_mut() {
            slot.free();
        }
    }
}

impl std::fmt::Debug for LineServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineServer")
            .field("local_addr", &self.acceptor.local_addr())
            .field("active_clients", &self.active_clients())
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::net::TcpStream;
    use std::time::Duration;

    use super::*;

    fn connect(server: &mut LineServer) -> TcpStream {
        let client = TcpStream::connect(("127.0.0.1", server.port())).unwrap();
        let accepted_before = server.active_clients();
        while server.active_clients() == accepted_before {
            server.poll().unwrap();
        }
        client
    }

    fn poll_until(server: &mut LineServer, count: usize) -> Vec<String> {
        while server.pending_messages() < count {
            server.poll().unwrap();
        }
        std::iter::from_fn(|| server.next_message()).collect()
    }

    #[test]
    fn accept_only_poll_reports_no_messages() {
        let mut server = LineServer::bind(0).unwrap();
        let _client = TcpStream::connect(("127.0.0.1", server.port())).unwrap();

        assert!(!server.poll().unwrap());
        assert_eq!(server.active_clients(), 1);
        assert!(server.next_message().is_none());
    }

    #[test]
    fn split_message_is_reassembled() {
        let mut server = LineServer::bind(0).unwrap();
        let mut client = connect(&mut server);

        client.write_all(b"A\nB\nC").unwrap();
        let first = poll_until(&mut server, 2);
        assert_eq!(first, vec!["A", "B"]);

        client.write_all(b"\n").unwrap();
        let rest = poll_until(&mut server, 1);
        assert_eq!(rest, vec!["C"]);
    }

    #[test]
    fn poll_returns_true_when_queue_grows() {
        let mut server = LineServer::bind(0).unwrap();
        let mut client = connect(&mut server);

        client.write_all(b"{\"node\":\"x\",\"cmd\":\"y\"}\n").unwrap();
        let mut grew = false;
        while !grew {
            grew = server.poll().unwrap();
        }
        assert_eq!(
            server.next_message().as_deref(),
            Some("{\"node\":\"x\",\"cmd\":\"y\"}")
        );
        assert!(server.next_message().is_none());
    }

    #[test]
    fn disconnect_frees_slot() {
        let mut server = LineServer::bind(0).unwrap();
        let client = connect(&mut server);
        assert_eq!(server.active_clients(), 1);

        drop(client);
        while server.active_clients() == 1 {
            assert!(!server.poll().unwrap());
        }
        assert!(server.slots().iter().all(ClientSlot::is_free));
    }

    #[test]
    fn eleventh_client_is_accepted_then_closed() {
        let mut server = LineServer::bind(0).unwrap();
        let clients: Vec<TcpStream> = (0..MAX_CLIENTS).map(|_| connect(&mut server)).collect();
        assert_eq!(server.active_clients(), MAX_CLIENTS);

        let mut extra = TcpStream::connect(("127.0.0.1", server.port())).unwrap();
        extra
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        assert!(!server.poll().unwrap());
        assert_eq!(server.active_clients(), MAX_CLIENTS);

        let mut buf = [0u8; 1];
        match extra.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => panic!("rejected client unexpectedly received {n} bytes"),
            Err(err) => assert_ne!(err.kind(), ErrorKind::WouldBlock, "socket was not closed"),
        }

        drop(clients);
    }

    #[test]
    fn freed_slot_is_reused_by_next_accept() {
        let mut server = LineServer::bind(0).unwrap();
        let mut clients: Vec<TcpStream> =
            (0..MAX_CLIENTS).map(|_| connect(&mut server)).collect();

        drop(clients.remove(3));
        while server.active_clients() == MAX_CLIENTS {
            server.poll().unwrap();
        }
        assert!(server.slots()[3].is_free());

        let _replacement = connect(&mut server);
        assert_eq!(server.active_clients(), MAX_CLIENTS);
        assert!(!server.slots()[3].is_free());
    }

    #[test]
    fn messages_from_one_client_keep_order() {
        let mut server = LineServer::bind(0).unwrap();
        let mut client = connect(&mut server);

        for i in 0..20 {
            client.write_all(format!("msg-{i}\n").as_bytes()).unwrap();
        }
        let messages = poll_until(&mut server, 20);
        let expected: Vec<String> = (0..20).map(|i| format!("msg-{i}")).collect();
        assert_eq!(messages, expected);
    }

    #[test]
    fn overlong_line_is_dumped_and_connection_kept() {
        let mut server = LineServer::bind(0).unwrap();
        let mut client = connect(&mut server);

        client
            .write_all(&[b'x'; simbridge_frame::LINE_BUFFER_CAPACITY])
            .unwrap();
        while server.slots()[0].pending_bytes() < simbridge_frame::LINE_BUFFER_CAPACITY {
            server.poll().unwrap();
        }

        client.write_all(b"after\n").unwrap();
        let messages = poll_until(&mut server, 1);
        assert_eq!(messages, vec!["after"]);
        assert_eq!(server.active_clients(), 1);
    }

    #[test]
    fn connection_reset_drops_partial_line_and_keeps_slot() {
        let mut server = LineServer::bind(0).unwrap();
        let mut client = connect(&mut server);

        client.write_all(b"half").unwrap();
        while server.slots()[0].pending_bytes() < 4 {
            server.poll().unwrap();
        }

        // Zero linger turns close into a reset.
        socket2::SockRef::from(&client)
            .set_linger(Some(Duration::ZERO))
            .unwrap();
        drop(client);

        assert!(!server.poll().unwrap());
        assert_eq!(server.slots()[0].pending_bytes(), 0);
        assert_eq!(server.active_clients(), 1);

        while server.active_clients() == 1 {
            assert!(!server.poll().unwrap());
        }
        assert!(server.next_message().is_none());
    }

    #[test]
    fn bind_conflict_is_setup_error() {
        let server = LineServer::bind(0).unwrap();
        let result = LineServer::bind(server.port());
        assert!(matches!(
            result,
            Err(ServerError::Transport(TransportError::Bind { .. }))
        ));
    }
}
