//! Outbound TCP connect with bounded retries and a fixed delay.

use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::error::{Result, TransportError};

/// Bounded-retry policy for outbound connections.
///
/// One initial attempt plus `max_attempts` retries, with `retry_wait` slept
/// between attempts (never after the last one).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of retries after the initial attempt.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub retry_wait: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, retry_wait: Duration) -> Self {
        Self {
            max_attempts,
            retry_wait,
        }
    }

    /// Total attempts made before giving up.
    pub fn total_attempts(&self) -> u32 {
        self.max_attempts.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_wait: Duration::from_secs(5),
        }
    }
}

/// Connect to `host:port`, retrying according to `policy`.
///
/// Each attempt resolves the host (IPv4 and IPv6) and tries every returned
/// address in order until one connects. Resolution failure is fatal and not
/// retried. When every attempt fails the last connect error is returned in
/// [`TransportError::ConnectExhausted`].
pub fn connect_with_retry(host: &str, port: u16, policy: &RetryPolicy) -> Result<TcpStream> {
    connect_with(
        host,
        port,
        policy,
        |host, port| (host, port).to_socket_addrs().map(|addrs| addrs.collect()),
        |addr| TcpStream::connect(addr),
        std::thread::sleep,
    )
}

pub(crate) fn connect_with<T, R, C, S>(
    host: &str,
    port: u16,
    policy: &RetryPolicy,
    mut resolve: R,
    mut connect: C,
    mut sleep: S,
) -> Result<T>
where
    R: FnMut(&str, u16) -> io::Result<Vec<SocketAddr>>,
    C: FnMut(&SocketAddr) -> io::Result<T>,
    S: FnMut(Duration),
{
    let total = policy.total_attempts();
    let mut last_err = None;

    for attempt in 1..=total {
        let addrs = match resolve(host, port) {
            Ok(addrs) if !addrs.is_empty() => addrs,
            Ok(_) => {
                return Err(TransportError::Resolve {
                    host: host.to_string(),
                    port,
                    source: io::Error::new(io::ErrorKind::NotFound, "no addresses returned"),
                })
            }
            Err(source) => {
                error!(host, port, error = %source, "address resolution failed");
                return Err(TransportError::Resolve {
                    host: host.to_string(),
                    port,
                    source,
                });
            }
        };

        for addr in &addrs {
            match connect(addr) {
                Ok(stream) => {
                    debug!(host, port, %addr, attempt, "connected");
                    return Ok(stream);
                }
                Err(err) => {
                    warn!(host, port, %addr, error = %err, "could not connect, trying next address");
                    last_err = Some(err);
                }
            }
        }

        if attempt == total {
            error!(
                host,
                port,
                attempts = total,
                "maximum number of connection attempts reached"
            );
            break;
        }

        warn!(
            host,
            port,
            attempt,
            retry_wait = ?policy.retry_wait,
            "failed to connect, retrying"
        );
        sleep(policy.retry_wait);
    }

    Err(TransportError::ConnectExhausted {
        host: host.to_string(),
        port,
        attempts: total,
        source: last_err.unwrap_or_else(|| io::Error::other("no connection attempt made")),
    })
}
