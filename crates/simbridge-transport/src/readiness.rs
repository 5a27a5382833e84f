//! Blocking readiness wait over raw descriptors.

use std::os::fd::RawFd;
use std::time::Duration;

/// Result of a readiness wait, indexed like the descriptor slice passed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
    ready: Vec<bool>,
}

impl Readiness {
    /// Whether the descriptor at `index` has input (or a hangup/error) pending.
    pub fn is_ready(&self, index: usize) -> bool {
        self.ready.get(index).copied().unwrap_or(false)
    }

    /// Number of ready descriptors.
    pub fn count(&self) -> usize {
        self.ready.iter().filter(|r| **r).count()
    }
}

/// Block until at least one descriptor in `fds` is readable.
///
/// `None` waits forever; only new input or a signal releases the wait. A
/// signal surfaces as an [`std::io::ErrorKind::Interrupted`] error so the
/// caller can check its liveness flag. Hangups and socket errors count as
/// readable: the following read observes them.
pub fn wait_readable(fds: &[RawFd], timeout: Option<Duration>) -> std::io::Result<Readiness> {
    let mut pollfds: Vec<libc::pollfd> = fds
        .iter()
        .map(|fd| libc::pollfd {
            fd: *fd,
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();

    let timeout_ms = match timeout {
        Some(t) => i32::try_from(t.as_millis()).unwrap_or(i32::MAX),
        None => -1,
    };

    // SAFETY: `pollfds` is a valid, initialised array of `pollfds.len()` entries
    // that stays alive and unaliased for the duration of the call.
    let rc = unsafe {
        libc::poll(
            pollfds.as_mut_ptr(),
            pollfds.len() as libc::nfds_t,
            timeout_ms,
        )
    };

    if rc < 0 {
        return Err(std::io::Error::last_os_error());
    }

    let ready = pollfds
        .iter()
        .map(|p| p.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0)
        .collect();

    Ok(Readiness { ready })
}
