/// Errors that can occur while setting up or reading a provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Connecting the telemetry stream failed.
    #[error("transport error: {0}")]
    Transport(#[from] simbridge_transport::TransportError),

    /// Shared-memory setup or locking failed.
    #[error("shared memory error: {0}")]
    Shm(#[from] ShmError),

    /// The background reader thread could not be started.
    #[error("failed to spawn telemetry reader thread: {0}")]
    ThreadSpawn(std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors from POSIX shared-memory segments.
#[derive(Debug, thiserror::Error)]
pub enum ShmError {
    /// Segment name is not a valid POSIX shared-memory name.
    #[error("invalid shared memory name: {0}")]
    InvalidName(String),

    /// `shm_open` failed.
    #[error("failed to open shared memory segment: {0}")]
    SegmentOpen(std::io::Error),

    /// Sizing the segment failed.
    #[error("failed to size shared memory segment: {0}")]
    Truncate(std::io::Error),

    /// `mmap` failed.
    #[error("failed to map shared memory segment: {0}")]
    Mmap(std::io::Error),

    /// Initialising the embedded process-shared mutex failed.
    #[error("failed to initialise shared mutex: {0}")]
    MutexInit(std::io::Error),

    /// Acquiring the embedded mutex failed.
    #[error("failed to lock shared mutex: {0}")]
    Lock(std::io::Error),
}
