//! Error types for the stdio channel and the handle layer
//!
//! `StdioError` is what read/write/poll surface to both sides of the
//! channel. It is `Copy` so it can be returned from many waiters without
//! allocation, and converts to `std::io::Error`, to an errno and to
//! `embedded_io::ErrorKind`.

use std::io;

/// Error kinds produced by buffer, channel and handle operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StdioError {
    /// A non-blocking operation cannot make progress right now
    #[error("operation would block")]
    WouldBlock,

    /// End of stream: the channel is closed and no data is left
    #[error("end of stream")]
    Closed,

    /// Write attempted after the channel was closed
    #[error("broken pipe")]
    BrokenPipe,

    /// A blocking wait was aborted by an interrupt request
    #[error("interrupted")]
    Interrupted,

    /// Caller memory could not be accessed during a copy
    #[error("bad address")]
    Fault,

    /// The handle was already released, or the descriptor is unknown
    #[error("bad file descriptor")]
    BadDescriptor,

    /// The file does not implement the requested operation
    #[error("operation not supported")]
    NotSupported,

    /// The descriptor table is full
    #[error("too many open files")]
    TooManyFiles,
}

impl StdioError {
    /// POSIX errno for this error.
    ///
    /// `Closed` maps to 0: at the descriptor layer end-of-stream is a
    /// successful zero-length read, not an error.
    #[must_use]
    pub fn errno(self) -> i32 {
        match self {
            StdioError::WouldBlock => 11,    // EAGAIN
            StdioError::Closed => 0,
            StdioError::BrokenPipe => 32,    // EPIPE
            StdioError::Interrupted => 4,    // EINTR
            StdioError::Fault => 14,         // EFAULT
            StdioError::BadDescriptor => 9,  // EBADF
            StdioError::NotSupported => 22,  // EINVAL
            StdioError::TooManyFiles => 24,  // EMFILE
        }
    }
}

impl From<StdioError> for io::Error {
    fn from(e: StdioError) -> Self {
        let kind = match e {
            StdioError::WouldBlock => io::ErrorKind::WouldBlock,
            StdioError::Closed => io::ErrorKind::UnexpectedEof,
            StdioError::BrokenPipe => io::ErrorKind::BrokenPipe,
            StdioError::Interrupted => io::ErrorKind::Interrupted,
            StdioError::Fault | StdioError::BadDescriptor => io::ErrorKind::InvalidInput,
            StdioError::NotSupported => io::ErrorKind::Unsupported,
            StdioError::TooManyFiles => io::ErrorKind::Other,
        };
        io::Error::new(kind, e)
    }
}

impl embedded_io::Error for StdioError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            StdioError::BrokenPipe => embedded_io::ErrorKind::BrokenPipe,
            StdioError::Interrupted => embedded_io::ErrorKind::Interrupted,
            StdioError::Fault | StdioError::BadDescriptor => embedded_io::ErrorKind::InvalidInput,
            StdioError::NotSupported => embedded_io::ErrorKind::Unsupported,
            StdioError::WouldBlock | StdioError::Closed | StdioError::TooManyFiles => {
                embedded_io::ErrorKind::Other
            }
        }
    }
}

/// Failure to start a worker behind a handle
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),

    #[error("failed to install handle: {0}")]
    Install(#[from] StdioError),
}

/// Failure to load a `StdioConfig`
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid value {value:?} for {var}")]
    Env { var: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(&'static str),
}
