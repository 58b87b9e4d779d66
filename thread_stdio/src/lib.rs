pub mod config;
pub mod error;
pub mod fd_table;
pub mod file_ops;
pub mod io;
pub mod poll;
pub mod readiness;
pub mod stdio;
pub mod thread_with_file;
pub mod thread_with_stdio;

// Re-export error types for convenience
pub use error::{ConfigError, RunError, StdioError};

pub use config::{StdioConfig, STDIO_REDIRECT_BUFSIZE};

// Re-export channel types for convenience
pub use io::{BoundedBuffer, Growth, UserBuf, UserBufMut};
pub use stdio::{IoMode, StdioRedirect};

// Re-export handle layer types
pub use fd_table::{Fd, FdTable};
pub use file_ops::{AccessMode, FileOps, OpenFlags};
pub use poll::{PollMask, PollTable};

pub use readiness::{PollEntry, ReadinessQueue, WaitQueueId, WakeArg, HANGUP};

// Re-export thread runners
pub use thread_with_file::{
    run_thread_with_file, PendingStart, StdSpawner, ThreadEntry, ThreadSpawner, ThreadWithFile,
};
pub use thread_with_stdio::{ExitFn, LifecycleState, StdioFile, ThreadWithStdio, WorkerFn};
