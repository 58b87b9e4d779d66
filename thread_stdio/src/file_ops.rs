//! Operation table of an externally visible handle

use crate::error::StdioError;
use crate::io::{UserBuf, UserBufMut};
use crate::poll::{PollMask, PollTable};
use crate::stdio::IoMode;

/// Which directions a handle was opened for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    #[must_use]
    pub fn can_read(self) -> bool {
        matches!(self, AccessMode::ReadOnly | AccessMode::ReadWrite)
    }

    #[must_use]
    pub fn can_write(self) -> bool {
        matches!(self, AccessMode::WriteOnly | AccessMode::ReadWrite)
    }
}

/// Per-open flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    pub access: AccessMode,
    pub nonblocking: bool,
}

impl OpenFlags {
    #[must_use]
    pub fn new(access: AccessMode) -> Self {
        Self {
            access,
            nonblocking: false,
        }
    }

    #[must_use]
    pub fn mode(&self) -> IoMode {
        if self.nonblocking {
            IoMode::NonBlocking
        } else {
            IoMode::Blocking
        }
    }
}

/// Operations a handle dispatches to
///
/// Implementations must tolerate concurrent calls from several caller
/// threads and a concurrent `release`.
pub trait FileOps: Send + Sync {
    /// Directions this file supports; decides the handle's access mode
    fn access(&self) -> AccessMode;

    /// # Errors
    ///
    /// `NotSupported` unless the file implements reading.
    fn read(&self, _buf: &mut dyn UserBufMut, _flags: OpenFlags) -> Result<usize, StdioError> {
        Err(StdioError::NotSupported)
    }

    /// # Errors
    ///
    /// `NotSupported` unless the file implements writing.
    fn write(&self, _buf: &dyn UserBuf, _flags: OpenFlags) -> Result<usize, StdioError> {
        Err(StdioError::NotSupported)
    }

    /// Current readiness; registers `table` on the relevant wait queues
    fn poll(&self, _table: Option<&PollTable>) -> PollMask {
        PollMask::IN | PollMask::OUT
    }

    /// Abort blocking caller operations in progress
    fn interrupt(&self) {}

    /// Last close of the handle
    fn release(&self);
}
