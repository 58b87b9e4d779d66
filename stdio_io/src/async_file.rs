//! Async access to a worker handle.
//!
//! The handle is switched to non-blocking mode; operations that would
//! block await the handle's readiness instead, so no runtime thread is
//! parked on a channel condition variable.

use embedded_io_async::{ErrorType, Read, Write};
use thread_stdio::{StdioError, StdioFile};

pub struct AsyncFile {
    file: StdioFile,
}

impl AsyncFile {
    #[must_use]
    pub fn new(mut file: StdioFile) -> Self {
        file.set_nonblocking(true);
        Self { file }
    }

    #[must_use]
    pub fn file(&self) -> &StdioFile {
        &self.file
    }

    /// Give the handle back, in blocking mode
    #[must_use]
    pub fn into_inner(mut self) -> StdioFile {
        self.file.set_nonblocking(false);
        self.file
    }
}

impl ErrorType for AsyncFile {
    type Error = StdioError;
}

impl Read for AsyncFile {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        loop {
            match self.file.read(buf) {
                Err(StdioError::WouldBlock) => self.file.readable().await,
                res => return res,
            }
        }
    }
}

impl Write for AsyncFile {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        loop {
            match self.file.write(buf) {
                Err(StdioError::WouldBlock) => self.file.writable().await,
                res => return res,
            }
        }
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl core::fmt::Debug for AsyncFile {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AsyncFile").field("file", &self.file).finish()
    }
}
