//! Read the worker's redirected stdin.
//!
//! End of stream is a zero-length read, as for any reader; the channel's
//! `Closed` error does not leak through this type.
//!
//! # Example
//!
//! ```no_run
//! use embedded_io::Read;
//! use stdio_io::StdinReader;
//! use thread_stdio::ThreadWithStdio;
//!
//! fn worker(thr: &ThreadWithStdio) -> i32 {
//!     let mut reader = StdinReader::new(thr.stdio());
//!     let mut chunk = [0u8; 1024];
//!     let mut total = 0;
//!     loop {
//!         let n = reader.read(&mut chunk).unwrap();
//!         if n == 0 {
//!             break;
//!         }
//!         total += n;
//!     }
//!     i32::from(total > 0)
//! }
//! ```

use thread_stdio::{IoMode, StdioError, StdioRedirect};

pub struct StdinReader<'a> {
    stdio: &'a StdioRedirect,
    mode: IoMode,
}

impl<'a> StdinReader<'a> {
    /// Blocking reader
    #[must_use]
    pub fn new(stdio: &'a StdioRedirect) -> Self {
        Self {
            stdio,
            mode: IoMode::Blocking,
        }
    }

    /// Reader that fails with `WouldBlock` instead of waiting
    #[must_use]
    pub fn nonblocking(stdio: &'a StdioRedirect) -> Self {
        Self {
            stdio,
            mode: IoMode::NonBlocking,
        }
    }

    /// Read up to and including a newline, blocking.
    ///
    /// Returns 0 at end of stream. A last line without a newline is
    /// returned as is.
    ///
    /// # Errors
    ///
    /// Channel errors other than end of stream.
    pub fn read_line(&mut self, buf: &mut [u8]) -> Result<usize, StdioError> {
        match self.stdio.read_line(buf) {
            Err(StdioError::Closed) => Ok(0),
            res => res,
        }
    }

    /// Read a whole line into a string, without the newline.
    ///
    /// Invalid UTF-8 is replaced. Returns `None` at end of stream.
    ///
    /// # Errors
    ///
    /// See `read_line`.
    pub fn read_line_string(&mut self) -> Result<Option<String>, StdioError> {
        let mut line = Vec::new();
        let mut chunk = [0u8; 256];
        loop {
            let n = self.read_line(&mut chunk)?;
            if n == 0 {
                break;
            }
            line.extend_from_slice(&chunk[..n]);
            if chunk[n - 1] == b'\n' {
                line.pop();
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }
        }
        if line.is_empty() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }
}

impl embedded_io::ErrorType for StdinReader<'_> {
    type Error = StdioError;
}

impl embedded_io::Read for StdinReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        match self.stdio.read(buf, self.mode) {
            Err(StdioError::Closed) => Ok(0),
            res => res,
        }
    }
}

impl std::io::Read for StdinReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        embedded_io::Read::read(self, buf).map_err(std::io::Error::from)
    }
}

impl core::fmt::Debug for StdinReader<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StdinReader").field("mode", &self.mode).finish()
    }
}
