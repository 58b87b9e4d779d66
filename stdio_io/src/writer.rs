//! Write the worker's redirected stdout.
//!
//! # Example
//!
//! ```
//! use embedded_io::Write;
//! use stdio_io::StdoutWriter;
//! use thread_stdio::{StdioConfig, StdioRedirect};
//!
//! let stdio = StdioRedirect::new(StdioConfig::default());
//! let mut writer = StdoutWriter::new(&stdio);
//! writer.write_all(b"Hello, world!").unwrap();
//! assert_eq!(stdio.output().consume(64), b"Hello, world!");
//! ```

use thread_stdio::{IoMode, StdioError, StdioRedirect};

pub struct StdoutWriter<'a> {
    stdio: &'a StdioRedirect,
    mode: IoMode,
}

impl<'a> StdoutWriter<'a> {
    /// Blocking writer
    #[must_use]
    pub fn new(stdio: &'a StdioRedirect) -> Self {
        Self {
            stdio,
            mode: IoMode::Blocking,
        }
    }

    /// Writer that never waits for room.
    ///
    /// Writes fail with `WouldBlock` while the output is full, and may
    /// silently lose bytes when storage cannot grow without blocking.
    #[must_use]
    pub fn nonblocking(stdio: &'a StdioRedirect) -> Self {
        Self {
            stdio,
            mode: IoMode::NonBlocking,
        }
    }

    #[must_use]
    pub fn mode(&self) -> IoMode {
        self.mode
    }
}

impl embedded_io::ErrorType for StdoutWriter<'_> {
    type Error = StdioError;
}

impl embedded_io::Write for StdoutWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.stdio.write(buf, self.mode)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl std::io::Write for StdoutWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        embedded_io::Write::write(self, buf).map_err(std::io::Error::from)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl core::fmt::Write for StdoutWriter<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        embedded_io::Write::write_all(self, s.as_bytes()).map_err(|_| core::fmt::Error)
    }
}

impl core::fmt::Debug for StdoutWriter<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StdoutWriter").field("mode", &self.mode).finish()
    }
}
