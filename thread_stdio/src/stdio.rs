//! Duplex stdio channel between a worker thread and a handle
//!
//! Two bounded buffers and a closed flag:
//! - `input`: filled by handle writes, drained by the worker (`read`, `read_line`)
//! - `output`: filled by the worker (`write`, `printf`), drained by handle reads
//!
//! Once closed, the channel never reopens. Every waiter on either buffer
//! observes the transition: `mark_closed` wakes both conditions and tears
//! down the readiness queues.
//!
//! Worker-side waits are bounded: they sleep for at most
//! `StdioConfig::wait_slice` and re-check, so a worker idling on input is
//! never one unbounded sleep.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::StdioConfig;
use crate::error::StdioError;
use crate::io::buffer::{BoundedBuffer, Growth};
use crate::readiness::ReadinessQueue;

/// Whether an operation may sleep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoMode {
    Blocking,
    NonBlocking,
}

impl IoMode {
    fn growth(self) -> Growth {
        match self {
            IoMode::Blocking => Growth::MayBlock,
            IoMode::NonBlocking => Growth::NoWait,
        }
    }
}

pub struct StdioRedirect {
    pub(crate) input: BoundedBuffer,
    pub(crate) output: BoundedBuffer,
    done: AtomicBool,
    config: StdioConfig,
    readiness: ReadinessQueue,
}

impl StdioRedirect {
    #[must_use]
    pub fn new(config: StdioConfig) -> Self {
        let readiness = ReadinessQueue::new();
        let input = BoundedBuffer::new(readiness.allocate("stdio.input"), config.capacity);
        let output = BoundedBuffer::new(readiness.allocate("stdio.output"), config.capacity);

        Self {
            input,
            output,
            done: AtomicBool::new(false),
            config,
            readiness,
        }
    }

    #[must_use]
    pub fn config(&self) -> &StdioConfig {
        &self.config
    }

    /// Caller-to-worker buffer
    #[must_use]
    pub fn input(&self) -> &BoundedBuffer {
        &self.input
    }

    /// Worker-to-caller buffer
    #[must_use]
    pub fn output(&self) -> &BoundedBuffer {
        &self.output
    }

    #[must_use]
    pub fn readiness(&self) -> &ReadinessQueue {
        &self.readiness
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn has_input(&self) -> bool {
        !self.input.is_empty() || self.is_done()
    }

    #[must_use]
    pub fn has_output(&self) -> bool {
        !self.output.is_empty() || self.is_done()
    }

    #[must_use]
    pub fn has_input_space(&self) -> bool {
        self.input.has_room() || self.is_done()
    }

    #[must_use]
    pub fn has_output_space(&self) -> bool {
        self.output.has_room() || self.is_done()
    }

    /// Read from the input side.
    ///
    /// Buffered data is drained even after the channel closed.
    ///
    /// # Errors
    ///
    /// - `Closed` when the channel is closed and the input is empty
    /// - `WouldBlock` in non-blocking mode when no input is available
    pub fn read(&self, buf: &mut [u8], mode: IoMode) -> Result<usize, StdioError> {
        loop {
            self.wait_for_input(mode)?;

            let n = self.input.consume_into(buf);
            if n > 0 {
                self.input_changed(n);
                return Ok(n);
            }
            if buf.is_empty() {
                return Ok(0);
            }
            if self.is_done() {
                return Err(StdioError::Closed);
            }
            // Another reader drained the buffer between wake and consume
        }
    }

    /// Read one line from the input side, blocking.
    ///
    /// Stops after a newline, when `buf` is full, or when the channel
    /// closed and the input is drained. A partial line left at close is
    /// returned once; the next call reports `Closed`.
    ///
    /// # Errors
    ///
    /// `Closed` if the channel is closed and nothing was copied.
    pub fn read_line(&self, buf: &mut [u8]) -> Result<usize, StdioError> {
        let mut copied = 0;
        while copied < buf.len() {
            self.wait_for_input(IoMode::Blocking)?;

            let (n, newline) = self.input.consume_line_into(&mut buf[copied..]);
            if n > 0 {
                copied += n;
                self.input_changed(n);
                if newline {
                    break;
                }
            } else if self.is_done() {
                break;
            }
        }

        if copied == 0 && !buf.is_empty() {
            return Err(StdioError::Closed);
        }
        Ok(copied)
    }

    /// Write to the output side.
    ///
    /// A write that does not fit is not split: once there is any room the
    /// whole write is appended, growing storage past the capacity. In
    /// non-blocking mode growth must not block; bytes it cannot store are
    /// dropped without an error.
    ///
    /// # Errors
    ///
    /// - `BrokenPipe` if the channel is closed
    /// - `WouldBlock` in non-blocking mode when the output is full
    pub fn write(&self, bytes: &[u8], mode: IoMode) -> Result<usize, StdioError> {
        self.wait_for_output_space(mode)?;
        let n = self.output.append_unbounded(bytes, mode.growth());
        self.output_changed(n);
        Ok(n)
    }

    /// Formatted write to the output side, see `write`.
    ///
    /// # Errors
    ///
    /// Same as `write`.
    pub fn printf(&self, mode: IoMode, args: fmt::Arguments<'_>) -> Result<usize, StdioError> {
        self.wait_for_output_space(mode)?;
        let n = self.output.append_fmt(args, mode.growth());
        self.output_changed(n);
        Ok(n)
    }

    /// Close the channel and wake every waiter.
    ///
    /// Returns `false` if it was already closed.
    pub fn mark_closed(&self) -> bool {
        if self.done.swap(true, Ordering::SeqCst) {
            return false;
        }
        log::debug!("stdio: closed");

        self.input.wake_all();
        self.output.wake_all();
        self.readiness.unlist(self.input.id());
        self.readiness.unlist(self.output.id());
        true
    }

    /// Free storage of both buffers
    pub(crate) fn release_storage(&self) {
        self.input.release_storage();
        self.output.release_storage();
    }

    /// Bytes were added to or taken from the input
    pub(crate) fn input_changed(&self, n: usize) {
        self.input.notify_waiters();
        self.readiness.notify(self.input.id(), wake_arg(n));
    }

    /// Bytes were added to or taken from the output
    pub(crate) fn output_changed(&self, n: usize) {
        self.output.notify_waiters();
        self.readiness.notify(self.output.id(), wake_arg(n));
    }

    fn wait_for_input(&self, mode: IoMode) -> Result<(), StdioError> {
        match mode {
            IoMode::NonBlocking => {
                if self.has_input() {
                    Ok(())
                } else {
                    Err(StdioError::WouldBlock)
                }
            }
            IoMode::Blocking => {
                // We're waiting on caller input (or for the handle to be
                // closed); no interrupt source on the worker side.
                self.input.wait_until(
                    |data| !data.is_empty() || self.is_done(),
                    self.config.wait_slice(),
                    || false,
                );
                Ok(())
            }
        }
    }

    fn wait_for_output_space(&self, mode: IoMode) -> Result<(), StdioError> {
        if self.is_done() {
            return Err(StdioError::BrokenPipe);
        }
        match mode {
            IoMode::NonBlocking => {
                if !self.has_output_space() {
                    return Err(StdioError::WouldBlock);
                }
            }
            IoMode::Blocking => {
                let capacity = self.output.capacity();
                self.output.wait_until(
                    |data| data.len() < capacity || self.is_done(),
                    self.config.wait_slice(),
                    || false,
                );
            }
        }
        if self.is_done() {
            return Err(StdioError::BrokenPipe);
        }
        Ok(())
    }
}

impl fmt::Debug for StdioRedirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdioRedirect")
            .field("input", &self.input)
            .field("output", &self.output)
            .field("done", &self.is_done())
            .finish()
    }
}

fn wake_arg(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Formatted write to a `StdioRedirect`
///
/// ```
/// use thread_stdio::{stdio_printf, IoMode, StdioConfig, StdioRedirect};
///
/// let stdio = StdioRedirect::new(StdioConfig::default());
/// stdio_printf!(stdio, IoMode::Blocking, "{} + {} = {}\n", 1, 2, 1 + 2).unwrap();
/// assert_eq!(stdio.output().consume(64), b"1 + 2 = 3\n");
/// ```
#[macro_export]
macro_rules! stdio_printf {
    ($stdio:expr, $mode:expr, $($arg:tt)*) => {
        $stdio.printf($mode, ::std::format_args!($($arg)*))
    };
}
