//! A worker thread with redirected stdio, exposed as a handle
//!
//! The worker gets a `StdioRedirect`: it reads what callers write to the
//! handle and writes what callers read from it. The handle side is the
//! `FileOps` implementation below.
//!
//! ```text
//!   caller                    ThreadWithStdio                  worker
//!   write(fd) ──────────────► stdio.input  ─────────────────►  read / read_line
//!   read(fd)  ◄────────────── stdio.output ◄─────────────────  write / printf
//!   poll(fd)  ── IN: output non-empty, OUT: input has room, HUP|ERR: closed
//!   close(fd) ── release: close, join worker, free buffers, exit callback
//! ```
//!
//! Lifecycle: `Created -> Running -> Closed -> Released`. The channel is
//! closed as soon as the worker returns or the handle is released,
//! whichever comes first; `Released` is terminal. A worker that releases
//! its own handle only closes the channel; buffers are freed and the exit
//! callback runs once its entry function has returned.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::StdioConfig;
use crate::error::{RunError, StdioError};
use crate::fd_table::{Fd, FdTable};
use crate::file_ops::{AccessMode, FileOps, OpenFlags};
use crate::io::buffer::WaitOutcome;
use crate::io::{UserBuf, UserBufMut};
use crate::poll::{self, PollMask, PollTable};
use crate::stdio::StdioRedirect;
use crate::thread_with_file::{run_thread_with_file, ThreadEntry, ThreadSpawner, ThreadWithFile};

/// Worker body; the return value is the exit code
pub type WorkerFn = Box<dyn FnOnce(&ThreadWithStdio) -> i32 + Send + 'static>;

/// Called once when the handle is released
pub type ExitFn = Box<dyn FnOnce(&ThreadWithStdio) + Send + 'static>;

/// Largest piece copied to caller memory at once
const COPY_CHUNK: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Running,
    Closed,
    Released,
}

pub struct ThreadWithStdio {
    thr: ThreadWithFile,
    stdio: StdioRedirect,
    state: Mutex<LifecycleState>,
    exit: Mutex<Option<ExitFn>>,
    interrupts: AtomicU64,
    releasing: AtomicBool,
    deferred: AtomicBool,
}

impl ThreadWithStdio {
    fn new(config: StdioConfig, exit: Option<ExitFn>) -> Arc<Self> {
        Arc::new(Self {
            thr: ThreadWithFile::new(),
            stdio: StdioRedirect::new(config),
            state: Mutex::new(LifecycleState::Created),
            exit: Mutex::new(exit),
            interrupts: AtomicU64::new(0),
            releasing: AtomicBool::new(false),
            deferred: AtomicBool::new(false),
        })
    }

    /// Start `worker` and publish its handle in `table`.
    ///
    /// `exit` runs once, after the handle was released and the worker
    /// joined.
    ///
    /// # Errors
    ///
    /// See `run_thread_with_file`. On error the worker never ran and
    /// `exit` is not called.
    pub fn run(
        table: &FdTable,
        spawner: &dyn ThreadSpawner,
        config: StdioConfig,
        exit: Option<ExitFn>,
        worker: WorkerFn,
    ) -> Result<(Fd, Arc<Self>), RunError> {
        let this = Self::new(config, exit);
        let entry = Self::entry(&this, worker);
        let ops: Arc<dyn FileOps> = this.clone();
        let fd = run_thread_with_file(table, spawner, &this.thr, ops, entry)?;
        Ok((fd, this))
    }

    /// Start `worker` behind an owned handle instead of a descriptor.
    ///
    /// # Errors
    ///
    /// `RunError::Spawn` if the thread cannot be created.
    pub fn open(
        spawner: &dyn ThreadSpawner,
        config: StdioConfig,
        exit: Option<ExitFn>,
        worker: WorkerFn,
    ) -> Result<StdioFile, RunError> {
        let this = Self::new(config, exit);
        let entry = Self::entry(&this, worker);
        this.thr.create(spawner, entry)?.start();
        info!("thread with stdio opened");
        Ok(StdioFile {
            flags: OpenFlags::new(this.access()),
            inner: this,
        })
    }

    fn entry(this: &Arc<Self>, worker: WorkerFn) -> ThreadEntry {
        let this = Arc::clone(this);
        Box::new(move || {
            {
                let mut state = this.state.lock();
                if *state == LifecycleState::Created {
                    *state = LifecycleState::Running;
                }
            }
            let _done = DoneGuard(&this);
            let ret = worker(&this);
            this.thr.set_exit_code(ret);
            debug!(exit_code = ret, "worker returned");
            ret
        })
    }

    fn done(&self) {
        self.thr.mark_done();
        {
            let mut state = self.state.lock();
            if matches!(*state, LifecycleState::Created | LifecycleState::Running) {
                *state = LifecycleState::Closed;
            }
        }
        self.stdio.mark_closed();
    }

    /// The worker's side of the channel
    #[must_use]
    pub fn stdio(&self) -> &StdioRedirect {
        &self.stdio
    }

    /// Has the handle been released; workers should return soon
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.thr.should_stop()
    }

    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.thr.exit_code()
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// Abort every blocking caller read or write in progress.
    ///
    /// Calls started afterwards are not affected.
    pub fn interrupt(&self) {
        let generation = self.interrupts.fetch_add(1, Ordering::SeqCst) + 1;
        self.stdio.input.wake_all();
        self.stdio.output.wake_all();
        debug!(generation, "caller waits interrupted");
    }

    fn interrupt_generation(&self) -> u64 {
        self.interrupts.load(Ordering::SeqCst)
    }

    fn interrupted_since(&self, generation: u64) -> bool {
        self.interrupts.load(Ordering::SeqCst) != generation
    }

    /// Free the buffers, run the exit callback and mark the handle released
    fn finish_release(&self) {
        self.stdio.release_storage();

        let exit = self.exit.lock().take();
        if let Some(exit) = exit {
            exit(self);
        }
        *self.state.lock() = LifecycleState::Released;
        info!(exit_code = self.exit_code(), "thread with stdio released");
    }

    fn check_open(&self) -> Result<(), StdioError> {
        if self.state() == LifecycleState::Released {
            return Err(StdioError::BadDescriptor);
        }
        Ok(())
    }

    /// Resolves once a handle read would not block
    pub async fn readable(&self) {
        let queue = self.stdio.readiness();
        loop {
            let lock = queue.get_lock();
            if self.stdio.has_output() {
                return;
            }
            queue.wait_async(self.stdio.output.id(), "readable", lock).await;
        }
    }

    /// Resolves once a handle write would not block
    pub async fn writable(&self) {
        let queue = self.stdio.readiness();
        loop {
            let lock = queue.get_lock();
            if self.stdio.has_input_space() {
                return;
            }
            queue.wait_async(self.stdio.input.id(), "writable", lock).await;
        }
    }
}

impl FileOps for ThreadWithStdio {
    fn access(&self) -> AccessMode {
        AccessMode::ReadWrite
    }

    /// Read worker output.
    ///
    /// Returns 0 at end of stream (closed and drained).
    fn read(&self, buf: &mut dyn UserBufMut, flags: OpenFlags) -> Result<usize, StdioError> {
        self.check_open()?;
        let generation = self.interrupt_generation();
        let output = &self.stdio.output;

        if flags.nonblocking {
            if !self.stdio.has_output() {
                return Err(StdioError::WouldBlock);
            }
        } else {
            let outcome = output.wait_until(
                |data| !data.is_empty() || self.stdio.is_done(),
                self.stdio.config().wait_slice(),
                || self.interrupted_since(generation),
            );
            if outcome == WaitOutcome::Interrupted {
                return Err(StdioError::Interrupted);
            }
        }

        let mut copied = 0;
        let mut fault = false;
        {
            let mut data = output.lock();
            let want = buf.len().min(data.len());
            while copied < want {
                let n = buf
                    .fault_in_writeable(copied, want - copied)
                    .min(COPY_CHUNK);
                if n == 0 || buf.copy_to_user(copied, &data[copied..copied + n]).is_err() {
                    fault = true;
                    break;
                }
                copied += n;
            }
            data.drain(..copied);
        }

        if copied > 0 {
            self.stdio.output_changed(copied);
            return Ok(copied);
        }
        if fault {
            return Err(StdioError::Fault);
        }
        Ok(0)
    }

    /// Write worker input, bounded by the buffer capacity.
    ///
    /// Returns the bytes accepted, or the first error if none were.
    fn write(&self, buf: &dyn UserBuf, flags: OpenFlags) -> Result<usize, StdioError> {
        self.check_open()?;
        let generation = self.interrupt_generation();
        let input = &self.stdio.input;
        let capacity = input.capacity();
        let mut copied = 0;

        let err = loop {
            if copied == buf.len() {
                return Ok(copied);
            }
            if self.stdio.is_done() {
                break StdioError::BrokenPipe;
            }
            let avail = buf.fault_in_readable(copied, buf.len() - copied);
            if avail == 0 {
                break StdioError::Fault;
            }

            let n = {
                let mut data = input.lock();
                let old = data.len();
                let n = avail.min(capacity.saturating_sub(old));
                if n > 0 {
                    data.resize(old + n, 0);
                    if buf.copy_from_user(copied, &mut data[old..]).is_err() {
                        data.truncate(old);
                        drop(data);
                        break StdioError::Fault;
                    }
                }
                n
            };

            if n > 0 {
                copied += n;
                self.stdio.input_changed(n);
            } else if flags.nonblocking {
                break StdioError::WouldBlock;
            } else {
                let outcome = input.wait_until(
                    |data| data.len() < capacity || self.stdio.is_done(),
                    self.stdio.config().wait_slice(),
                    || self.interrupted_since(generation),
                );
                if outcome == WaitOutcome::Interrupted {
                    break StdioError::Interrupted;
                }
            }
        };

        if copied > 0 {
            Ok(copied)
        } else {
            Err(err)
        }
    }

    fn poll(&self, table: Option<&PollTable>) -> PollMask {
        if let Some(table) = table {
            table.poll_wait(self.stdio.readiness(), self.stdio.output.id());
            table.poll_wait(self.stdio.readiness(), self.stdio.input.id());
        }

        let mut mask = PollMask::empty();
        if self.stdio.has_output() {
            mask |= PollMask::IN;
        }
        if self.stdio.has_input_space() {
            mask |= PollMask::OUT;
        }
        if self.stdio.is_done() {
            mask |= PollMask::HUP | PollMask::ERR;
        }
        mask
    }

    fn interrupt(&self) {
        ThreadWithStdio::interrupt(self);
    }

    fn release(&self) {
        if self.releasing.swap(true, Ordering::SeqCst) {
            debug!("thread with stdio already released");
            return;
        }

        self.done();
        if self.thr.is_current() {
            // Still on the worker's stack; DoneGuard finishes the release
            self.thr.request_stop();
            self.deferred.store(true, Ordering::SeqCst);
            debug!("worker released its own handle");
            return;
        }
        self.thr.exit();
        self.finish_release();
    }
}

impl fmt::Debug for ThreadWithStdio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadWithStdio")
            .field("state", &self.state())
            .field("stdio", &self.stdio)
            .field("exit_code", &self.exit_code())
            .finish_non_exhaustive()
    }
}

/// Closes the channel however the worker leaves its entry function
struct DoneGuard<'a>(&'a ThreadWithStdio);

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            warn!("worker panicked, closing stdio");
        }
        self.0.done();
        if self.0.deferred.load(Ordering::SeqCst) {
            self.0.thr.exit();
            self.0.finish_release();
        }
    }
}

/// Owned handle to a `ThreadWithStdio`, released on drop
pub struct StdioFile {
    inner: Arc<ThreadWithStdio>,
    flags: OpenFlags,
}

impl StdioFile {
    /// # Errors
    ///
    /// See `FileOps::read` for `ThreadWithStdio`.
    pub fn read(&self, mut buf: &mut [u8]) -> Result<usize, StdioError> {
        self.inner.read(&mut buf, self.flags)
    }

    /// # Errors
    ///
    /// See `FileOps::write` for `ThreadWithStdio`.
    pub fn write(&self, buf: &[u8]) -> Result<usize, StdioError> {
        self.inner.write(&buf, self.flags)
    }

    /// Current readiness without waiting
    #[must_use]
    pub fn poll(&self) -> PollMask {
        self.inner.poll(None)
    }

    /// Wait for `interest` (or hang-up), see `poll::poll`
    #[must_use]
    pub fn poll_timeout(&self, interest: PollMask, timeout: Option<Duration>) -> PollMask {
        poll::poll(self.inner.as_ref(), interest, timeout)
    }

    pub fn set_nonblocking(&mut self, nonblocking: bool) {
        self.flags.nonblocking = nonblocking;
    }

    #[must_use]
    pub fn is_nonblocking(&self) -> bool {
        self.flags.nonblocking
    }

    pub fn interrupt(&self) {
        self.inner.interrupt();
    }

    /// Release now; same as dropping
    pub fn close(self) {}

    #[must_use]
    pub fn thread(&self) -> &ThreadWithStdio {
        &self.inner
    }

    pub async fn readable(&self) {
        self.inner.readable().await;
    }

    pub async fn writable(&self) {
        self.inner.writable().await;
    }
}

impl fmt::Debug for StdioFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdioFile")
            .field("flags", &self.flags)
            .field("inner", &self.inner)
            .finish()
    }
}

impl Drop for StdioFile {
    fn drop(&mut self) {
        self.inner.release();
    }
}
