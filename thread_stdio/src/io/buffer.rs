//! Bounded byte buffer with its own lock and wait condition
//!
//! The primitives here never block and never fail. Backpressure and
//! blocking are decided by the channel on top; this type only offers the
//! memory operations and a bounded wait helper.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::fmt;
use std::time::{Duration, Instant};

use crate::readiness::WaitQueueId;

/// How a write may grow storage past the nominal capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Growth {
    /// Growing may block in the allocator
    MayBlock,
    /// Growing must fail fast; bytes that do not fit are dropped
    NoWait,
}

/// Fail-fast reservation of `additional` bytes; `false` when no storage
/// can be obtained without blocking
pub(crate) type Reserve = fn(&mut Vec<u8>, usize) -> bool;

fn try_reserve_nowait(data: &mut Vec<u8>, additional: usize) -> bool {
    data.try_reserve_exact(additional).is_ok()
}

/// Outcome of a bounded wait on a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitOutcome {
    Ready,
    Interrupted,
}

/// Byte queue bounded by a fixed capacity
///
/// # Thread Safety
///
/// All operations take the internal `parking_lot::Mutex` only for the
/// duration of the memory operation. Waiters sleep on the paired
/// `Condvar`; wake order across several waiters is unspecified.
pub struct BoundedBuffer {
    id: WaitQueueId,
    capacity: usize,
    data: Mutex<Vec<u8>>,
    wait: Condvar,
    reserve: Reserve,
}

impl BoundedBuffer {
    /// Create an empty buffer with storage for `capacity` bytes reserved
    #[must_use]
    pub fn new(id: WaitQueueId, capacity: usize) -> Self {
        Self {
            id,
            capacity,
            data: Mutex::new(Vec::with_capacity(capacity)),
            wait: Condvar::new(),
            reserve: try_reserve_nowait,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_reserve(mut self, reserve: Reserve) -> Self {
        self.reserve = reserve;
        self
    }

    #[must_use]
    pub fn id(&self) -> WaitQueueId {
        self.id
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }

    /// Is there room below the nominal capacity
    #[must_use]
    pub fn has_room(&self) -> bool {
        self.data.lock().len() < self.capacity
    }

    /// Copy as many leading bytes as fit below the capacity.
    ///
    /// Returns how many were written, possibly 0.
    pub fn append(&self, bytes: &[u8]) -> usize {
        let mut data = self.data.lock();
        let n = bytes.len().min(self.capacity.saturating_sub(data.len()));
        data.extend_from_slice(&bytes[..n]);
        n
    }

    /// Append a whole write, growing past the capacity if needed.
    ///
    /// With `Growth::NoWait` a failed reservation silently drops the bytes
    /// that do not fit into already reserved storage.
    pub fn append_unbounded(&self, bytes: &[u8], growth: Growth) -> usize {
        let mut data = self.data.lock();
        extend_with_growth(&mut data, bytes, growth, self.reserve)
    }

    /// Format directly into the buffer, growing past the capacity if needed.
    ///
    /// Same dropping rule as `append_unbounded`; once a piece is dropped,
    /// all later pieces of the same message are dropped too.
    pub fn append_fmt(&self, args: fmt::Arguments<'_>, growth: Growth) -> usize {
        let mut data = self.data.lock();
        let mut out = GrowthWriter {
            data: &mut data,
            growth,
            reserve: self.reserve,
            written: 0,
            truncated: false,
        };
        // GrowthWriter never returns an error, a Display impl might
        if fmt::Write::write_fmt(&mut out, args).is_err() {
            log::debug!("buffer {:?}: formatting failed after {} bytes", self.id, out.written);
        }
        out.written
    }

    /// Remove and return up to `max_len` leading bytes
    pub fn consume(&self, max_len: usize) -> Vec<u8> {
        let mut data = self.data.lock();
        let n = max_len.min(data.len());
        data.drain(..n).collect()
    }

    /// Remove up to `out.len()` leading bytes into `out`
    pub fn consume_into(&self, out: &mut [u8]) -> usize {
        let mut data = self.data.lock();
        let n = out.len().min(data.len());
        out[..n].copy_from_slice(&data[..n]);
        data.drain(..n);
        n
    }

    /// Offset of the first newline within the first `max_len` bytes
    #[must_use]
    pub fn find_newline(&self, max_len: usize) -> Option<usize> {
        let data = self.data.lock();
        newline_in(&data, max_len)
    }

    /// Remove bytes into `out`, stopping after the first newline.
    ///
    /// Returns the count and whether a newline was copied.
    pub(crate) fn consume_line_into(&self, out: &mut [u8]) -> (usize, bool) {
        let mut data = self.data.lock();
        let newline = newline_in(&data, out.len());
        let n = match newline {
            Some(pos) => pos + 1,
            None => out.len().min(data.len()),
        };
        out[..n].copy_from_slice(&data[..n]);
        data.drain(..n);
        (n, newline.is_some())
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.data.lock()
    }

    /// Wake waiters after a data change made under the lock
    pub(crate) fn notify_waiters(&self) {
        self.wait.notify_all();
    }

    /// Wake waiters after a change to state outside the buffer
    ///
    /// Takes the lock first so a waiter between its check and its sleep
    /// cannot miss the wakeup.
    pub(crate) fn wake_all(&self) {
        drop(self.data.lock());
        self.wait.notify_all();
    }

    /// Sleep until `ready` holds or `interrupted` fires.
    ///
    /// Sleeps in slices of `slice` and re-checks both conditions after
    /// each one, so a long idle wait is never one unbounded sleep.
    pub(crate) fn wait_until(
        &self,
        ready: impl Fn(&[u8]) -> bool,
        slice: Duration,
        interrupted: impl Fn() -> bool,
    ) -> WaitOutcome {
        let started = Instant::now();
        let mut reported = false;
        let mut data = self.data.lock();
        loop {
            if ready(&data) {
                return WaitOutcome::Ready;
            }
            if interrupted() {
                return WaitOutcome::Interrupted;
            }
            if self.wait.wait_for(&mut data, slice).timed_out() {
                log::trace!("buffer {:?}: still waiting after {:?}", self.id, started.elapsed());
                if !reported && started.elapsed() >= slice * 2 {
                    log::debug!("buffer {:?}: idle waiter for {:?}", self.id, started.elapsed());
                    reported = true;
                }
            }
        }
    }

    /// Free the storage. The buffer stays usable but empty.
    pub fn release_storage(&self) {
        *self.data.lock() = Vec::new();
    }
}

impl fmt::Debug for BoundedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedBuffer")
            .field("id", &self.id)
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

fn newline_in(data: &[u8], max_len: usize) -> Option<usize> {
    let n = max_len.min(data.len());
    data[..n].iter().position(|&b| b == b'\n')
}

fn extend_with_growth(
    data: &mut Vec<u8>,
    bytes: &[u8],
    growth: Growth,
    reserve: Reserve,
) -> usize {
    let spare = data.capacity() - data.len();
    if bytes.len() > spare {
        match growth {
            Growth::MayBlock => data.reserve(bytes.len()),
            Growth::NoWait => {
                if !reserve(data, bytes.len()) {
                    log::trace!("no storage without blocking, dropping excess bytes");
                }
            }
        }
    }
    let n = bytes.len().min(data.capacity() - data.len());
    data.extend_from_slice(&bytes[..n]);
    n
}

struct GrowthWriter<'a> {
    data: &'a mut Vec<u8>,
    growth: Growth,
    reserve: Reserve,
    written: usize,
    truncated: bool,
}

impl fmt::Write for GrowthWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.truncated {
            return Ok(());
        }
        let n = extend_with_growth(self.data, s.as_bytes(), self.growth, self.reserve);
        self.written += n;
        self.truncated = n < s.len();
        Ok(())
    }
}
