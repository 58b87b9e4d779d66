//! Readiness polling
//!
//! A `PollTable` is handed to `FileOps::poll`, which registers it on the
//! wait queues it depends on (`poll_wait`) before computing its mask.
//! `poll` then sleeps on the table until one of those queues is notified.
//!
//! Dropping the table removes its entry from every queue it registered
//! on, so queues that never fired do not keep dead waiters.

use bitflags::bitflags;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::file_ops::FileOps;
use crate::readiness::{PollEntry, ReadinessQueue, WaitQueueId, WakeArg};

bitflags! {
    /// Readiness bits, same values as the POSIX `POLL*` constants
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PollMask: u16 {
        const IN = 0x001;
        const OUT = 0x004;
        const ERR = 0x008;
        const HUP = 0x010;
    }
}

/// Longest single sleep of an unbounded poll before it re-polls
const POLL_SLICE: Duration = Duration::from_secs(1);

/// Interest registration for one poll call
#[derive(Debug, Default)]
pub struct PollTable {
    entry: Arc<PollEntry>,
    registered: Mutex<Vec<(ReadinessQueue, WaitQueueId)>>,
}

impl PollTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask to be woken when `id` is notified
    pub fn poll_wait(&self, queue: &ReadinessQueue, id: WaitQueueId) {
        if !queue.register(id, &self.entry, "poll") {
            log::trace!("poll_wait: {id:?} no longer listed");
            return;
        }
        let mut registered = self.registered.lock();
        if !registered.iter().any(|(q, i)| *i == id && q.same_as(queue)) {
            registered.push((queue.clone(), id));
        }
    }

    /// Sleep until a registered queue is notified, or `timeout`
    pub fn wait(&self, timeout: Duration) -> Option<WakeArg> {
        self.entry.wait_timeout(timeout)
    }
}

impl Drop for PollTable {
    fn drop(&mut self) {
        for (queue, id) in self.registered.get_mut().drain(..) {
            queue.unregister(id, &self.entry);
        }
    }
}

/// Wait until `ops` reports any bit of `interest`, or `HUP`/`ERR`.
///
/// `None` waits forever (in bounded slices). Returns the ready bits, or
/// an empty mask on timeout.
pub fn poll(ops: &dyn FileOps, interest: PollMask, timeout: Option<Duration>) -> PollMask {
    let table = PollTable::new();
    let deadline = timeout.map(|t| Instant::now() + t);
    loop {
        let ready = ops.poll(Some(&table)) & (interest | PollMask::HUP | PollMask::ERR);
        if !ready.is_empty() {
            return ready;
        }
        let sleep = match deadline {
            None => POLL_SLICE,
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return PollMask::empty();
                }
                (deadline - now).min(POLL_SLICE)
            }
        };
        table.wait(sleep);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_bits() {
        let mask = PollMask::IN | PollMask::HUP;
        assert_eq!(mask.bits(), 0x011);
        assert!(!mask.contains(PollMask::OUT));
    }

    #[test]
    fn test_dropped_table_leaves_no_waiters() {
        let queue = ReadinessQueue::new();
        let fired = queue.allocate("fired");
        let idle = queue.allocate("idle");

        for _ in 0..50 {
            let table = PollTable::new();
            table.poll_wait(&queue, fired);
            table.poll_wait(&queue, idle);
            table.poll_wait(&queue, idle);
            queue.notify(fired, 1);
            assert_eq!(table.wait(Duration::from_millis(1)), Some(1));
        }

        assert_eq!(queue.waiter_count(fired), 0);
        assert_eq!(queue.waiter_count(idle), 0);
    }
}
