//! Readiness queue
//!
//! Registry of callers waiting for a buffer of a channel to change state.
//! Blocking reads and writes inside the channel wait on the buffer's own
//! condition variable; this queue is for everyone else: pollers and async
//! tasks waiting for a handle to become readable or writable.
//!
//! # Avoiding lost wakeups
//!
//! The producer changes buffer state under the buffer lock and then calls
//! `notify` (which takes the queue lock). A waiter must therefore take the
//! queue lock *before* checking the buffer, and register while still
//! holding it:
//!
//! ```ignore
//! let lock = queue.get_lock();
//! if !ready() {
//!     queue.wait_async(id, "reader", lock).await;
//!     // lock is consumed by wait_async and released before awaiting
//! }
//! ```
//!
//! Pollers use the opposite order (register first, then check), which is
//! also safe: a notification after registration always reaches them.
//!
//! Lock ordering: queue -> buffer. Producers never hold a buffer lock
//! while notifying.
//!
//! Each buffer of a channel owns one wait queue. Ids are handed out by the
//! queue itself (`allocate`), starting at 1, and are only meaningful within
//! the `ReadinessQueue` that issued them.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Identifies one wait queue in a `ReadinessQueue` (one per buffer)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaitQueueId(i64);

impl WaitQueueId {
    #[must_use]
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn id(&self) -> i64 {
        self.0
    }
}

/// Value delivered to a woken waiter: the byte count that changed, or `HANGUP`
pub type WakeArg = i64;

/// Wake value sent when a wait queue is torn down (channel closed)
pub const HANGUP: WakeArg = -1;

/// Synchronous waiter registered by a poller
#[derive(Debug, Default)]
pub struct PollEntry {
    woken: Mutex<Option<WakeArg>>,
    cond: Condvar,
}

impl PollEntry {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn wake(&self, arg: WakeArg) {
        *self.woken.lock() = Some(arg);
        self.cond.notify_all();
    }

    /// Sleep until woken or `timeout` elapses, consuming the wake value.
    ///
    /// Returns `None` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<WakeArg> {
        let mut woken = self.woken.lock();
        if woken.is_none() {
            let _ = self.cond.wait_for(&mut woken, timeout);
        }
        woken.take()
    }
}

enum Waiter {
    Async(tokio::sync::oneshot::Sender<WakeArg>),
    Poll(Arc<PollEntry>),
}

struct WaitingClient {
    waiter: Waiter,
    debug_hint: String,
}

impl std::fmt::Debug for WaitingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.waiter {
            Waiter::Async(_) => "async",
            Waiter::Poll(_) => "poll",
        };
        f.debug_struct("WaitingClient")
            .field("kind", &kind)
            .field("debug_hint", &self.debug_hint)
            .finish()
    }
}

#[derive(Debug)]
pub struct InnerState {
    whitelist: HashMap<WaitQueueId, String>,
    waiting_clients: HashMap<WaitQueueId, Vec<WaitingClient>>,
}

impl InnerState {
    fn new() -> Self {
        Self {
            whitelist: HashMap::new(),
            waiting_clients: HashMap::new(),
        }
    }
}

/// Thread-safe readiness registry for the wait queues of one channel
#[derive(Clone, Debug)]
pub struct ReadinessQueue {
    inner: Arc<Mutex<InnerState>>,
    next_id: Arc<AtomicI64>,
}

impl ReadinessQueue {
    #[must_use]
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(InnerState::new())),
            next_id: Arc::new(AtomicI64::new(1)),
        }
    }

    /// Issue a fresh id and whitelist it
    pub fn allocate(&self, debug_hint: &str) -> WaitQueueId {
        let id = WaitQueueId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.whitelist(id, debug_hint);
        id
    }

    /// Is `other` a handle to the same registry
    #[must_use]
    pub fn same_as(&self, other: &ReadinessQueue) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Get the lock for atomic condition-check + register operations
    pub fn get_lock(&self) -> MutexGuard<'_, InnerState> {
        self.inner.lock()
    }

    /// Register a wait queue
    pub fn whitelist(&self, id: WaitQueueId, debug_hint: &str) {
        let mut state = self.inner.lock();
        if let Some(old_hint) = state.whitelist.insert(id, debug_hint.to_string()) {
            log::warn!("readiness.whitelist: {id:?} already in whitelist (was: '{old_hint}')");
        }
    }

    /// Unregister a wait queue
    ///
    /// Wakes every waiter with `HANGUP`. Later waits on this id resolve
    /// immediately.
    pub fn unlist(&self, id: WaitQueueId) {
        let mut state = self.inner.lock();
        if state.whitelist.remove(&id).is_none() {
            log::warn!("readiness.unlist: {id:?} not in whitelist");
        }
        drop(state);

        self.notify(id, HANGUP);
    }

    /// Is the wait queue still registered
    #[must_use]
    pub fn is_listed(&self, id: WaitQueueId) -> bool {
        self.inner.lock().whitelist.contains_key(&id)
    }

    /// Wake every waiter of a queue. Waiters are one-shot and removed.
    pub fn notify(&self, id: WaitQueueId, arg: WakeArg) {
        let mut state = self.inner.lock();
        let waiters = state.waiting_clients.remove(&id).unwrap_or_default();
        drop(state);

        log::trace!("readiness.notify: {id:?}, arg={arg}, waiters: {}", waiters.len());

        for client in waiters {
            match client.waiter {
                Waiter::Async(sender) => {
                    if sender.send(arg).is_err() {
                        log::debug!(
                            "readiness.notify: receiver dropped for {id:?} (hint: {})",
                            client.debug_hint
                        );
                    }
                }
                Waiter::Poll(entry) => entry.wake(arg),
            }
        }
    }

    /// Register a poll entry on a queue.
    ///
    /// An entry is registered at most once per queue until it is woken.
    /// Returns `false` if the queue is not (or no longer) listed; the
    /// caller should not expect a wakeup then.
    pub fn register(&self, id: WaitQueueId, entry: &Arc<PollEntry>, debug_hint: &str) -> bool {
        let mut state = self.inner.lock();
        if !state.whitelist.contains_key(&id) {
            return false;
        }
        let clients = state.waiting_clients.entry(id).or_default();
        let already = clients
            .iter()
            .any(|c| matches!(&c.waiter, Waiter::Poll(e) if Arc::ptr_eq(e, entry)));
        if !already {
            clients.push(WaitingClient {
                waiter: Waiter::Poll(Arc::clone(entry)),
                debug_hint: debug_hint.to_string(),
            });
        }
        true
    }

    /// Remove a poll entry from a queue without waking it
    pub fn unregister(&self, id: WaitQueueId, entry: &Arc<PollEntry>) {
        let mut state = self.inner.lock();
        if let Some(clients) = state.waiting_clients.get_mut(&id) {
            clients.retain(|c| !matches!(&c.waiter, Waiter::Poll(e) if Arc::ptr_eq(e, entry)));
            if clients.is_empty() {
                state.waiting_clients.remove(&id);
            }
        }
    }

    /// Number of waiters currently parked on a queue
    #[must_use]
    pub fn waiter_count(&self, id: WaitQueueId) -> usize {
        self.inner.lock().waiting_clients.get(&id).map_or(0, Vec::len)
    }

    /// Wait for a queue notification
    ///
    /// Precondition: the caller acquired the lock and checked its condition.
    /// Post-condition: the lock is released when this method returns.
    /// Resolves to the wake value, or `HANGUP` if the queue is not listed.
    pub fn wait_async(
        &self,
        id: WaitQueueId,
        debug_hint: &str,
        mut lock: MutexGuard<'_, InnerState>,
    ) -> impl std::future::Future<Output = WakeArg> + Send {
        let (tx, rx) = tokio::sync::oneshot::channel();

        if lock.whitelist.contains_key(&id) {
            lock.waiting_clients.entry(id).or_default().push(WaitingClient {
                waiter: Waiter::Async(tx),
                debug_hint: debug_hint.to_string(),
            });
            drop(lock);
        } else {
            // The queue is gone, nothing will ever notify it
            drop(lock);
            let _ = tx.send(HANGUP);
        }

        // The sender is only dropped without sending if the whole queue is
        // dropped while waiting; treat that as a hang-up too.
        async move { rx.await.unwrap_or(HANGUP) }
    }
}
