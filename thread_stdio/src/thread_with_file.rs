//! A worker thread bound to a handle
//!
//! `ThreadWithFile` owns the worker's join handle and its exit code. The
//! worker is created parked: it only runs its entry function once the
//! handle was published (`PendingStart::start`). If publishing fails the
//! worker is woken with an abort and joined without running.
//!
//! Stopping a thread is cooperative: `exit` raises `should_stop`, then
//! joins. Whoever owns the thread must also make every blocking wait of
//! the worker return (for stdio workers: close the channel first).

use parking_lot::{Condvar, Mutex};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::error::RunError;
use crate::fd_table::{Fd, FdTable};
use crate::file_ops::{FileOps, OpenFlags};

/// Body of a worker thread; the return value becomes the exit code
pub type ThreadEntry = Box<dyn FnOnce() -> i32 + Send + 'static>;

/// Name used when the calling thread has none
const DEFAULT_THREAD_NAME: &str = "thread_with_file";

/// Creates worker threads
pub trait ThreadSpawner {
    /// Start a thread named `name` running `entry`.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be created.
    fn spawn(&self, name: String, entry: ThreadEntry) -> io::Result<JoinHandle<i32>>;
}

/// Spawns plain `std::thread`s
#[derive(Debug, Default, Clone, Copy)]
pub struct StdSpawner;

impl ThreadSpawner for StdSpawner {
    fn spawn(&self, name: String, entry: ThreadEntry) -> io::Result<JoinHandle<i32>> {
        thread::Builder::new().name(name).spawn(entry)
    }
}

#[derive(Debug, Default)]
struct StartGate {
    go: Mutex<Option<bool>>,
    cond: Condvar,
}

impl StartGate {
    fn open(&self, go: bool) {
        *self.go.lock() = Some(go);
        self.cond.notify_all();
    }

    fn wait(&self) -> bool {
        let mut go = self.go.lock();
        loop {
            if let Some(go) = *go {
                return go;
            }
            self.cond.wait(&mut go);
        }
    }
}

/// A created but not yet running worker
#[must_use = "the worker stays parked until started or aborted"]
pub struct PendingStart {
    gate: Arc<StartGate>,
}

impl PendingStart {
    /// Let the worker run its entry function
    pub fn start(self) {
        self.gate.open(true);
    }

    /// Wake the worker without running its entry function, and join it
    pub fn abort(self, thr: &ThreadWithFile) {
        self.gate.open(false);
        thr.exit();
    }
}

#[derive(Debug, Default)]
pub struct ThreadWithFile {
    task: Mutex<Option<JoinHandle<i32>>>,
    should_stop: AtomicBool,
    done: AtomicBool,
    ret: AtomicI32,
}

impl ThreadWithFile {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the worker thread, parked.
    ///
    /// The thread is named after the calling thread.
    ///
    /// # Errors
    ///
    /// Returns the spawner's error; no thread exists then.
    pub fn create(
        &self,
        spawner: &dyn ThreadSpawner,
        entry: ThreadEntry,
    ) -> io::Result<PendingStart> {
        let gate = Arc::new(StartGate::default());
        let worker_gate = Arc::clone(&gate);
        let name = thread::current()
            .name()
            .unwrap_or(DEFAULT_THREAD_NAME)
            .to_string();

        let task = spawner.spawn(
            name.clone(),
            Box::new(move || if worker_gate.wait() { entry() } else { 0 }),
        )?;
        debug!(name = %name, "worker thread created");

        self.should_stop.store(false, Ordering::SeqCst);
        self.ret.store(0, Ordering::SeqCst);
        *self.task.lock() = Some(task);
        Ok(PendingStart { gate })
    }

    /// Has `exit` asked the worker to stop
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.should_stop.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_done(&self) {
        self.done.store(true, Ordering::SeqCst);
    }

    /// Exit code of the worker; 0 until it returned
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.ret.load(Ordering::SeqCst)
    }

    pub(crate) fn set_exit_code(&self, ret: i32) {
        self.ret.store(ret, Ordering::SeqCst);
    }

    /// Is the caller running on the worker thread
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| task.thread().id() == thread::current().id())
    }

    pub(crate) fn request_stop(&self) {
        self.should_stop.store(true, Ordering::SeqCst);
    }

    /// Is there a thread that was not yet joined
    #[must_use]
    pub fn has_thread(&self) -> bool {
        self.task.lock().is_some()
    }

    /// Ask the worker to stop and join it. No-op without a thread.
    ///
    /// Called from the worker itself, the thread is detached instead.
    pub fn exit(&self) {
        let Some(task) = self.task.lock().take() else {
            return;
        };
        self.should_stop.store(true, Ordering::SeqCst);

        if task.thread().id() == thread::current().id() {
            debug!("worker thread exiting itself, detaching");
            return;
        }
        match task.join() {
            Ok(ret) => {
                self.ret.store(ret, Ordering::SeqCst);
                debug!(exit_code = ret, "worker thread joined");
            }
            Err(_) => warn!("worker thread panicked"),
        }
    }
}

/// Run `entry` on a new thread and publish `ops` in `table`.
///
/// The access mode is the one `ops` supports. The worker starts only
/// after the descriptor was installed; if installation fails it is
/// stopped and joined before returning the error.
///
/// # Errors
///
/// - `RunError::Spawn` if the thread cannot be created
/// - `RunError::Install` if the table rejects the file
pub fn run_thread_with_file(
    table: &FdTable,
    spawner: &dyn ThreadSpawner,
    thr: &ThreadWithFile,
    ops: Arc<dyn FileOps>,
    entry: ThreadEntry,
) -> Result<Fd, RunError> {
    let flags = OpenFlags::new(ops.access());
    let pending = thr.create(spawner, entry)?;

    match table.install(ops, flags) {
        Ok(fd) => {
            pending.start();
            info!(fd, access = ?flags.access, "thread with file started");
            Ok(fd)
        }
        Err(e) => {
            warn!(error = %e, "failed to install handle, stopping worker");
            pending.abort(thr);
            Err(RunError::Install(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_joins_and_records_code() {
        let thr = ThreadWithFile::new();
        let pending = thr.create(&StdSpawner, Box::new(|| 7)).unwrap();
        pending.start();
        thr.exit();
        assert_eq!(thr.exit_code(), 7);
        assert!(thr.should_stop());
        assert!(!thr.has_thread());
        thr.exit();
    }

    #[test]
    fn test_abort_skips_entry() {
        let thr = ThreadWithFile::new();
        let ran = Arc::new(AtomicBool::new(false));
        let ran_in_worker = Arc::clone(&ran);
        let pending = thr
            .create(
                &StdSpawner,
                Box::new(move || {
                    ran_in_worker.store(true, Ordering::SeqCst);
                    1
                }),
            )
            .unwrap();
        pending.abort(&thr);
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(thr.exit_code(), 0);
    }

    #[test]
    fn test_worker_named_after_caller() {
        let handle = thread::Builder::new()
            .name("caller-name".to_string())
            .spawn(|| {
                let thr = ThreadWithFile::new();
                let (tx, rx) = std::sync::mpsc::channel();
                thr.create(
                    &StdSpawner,
                    Box::new(move || {
                        let _ = tx.send(thread::current().name().map(str::to_string));
                        0
                    }),
                )
                .unwrap()
                .start();
                thr.exit();
                rx.recv().unwrap()
            })
            .unwrap();
        assert_eq!(handle.join().unwrap().as_deref(), Some("caller-name"));
    }
}
