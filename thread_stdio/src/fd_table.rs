//! Descriptor table
//!
//! Publishes files under small integer descriptors and dispatches
//! read/write/poll/close to their `FileOps`. Operations clone the file out
//! of the table and run without holding the table lock, so a blocked read
//! never stalls other descriptors or a concurrent `close`.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::os::raw::c_int;
use std::sync::Arc;
use std::time::Duration;

use crate::error::StdioError;
use crate::file_ops::{FileOps, OpenFlags};
use crate::poll::{self, PollMask};

pub type Fd = c_int;

/// Descriptors 0-2 are left to the process's own stdio
const FIRST_FD: Fd = 3;

const DEFAULT_MAX_FILES: usize = 1024;

struct OpenFile {
    ops: Arc<dyn FileOps>,
    flags: OpenFlags,
}

pub struct FdTable {
    files: Mutex<BTreeMap<Fd, OpenFile>>,
    max_files: usize,
}

impl FdTable {
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_FILES)
    }

    #[must_use]
    pub fn with_limit(max_files: usize) -> Self {
        Self {
            files: Mutex::new(BTreeMap::new()),
            max_files,
        }
    }

    /// Bind `ops` to the lowest free descriptor.
    ///
    /// # Errors
    ///
    /// `TooManyFiles` if the table is full.
    pub fn install(&self, ops: Arc<dyn FileOps>, flags: OpenFlags) -> Result<Fd, StdioError> {
        let mut files = self.files.lock();
        if files.len() >= self.max_files {
            return Err(StdioError::TooManyFiles);
        }
        let mut fd = FIRST_FD;
        for &used in files.keys() {
            if used != fd {
                break;
            }
            fd += 1;
        }
        files.insert(fd, OpenFile { ops, flags });
        log::debug!("fd_table: installed fd {fd} ({flags:?})");
        Ok(fd)
    }

    /// # Errors
    ///
    /// `BadDescriptor` for an unknown descriptor.
    pub fn get(&self, fd: Fd) -> Result<Arc<dyn FileOps>, StdioError> {
        self.entry(fd).map(|(ops, _)| ops)
    }

    /// # Errors
    ///
    /// `BadDescriptor` for an unknown or write-only descriptor, otherwise
    /// whatever the file's read reports.
    pub fn read(&self, fd: Fd, mut buf: &mut [u8]) -> Result<usize, StdioError> {
        let (ops, flags) = self.entry(fd)?;
        if !flags.access.can_read() {
            return Err(StdioError::BadDescriptor);
        }
        ops.read(&mut buf, flags)
    }

    /// # Errors
    ///
    /// `BadDescriptor` for an unknown or read-only descriptor, otherwise
    /// whatever the file's write reports.
    pub fn write(&self, fd: Fd, buf: &[u8]) -> Result<usize, StdioError> {
        let (ops, flags) = self.entry(fd)?;
        if !flags.access.can_write() {
            return Err(StdioError::BadDescriptor);
        }
        ops.write(&buf, flags)
    }

    /// Wait for readiness, see `poll::poll`.
    ///
    /// # Errors
    ///
    /// `BadDescriptor` for an unknown descriptor.
    pub fn poll(
        &self,
        fd: Fd,
        interest: PollMask,
        timeout: Option<Duration>,
    ) -> Result<PollMask, StdioError> {
        let (ops, _) = self.entry(fd)?;
        Ok(poll::poll(ops.as_ref(), interest, timeout))
    }

    /// # Errors
    ///
    /// `BadDescriptor` for an unknown descriptor.
    pub fn set_nonblocking(&self, fd: Fd, nonblocking: bool) -> Result<(), StdioError> {
        let mut files = self.files.lock();
        let file = files.get_mut(&fd).ok_or(StdioError::BadDescriptor)?;
        file.flags.nonblocking = nonblocking;
        Ok(())
    }

    /// # Errors
    ///
    /// `BadDescriptor` for an unknown descriptor.
    pub fn interrupt(&self, fd: Fd) -> Result<(), StdioError> {
        let (ops, _) = self.entry(fd)?;
        ops.interrupt();
        Ok(())
    }

    /// Unpublish the descriptor and release the file.
    ///
    /// # Errors
    ///
    /// `BadDescriptor` for an unknown descriptor.
    pub fn close(&self, fd: Fd) -> Result<(), StdioError> {
        let file = self.files.lock().remove(&fd).ok_or(StdioError::BadDescriptor)?;
        log::debug!("fd_table: closing fd {fd}");
        file.ops.release();
        Ok(())
    }

    /// Open descriptors, ascending
    #[must_use]
    pub fn fds(&self) -> Vec<Fd> {
        self.files.lock().keys().copied().collect()
    }

    fn entry(&self, fd: Fd) -> Result<(Arc<dyn FileOps>, OpenFlags), StdioError> {
        let files = self.files.lock();
        let file = files.get(&fd).ok_or(StdioError::BadDescriptor)?;
        Ok((Arc::clone(&file.ops), file.flags))
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FdTable {
    fn drop(&mut self) {
        let files = std::mem::take(self.files.get_mut());
        for (fd, file) in files {
            log::debug!("fd_table: releasing fd {fd} on drop");
            file.ops.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_ops::AccessMode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingFile {
        released: AtomicUsize,
    }

    impl FileOps for CountingFile {
        fn access(&self) -> AccessMode {
            AccessMode::ReadOnly
        }

        fn release(&self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_lowest_free_fd() {
        let table = FdTable::new();
        let file = Arc::new(CountingFile::default());
        let flags = OpenFlags::new(AccessMode::ReadOnly);
        assert_eq!(table.install(file.clone(), flags), Ok(3));
        assert_eq!(table.install(file.clone(), flags), Ok(4));
        table.close(3).unwrap();
        assert_eq!(table.install(file.clone(), flags), Ok(3));
        assert_eq!(table.fds(), vec![3, 4]);
    }

    #[test]
    fn test_close_unknown() {
        let table = FdTable::new();
        assert_eq!(table.close(7), Err(StdioError::BadDescriptor));
    }

    #[test]
    fn test_limit() {
        let table = FdTable::with_limit(1);
        let file = Arc::new(CountingFile::default());
        let flags = OpenFlags::new(AccessMode::ReadOnly);
        table.install(file.clone(), flags).unwrap();
        assert_eq!(table.install(file, flags), Err(StdioError::TooManyFiles));
    }

    #[test]
    fn test_access_checked_and_defaults() {
        let table = FdTable::new();
        let file = Arc::new(CountingFile::default());
        let fd = table.install(file, OpenFlags::new(AccessMode::ReadOnly)).unwrap();
        assert_eq!(table.write(fd, b"x"), Err(StdioError::BadDescriptor));
        let mut buf = [0u8; 1];
        assert_eq!(table.read(fd, &mut buf), Err(StdioError::NotSupported));
    }

    #[test]
    fn test_drop_releases_open_files() {
        let file = Arc::new(CountingFile::default());
        {
            let table = FdTable::new();
            table.install(file.clone(), OpenFlags::new(AccessMode::ReadOnly)).unwrap();
        }
        assert_eq!(file.released.load(Ordering::SeqCst), 1);
    }
}
