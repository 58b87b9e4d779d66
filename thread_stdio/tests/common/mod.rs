#![allow(dead_code)]

use std::time::Duration;
use thread_stdio::{StdioConfig, StdioError, UserBuf, UserBufMut};

/// Short bounded waits keep the blocking tests fast
pub fn config(capacity: usize) -> StdioConfig {
    StdioConfig {
        capacity,
        wait_slice_ms: Some(10),
        ..StdioConfig::default()
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub const LONG_WAIT: Duration = Duration::from_secs(5);

/// Caller memory where only the first `accessible` bytes are mapped
pub struct FaultyBuf {
    pub data: Vec<u8>,
    accessible: usize,
}

impl FaultyBuf {
    pub fn new(data: Vec<u8>, accessible: usize) -> Self {
        Self { data, accessible }
    }

    pub fn zeroed(len: usize, accessible: usize) -> Self {
        Self::new(vec![0; len], accessible)
    }

    fn check(&self, offset: usize, len: usize) -> Result<(), StdioError> {
        if offset + len > self.accessible.min(self.data.len()) {
            return Err(StdioError::Fault);
        }
        Ok(())
    }
}

impl UserBufMut for FaultyBuf {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn fault_in_writeable(&mut self, offset: usize, len: usize) -> usize {
        len.min(self.accessible.min(self.data.len()).saturating_sub(offset))
    }

    fn copy_to_user(&mut self, offset: usize, src: &[u8]) -> Result<(), StdioError> {
        self.check(offset, src.len())?;
        self.data[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }
}

impl UserBuf for FaultyBuf {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn fault_in_readable(&self, offset: usize, len: usize) -> usize {
        len.min(self.accessible.min(self.data.len()).saturating_sub(offset))
    }

    fn copy_from_user(&self, offset: usize, dst: &mut [u8]) -> Result<(), StdioError> {
        self.check(offset, dst.len())?;
        dst.copy_from_slice(&self.data[offset..offset + dst.len()]);
        Ok(())
    }
}
