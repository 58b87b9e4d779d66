//! Caller-provided memory
//!
//! Handle reads and writes copy between a channel buffer and memory owned
//! by the caller, which may be only partly accessible. The copy loops
//! first ask how much is accessible (`fault_in_*`), then copy chunks while
//! holding the buffer lock; a failed chunk copy stops the loop.

use crate::error::StdioError;

/// Destination memory for a handle read
pub trait UserBufMut {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many bytes starting at `offset` (at most `len`) can be written
    fn fault_in_writeable(&mut self, offset: usize, len: usize) -> usize;

    /// Copy `src` to `offset`.
    ///
    /// # Errors
    ///
    /// `StdioError::Fault` if any part of the range is inaccessible.
    fn copy_to_user(&mut self, offset: usize, src: &[u8]) -> Result<(), StdioError>;
}

/// Source memory for a handle write
pub trait UserBuf {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many bytes starting at `offset` (at most `len`) can be read
    fn fault_in_readable(&self, offset: usize, len: usize) -> usize;

    /// Fill `dst` from `offset`.
    ///
    /// # Errors
    ///
    /// `StdioError::Fault` if any part of the range is inaccessible.
    fn copy_from_user(&self, offset: usize, dst: &mut [u8]) -> Result<(), StdioError>;
}

fn accessible(total: usize, offset: usize, len: usize) -> usize {
    len.min(total.saturating_sub(offset))
}

impl UserBufMut for &mut [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn fault_in_writeable(&mut self, offset: usize, len: usize) -> usize {
        accessible(<[u8]>::len(self), offset, len)
    }

    fn copy_to_user(&mut self, offset: usize, src: &[u8]) -> Result<(), StdioError> {
        let end = offset.checked_add(src.len()).ok_or(StdioError::Fault)?;
        let dst = self.get_mut(offset..end).ok_or(StdioError::Fault)?;
        dst.copy_from_slice(src);
        Ok(())
    }
}

impl UserBuf for &[u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn fault_in_readable(&self, offset: usize, len: usize) -> usize {
        accessible(<[u8]>::len(self), offset, len)
    }

    fn copy_from_user(&self, offset: usize, dst: &mut [u8]) -> Result<(), StdioError> {
        let end = offset.checked_add(dst.len()).ok_or(StdioError::Fault)?;
        let src = self.get(offset..end).ok_or(StdioError::Fault)?;
        dst.copy_from_slice(src);
        Ok(())
    }
}

impl UserBufMut for Vec<u8> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn fault_in_writeable(&mut self, offset: usize, len: usize) -> usize {
        accessible(Vec::len(self), offset, len)
    }

    fn copy_to_user(&mut self, offset: usize, src: &[u8]) -> Result<(), StdioError> {
        self.as_mut_slice().copy_to_user(offset, src)
    }
}

impl UserBuf for Vec<u8> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn fault_in_readable(&self, offset: usize, len: usize) -> usize {
        accessible(Vec::len(self), offset, len)
    }

    fn copy_from_user(&self, offset: usize, dst: &mut [u8]) -> Result<(), StdioError> {
        self.as_slice().copy_from_user(offset, dst)
    }
}
