//! I/O building blocks
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  ThreadWithStdio (handle ops)       │
//! │  - read/write/poll/release          │
//! │  - copies to/from caller memory     │
//! └─────────────────────────────────────┘
//!          ▲
//!          │ uses StdioRedirect for coordination
//!          ▼
//! ┌─────────────────────────────────────┐
//! │  StdioRedirect (channel)            │
//! │  - closed flag                      │
//! │  - blocking/non-blocking policy     │
//! └─────────────────────────────────────┘
//!          ▲
//!          │ owns two BoundedBuffers
//!          ▼
//! ┌─────────────────────────────────────┐
//! │  BoundedBuffer (storage)            │
//! │  - Mutex<Vec<u8>> + Condvar         │
//! │  - append/consume/find_newline      │
//! └─────────────────────────────────────┘
//! ```

pub mod buffer;
pub mod user_buf;

pub use buffer::{BoundedBuffer, Growth};
pub use user_buf::{UserBuf, UserBufMut};
