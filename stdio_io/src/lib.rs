//! I/O trait adapters for `thread_stdio` channels
//!
//! - [`StdinReader`] and [`StdoutWriter`] are the worker's view of its
//!   redirected stdio (`embedded_io`, `std::io` and `core::fmt` traits).
//! - [`AsyncFile`] is the caller's view of a handle as
//!   `embedded_io_async` traits.

pub mod async_file;
mod error_mapping;
pub mod reader;
pub mod writer;

pub use async_file::AsyncFile;
pub use error_mapping::{errno_to_error_kind, error_kind_to_str, stdio_error_to_str};
pub use reader::StdinReader;
pub use writer::StdoutWriter;
