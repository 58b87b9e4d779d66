//! Bridge a byte stream pair to a command worker handle
//!
//! ```text
//!   input ──► forwarder thread ──► write(fd) ──► worker
//!   output ◄── poll(fd) + read(fd) ◄───────────── worker
//! ```
//!
//! End of input ends the session the same way as `quit`.

use std::io::{self, Read, Write};
use std::sync::{mpsc, Arc};
use std::thread;
use thread_stdio::{
    Fd, FdTable, PollMask, RunError, StdSpawner, StdioConfig, StdioError, ThreadWithStdio,
};
use tracing::{debug, info};

use crate::commands;

const CHUNK: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to start worker: {0}")]
    Run(#[from] RunError),

    #[error("handle error: {0}")]
    Stdio(#[from] StdioError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Run the command worker until it exits, returning its exit code
///
/// # Errors
///
/// Returns an error if the worker cannot be started or copying output fails.
pub fn run_session<R, W>(
    config: StdioConfig,
    nonblocking: bool,
    input: R,
    output: &mut W,
) -> Result<i32, SessionError>
where
    R: Read + Send + 'static,
    W: Write,
{
    let table = Arc::new(FdTable::new());
    let (exit_tx, exit_rx) = mpsc::channel();

    let (fd, thr) = ThreadWithStdio::run(
        &table,
        &StdSpawner,
        config,
        Some(Box::new(move |thr: &ThreadWithStdio| {
            let _ = exit_tx.send(thr.exit_code());
        })),
        Box::new(commands::execute),
    )?;
    if nonblocking {
        table.set_nonblocking(fd, true)?;
    }
    info!(fd, nonblocking, "session started");

    let forward_table = Arc::clone(&table);
    // Not joined: reading the process stdin may block past the session
    thread::Builder::new()
        .name("stdin-forward".to_string())
        .spawn(move || forward_input(&forward_table, fd, input))?;

    let drained = drain_output(&table, fd, output);
    table.close(fd)?;
    drained?;

    let code = exit_rx.try_recv().unwrap_or_else(|_| thr.exit_code());
    info!(exit_code = code, "session finished");
    Ok(code)
}

fn forward_input<R: Read>(table: &FdTable, fd: Fd, mut input: R) {
    let mut buf = [0u8; CHUNK];
    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(error = %e, "input failed");
                break;
            }
        };
        if let Err(e) = write_all(table, fd, &buf[..n]) {
            debug!(error = %e, "handle no longer accepts input");
            return;
        }
    }
    if let Err(e) = write_all(table, fd, b"quit\n") {
        debug!(error = %e, "worker gone before end of input");
    }
}

fn write_all(table: &FdTable, fd: Fd, mut data: &[u8]) -> Result<(), StdioError> {
    while !data.is_empty() {
        match table.write(fd, data) {
            Ok(n) => data = &data[n..],
            Err(StdioError::WouldBlock | StdioError::Interrupted) => {
                table.poll(fd, PollMask::OUT, None)?;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn drain_output<W: Write>(table: &FdTable, fd: Fd, output: &mut W) -> Result<(), SessionError> {
    let mut buf = [0u8; CHUNK];
    loop {
        let mask = table.poll(fd, PollMask::IN, None)?;
        if !mask.contains(PollMask::IN) {
            continue;
        }
        match table.read(fd, &mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => {
                output.write_all(&buf[..n])?;
                output.flush()?;
            }
            Err(StdioError::WouldBlock | StdioError::Interrupted) => {}
            Err(e) => return Err(e.into()),
        }
    }
}
