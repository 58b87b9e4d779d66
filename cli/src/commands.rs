//! Line-oriented command worker
//!
//! Runs inside the worker thread. Each line read from the redirected
//! stdin is one command:
//!
//! - `echo <text>`: print the text
//! - `upper <text>`: print the text upper-cased
//! - `count`: print how many lines were read so far
//! - `spam <n>`: print `n` lines without ever blocking; lines that do not
//!   fit are dropped and the summary says how many made it
//! - `quit [code]`: print `bye` and exit with `code` (default 0)

use stdio_io::StdinReader;
use thread_stdio::{stdio_printf, IoMode, StdioError, StdioRedirect, ThreadWithStdio};
use tracing::{debug, warn};

const PROMPT: &str = "> ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    Empty,
    Echo(&'a str),
    Upper(&'a str),
    Count,
    Spam(usize),
    Quit(i32),
    Unknown(&'a str),
}

impl<'a> Command<'a> {
    #[must_use]
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim_end_matches('\r');
        let (name, arg) = match line.trim_start().split_once(' ') {
            Some((name, arg)) => (name, arg),
            None => (line.trim(), ""),
        };
        match name {
            "" => Command::Empty,
            "echo" => Command::Echo(arg),
            "upper" => Command::Upper(arg),
            "count" => Command::Count,
            "spam" => arg
                .trim()
                .parse()
                .map_or(Command::Unknown(line), Command::Spam),
            "quit" if arg.trim().is_empty() => Command::Quit(0),
            "quit" => arg
                .trim()
                .parse()
                .map_or(Command::Unknown(line), Command::Quit),
            _ => Command::Unknown(line),
        }
    }
}

/// Worker entry: serve commands until `quit` or end of input
pub fn execute(thr: &ThreadWithStdio) -> i32 {
    match serve(thr.stdio()) {
        Ok(code) => code,
        Err(StdioError::BrokenPipe) => {
            debug!("handle closed while replying");
            0
        }
        Err(e) => {
            warn!(error = %e, "command worker failed");
            1
        }
    }
}

fn serve(stdio: &StdioRedirect) -> Result<i32, StdioError> {
    let mut reader = StdinReader::new(stdio);
    let mut lines = 0usize;

    loop {
        stdio_printf!(stdio, IoMode::Blocking, "{PROMPT}")?;
        let Some(line) = reader.read_line_string()? else {
            return Ok(0);
        };
        lines += 1;

        match Command::parse(&line) {
            Command::Empty => {}
            Command::Echo(text) => {
                stdio_printf!(stdio, IoMode::Blocking, "{text}\n")?;
            }
            Command::Upper(text) => {
                stdio_printf!(stdio, IoMode::Blocking, "{}\n", text.to_uppercase())?;
            }
            Command::Count => {
                stdio_printf!(stdio, IoMode::Blocking, "{lines}\n")?;
            }
            Command::Spam(n) => {
                let written = spam(stdio, n)?;
                stdio_printf!(stdio, IoMode::Blocking, "spam: {written} of {n} lines\n")?;
            }
            Command::Quit(code) => {
                stdio_printf!(stdio, IoMode::Blocking, "bye\n")?;
                return Ok(code);
            }
            Command::Unknown(text) => {
                stdio_printf!(stdio, IoMode::Blocking, "unknown command: {text}\n")?;
            }
        }
    }
}

/// Producer that never waits on the reader
fn spam(stdio: &StdioRedirect, n: usize) -> Result<usize, StdioError> {
    let mut written = 0;
    for i in 0..n {
        match stdio_printf!(stdio, IoMode::NonBlocking, "spam {i}\n") {
            Ok(_) => written += 1,
            Err(StdioError::WouldBlock) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(written)
}
