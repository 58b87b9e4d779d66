pub mod commands;
pub mod session;

use std::path::Path;
use thread_stdio::{ConfigError, StdioConfig};

pub use session::{run_session, SessionError};

/// Config file (or defaults), then environment, then command line
///
/// # Errors
///
/// Returns an error if the file or a variable cannot be parsed, or the
/// result is invalid.
pub fn load_config(path: Option<&Path>, capacity: Option<usize>) -> Result<StdioConfig, ConfigError> {
    let mut config = match path {
        Some(path) => StdioConfig::from_file(path)?,
        None => StdioConfig::default(),
    }
    .with_overrides(|var| std::env::var(var).ok())?;

    if let Some(capacity) = capacity {
        config.capacity = capacity;
    }
    config.validate()?;
    Ok(config)
}
