use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

/// Run a line-oriented command worker behind a stdio handle
#[derive(Debug, Parser)]
#[command(name = "thread-stdio", version, about)]
struct Args {
    /// JSON file with channel settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Capacity of each channel buffer, in bytes
    #[arg(long)]
    capacity: Option<usize>,

    /// Use non-blocking handle operations
    #[arg(long)]
    nonblocking: bool,
}

fn main() -> ExitCode {
    // Initialize tracing, stdout carries the session
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match cli::load_config(args.config.as_deref(), args.capacity) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "bad configuration");
            return ExitCode::from(2);
        }
    };

    let mut stdout = std::io::stdout().lock();
    match cli::run_session(config, args.nonblocking, std::io::stdin(), &mut stdout) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            error!(error = %e, "session failed");
            ExitCode::FAILURE
        }
    }
}
