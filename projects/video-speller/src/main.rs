mod cli;
mod commands;
mod config;
mod dictionary;
mod error;
mod pipeline;
mod run_artifacts;
mod run_context;
#[cfg(test)]
mod testing;
mod video;

use anyhow::Result;
use cli::Args;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing; pipeline progress is shown by the progress bar, RUST_LOG=info adds the diagnostic log
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse_args();

    commands::dispatch(args)?;

    Ok(())
}
