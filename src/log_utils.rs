use std::fs::File;

use anyhow::{Context, Result};
use std::sync::Mutex;
use tracing_subscriber::prelude::*;

const DEFAULT_DIRECTIVES: &str = "strinks=info";

// Logs to stderr and to `log_file`. RUST_LOG overrides the default filter.
pub fn init(log_file: &str) -> Result<()> {
    let file = File::create(log_file).with_context(|| format!("Cannot create {log_file}"))?;
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_DIRECTIVES));
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true)
                .with_writer(Mutex::new(file)),
        );

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
