//! Tracing subscriber setup for the CLI

use std::io::IsTerminal;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use crate::PollenCastError;
use crate::config::LoggingConfig;

/// Install the global subscriber. `RUST_LOG` takes precedence over the configured level.
///
/// Logs go to stderr so command output on stdout stays clean.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(format!(
            "{level},pollencast={level},reqwest=warn,fjall=warn",
            level = config.level
        ))
    };

    let builder = tracing_subscriber::fmt()
        .with_target(true)
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    let installed = match config.format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder
            .with_ansi(std::io::stderr().is_terminal())
            .compact()
            .try_init(),
    };

    installed.map_err(|e| PollenCastError::config(format!("Failed to initialise logging: {e}")).into())
}
