use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LoggingSection};

/// Install the global tracing subscriber. Events go to stderr so command
/// output on stdout stays clean.
///
/// `RUST_LOG` wins over the configured filter. `--verbose` bumps the portal's
/// own target to `debug`.
pub fn init(logging: &LoggingSection, verbose: bool) -> Result<()> {
    let filter = build_filter(logging, verbose, std::env::var("RUST_LOG").ok())?;
    let registry = tracing_subscriber::registry().with(filter);

    match logging.format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    }
    .context("Failed to install tracing subscriber")
}

fn build_filter(logging: &LoggingSection, verbose: bool, rust_log: Option<String>) -> Result<EnvFilter> {
    let directives = match rust_log {
        Some(from_env) if !from_env.is_empty() => from_env,
        _ if verbose => format!("{},ops_portal=debug", logging.filter),
        _ => logging.filter.clone(),
    };
    EnvFilter::try_new(&directives)
        .with_context(|| format!("Invalid log filter '{}'", directives))
}
