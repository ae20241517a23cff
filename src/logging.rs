use crate::config::{LogFormat, Settings};
use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber. Output goes to stderr: stdout carries the
/// response stream and must stay one JSON object per line.
pub fn init_logging(settings: &Settings) -> Result<()> {
    let directives = std::env::var("RUST_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| settings.log_level.clone());
    let filter = EnvFilter::try_new(&directives)?;

    match settings.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true),
            )
            .try_init()?,
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(false),
            )
            .try_init()?,
    }
    Ok(())
}
