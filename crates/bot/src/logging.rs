use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Used when `RUST_LOG` is unset or unparseable.
const DEFAULT_FILTER: &str = "trend_bot=info,warn";

const LOG_FILE_PREFIX: &str = "trend-bot.log";

/// Install the global subscriber: JSON lines to a daily-rolling file under
/// `log_dir`, compact human-readable lines to stderr.
///
/// The returned [`WorkerGuard`] flushes the file writer on drop; hold it
/// until the process exits.
pub fn init_tracing(logging: &LoggingConfig) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&logging.log_dir)
        .with_context(|| format!("failed to create log directory {}", logging.log_dir))?;

    let file_appender = tracing_appender::rolling::daily(&logging.log_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(true)
                .json(),
        )
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .try_init()
        .context("tracing subscriber already installed")?;

    Ok(guard)
}
