//! Logging setup
//!
//! Everything goes through `tracing` into a daily rolling file under the
//! XDG state directory (`~/.local/state/lifeledger/lifeledger.log.<date>`).
//! `RUST_LOG` overrides the configured level.

use crate::config::{Config, LoggingConfig};
use crate::error::{Error, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// File name prefix of the rolling log.
pub const LOG_FILE_PREFIX: &str = "lifeledger.log";

/// Flushes buffered log lines when dropped. Hold it for the whole run.
#[must_use = "dropping the guard stops log output"]
pub struct LoggingGuard {
    _worker: WorkerGuard,
}

/// Install the global subscriber writing to the rolling log file.
///
/// When the embedding process already installed a subscriber, that one is
/// kept and this call only logs that it stood aside.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    let dir = Config::state_dir();
    std::fs::create_dir_all(&dir)?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .max_log_files(config.max_files.max(1))
        .build(&dir)
        .map_err(|e| {
            Error::Config(format!(
                "failed to create log file in {}: {}",
                dir.display(),
                e
            ))
        })?;
    let (writer, worker) = tracing_appender::non_blocking(appender);

    let installed = tracing_subscriber::registry()
        .with(level_filter(std::env::var("RUST_LOG").ok(), &config.level))
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true),
        )
        .try_init();
    if let Err(e) = installed {
        tracing::debug!(error = %e, "Tracing subscriber already installed; keeping it");
    }

    tracing::info!(
        log_dir = %dir.display(),
        level = %config.level,
        "Logging initialized"
    );
    Ok(LoggingGuard { _worker: worker })
}

/// Directives from `env` when set and valid, else `level`, else `info`.
fn level_filter(env: Option<String>, level: &str) -> EnvFilter {
    env.and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}
