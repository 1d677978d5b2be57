//! Logging initialization using the `tracing` ecosystem.
//!
//! Console output is always enabled. When a log directory is given, a
//! second layer writes plain-text lines to a daily-rotating file through a
//! non-blocking writer; the returned guard must be kept alive until exit so
//! buffered lines are flushed.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `log_level`. `module_name` is the file
/// prefix under `log_dir`. Returns an error if a global subscriber is
/// already installed.
pub fn init_logging(
    log_level: &str,
    log_dir: Option<&str>,
    module_name: &str,
) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(log_level))?;

    let console_layer = fmt::layer().with_target(true).with_thread_ids(true);

    let Some(dir) = log_dir else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .try_init()?;
        return Ok(None);
    };

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, module_name));
    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;
    Ok(Some(guard))
}
