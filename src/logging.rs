use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the tracing subscriber.
///
/// Diagnostics go to stderr, filtered by `RUST_LOG` (warnings by default) so
/// they don't drown the crawl progress on stdout. With `log_dir` set, a
/// detailed log is also written to `<log_dir>/site-audit.log`; keep the
/// returned guard alive until exit so it gets flushed.
pub fn setup_logging(log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let stderr_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(stderr_filter);

    let Some(log_dir) = log_dir else {
        tracing_subscriber::registry().with(stderr_layer).try_init()?;
        return Ok(None);
    };

    std::fs::create_dir_all(log_dir)?;
    let file_appender = RollingFileAppender::new(Rotation::NEVER, log_dir, "site-audit.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(EnvFilter::new("info,site_audit=debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    Ok(Some(guard))
}
