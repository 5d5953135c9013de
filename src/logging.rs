use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_FILE: &str = "gemini-chat.log";
const DEFAULT_FILTER: &str = "gemini_chat=info";

/// Send tracing output to `<dir>/gemini-chat.log`, filtered by `RUST_LOG`.
///
/// The terminal belongs to the chat view, so nothing is written to stdout.
/// Keep the returned guard alive for the life of the program or buffered
/// lines are lost on exit.
pub fn init(dir: &Path) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(dir)?;
    let (writer, guard) = tracing_appender::non_blocking(rolling::never(dir, LOG_FILE));

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        )
        .with(filter)
        .try_init()?;

    tracing::debug!(path = %dir.join(LOG_FILE).display(), "tracing initialized");
    Ok(guard)
}
