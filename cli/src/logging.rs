//! Tracing setup for the `stuff` binary
//!
//! Logs go to stderr unless `log.to_file` is set, in which case they are
//! written to a daily rolling file under the logs directory.

use config::{LogSettings, PathManager};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the global subscriber. Keep the returned guard alive until
/// exit so buffered file output is flushed.
pub fn init_logging(settings: &LogSettings) -> Option<WorkerGuard> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level))
    };

    if settings.to_file {
        match PathManager::logs_dir() {
            Some(dir) => match std::fs::create_dir_all(&dir) {
                Ok(()) => {
                    let appender = tracing_appender::rolling::daily(&dir, PathManager::log_file_name());
                    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

                    let subscriber = tracing_subscriber::registry().with(filter()).with(
                        fmt::layer()
                            .with_writer(non_blocking)
                            .with_ansi(false)
                            .with_target(true)
                            .with_file(true)
                            .with_line_number(true),
                    );
                    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
                        eprintln!("[stuff] Failed to set tracing subscriber: {}", e);
                        return None;
                    }
                    tracing::debug!(dir = %dir.display(), "logging to file");
                    return Some(guard);
                }
                Err(e) => {
                    eprintln!("[stuff] Failed to create log directory {:?}: {}", dir, e);
                }
            },
            None => eprintln!("[stuff] No log directory available, using stderr"),
        }
    }

    let subscriber = tracing_subscriber::registry().with(filter()).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true),
    );
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("[stuff] Failed to set tracing subscriber: {}", e);
    }
    None
}
