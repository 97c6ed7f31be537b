//! Usage: Tracing initialization (console + daily rolling file tee).

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const LOG_DIR_NAME: &str = "logs";
const LOG_FILE_PREFIX: &str = "ticktick-mcp.log";

/// Installs the global subscriber. The returned guard must stay alive for the
/// process lifetime or buffered file output is lost on exit.
pub fn init(log_dir: Option<PathBuf>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Routes `log`-facade records from dependencies into tracing.
    let _ = tracing_log::LogTracer::init();

    let console = tracing_subscriber::fmt::layer().with_target(false);
    let registry = tracing_subscriber::registry().with(filter).with(console);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            let _ = registry.with(file).try_init();
            Some(guard)
        }
        None => {
            let _ = registry.try_init();
            None
        }
    }
}

pub fn default_log_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("ticktick-mcp")
        .join(LOG_DIR_NAME)
}
